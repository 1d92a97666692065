use crate::error::BatchError;

/// Outcome of processing one record: either keep the (transformed) record, or drop it
/// from the chunk's output.
///
/// Dropping is not an error; it is how a processor filters records that do not pass a
/// business-level eligibility check.
#[derive(Debug, Clone, PartialEq)]
pub enum Processed<O> {
    Keep(O),
    Drop,
}

impl<O> Processed<O> {
    pub fn is_keep(&self) -> bool {
        matches!(self, Processed::Keep(_))
    }

    pub fn into_option(self) -> Option<O> {
        match self {
            Processed::Keep(item) => Some(item),
            Processed::Drop => None,
        }
    }
}

/// Represents the result of processing an item by the processor.
pub type ItemProcessorResult<O> = Result<Processed<O>, BatchError>;

/// Represents the result of writing a chunk by the writer.
pub type ItemWriterResult = Result<(), BatchError>;

/// Per-record transform / filter applied between read and write.
///
/// A processor must be a pure function of its input record. Side effects, if any,
/// must be idempotent since a failed job is re-run from the start.
pub trait ItemProcessor<I, O> {
    fn process(&self, item: &I) -> ItemProcessorResult<O>;
}

/// Commits a chunk of records.
///
/// `write` is called once per chunk. If it returns `Ok`, every record of the chunk is
/// committed; if it fails, none may be observable.
pub trait ItemWriter<O> {
    fn write(&self, items: &[O]) -> ItemWriterResult;

    /// Flush the contents of internal buffers to the underlying destination.
    fn flush(&self) -> ItemWriterResult {
        Ok(())
    }

    /// Called once before the first chunk.
    fn open(&self) -> ItemWriterResult {
        Ok(())
    }

    /// Called once after the last chunk, on success and on failure.
    fn close(&self) -> ItemWriterResult {
        Ok(())
    }
}

/// Keeps every record unchanged.
#[derive(Default)]
pub struct PassThroughProcessor;

impl<I: Clone> ItemProcessor<I, I> for PassThroughProcessor {
    fn process(&self, item: &I) -> ItemProcessorResult<I> {
        Ok(Processed::Keep(item.clone()))
    }
}
