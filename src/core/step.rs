use std::time::{Duration, Instant};

use log::{debug, info, warn};
use uuid::Uuid;

use crate::BatchError;

use super::{
    chunk::{Chunk, ChunkReport, ChunkStatus, PagedChunkReader},
    flow::{COMPLETED, FAILED},
    item::{ItemProcessor, ItemWriter, PassThroughProcessor, Processed},
    paging::{PageQuery, PagingItemSource},
    parameters::JobParameters,
    tasklet::{Tasklet, TaskletStepBuilder},
};

/// Status of a step execution.
///
/// A chunk-oriented step moves through `Starting → Reading → Processing → Writing`
/// and loops back to `Reading` after each committed chunk, until `Exhausted`.
/// A tasklet step goes from `Starting` to `Completed`. Both may end `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Starting,
    Reading,
    Processing,
    Writing,
    /// The chunk-oriented step drained its source
    Exhausted,
    /// The tasklet ran successfully
    Completed,
    Failed,
}

impl StepStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, StepStatus::Exhausted | StepStatus::Completed)
    }
}

/// One run of a step within a job run.
#[derive(Debug, Clone)]
pub struct StepExecution {
    /// Unique identifier for this step execution
    pub id: Uuid,
    /// Name of the executed step
    pub name: String,
    /// Current status of the step execution
    pub status: StepStatus,
    pub start_time: Instant,
    pub end_time: Instant,
    pub duration: Duration,
    /// Number of items read from the source
    pub read_count: usize,
    /// Number of items handed to the writer
    pub write_count: usize,
    /// Number of items dropped by the processor
    pub filter_count: usize,
    /// Number of chunks committed
    pub commit_count: usize,
    /// Per-chunk counts, in commit order
    pub chunks: Vec<ChunkReport>,
    /// The error that failed the step, if any
    pub failure: Option<BatchError>,
}

impl StepExecution {
    pub fn new(name: &str) -> Self {
        let now = Instant::now();
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            status: StepStatus::Starting,
            start_time: now,
            end_time: now,
            duration: Duration::default(),
            read_count: 0,
            write_count: 0,
            filter_count: 0,
            commit_count: 0,
            chunks: Vec::new(),
            failure: None,
        }
    }

    /// The outcome used to pick the next node of the job flow.
    pub fn exit_status(&self) -> &'static str {
        if self.status.is_success() {
            COMPLETED
        } else {
            FAILED
        }
    }

    pub(crate) fn finish(&mut self, status: StepStatus) {
        self.status = status;
        self.end_time = Instant::now();
        self.duration = self.end_time.duration_since(self.start_time);
    }

    pub(crate) fn fail(&mut self, error: BatchError) {
        self.failure = Some(error);
        self.finish(StepStatus::Failed);
    }

    fn record_chunk(&mut self, report: ChunkReport) {
        self.filter_count += report.filter_count;
        self.write_count += report.write_count;
        self.commit_count += 1;
        self.chunks.push(report);
    }
}

/// A step of a job: a chunk-oriented read-process-write loop or a tasklet.
pub trait Step {
    fn get_name(&self) -> &str;

    /// Executes the step.
    ///
    /// The step records its counts and final status in `step_execution`; the job
    /// parameters are those the job run was launched with.
    ///
    /// # Returns
    /// - `Ok(())`: The step completed successfully
    /// - `Err(BatchError)`: The step failed
    fn execute(
        &self,
        step_execution: &mut StepExecution,
        parameters: &JobParameters,
    ) -> Result<(), BatchError>;
}

/// Derives the query a chunk-oriented step opens its source with.
pub trait PageQueryProvider {
    fn page_query(&self, parameters: &JobParameters) -> Result<PageQuery, BatchError>;
}

impl PageQueryProvider for PageQuery {
    fn page_query(&self, _parameters: &JobParameters) -> Result<PageQuery, BatchError> {
        Ok(self.clone())
    }
}

impl<F> PageQueryProvider for F
where
    F: Fn(&JobParameters) -> Result<PageQuery, BatchError>,
{
    fn page_query(&self, parameters: &JobParameters) -> Result<PageQuery, BatchError> {
        self(parameters)
    }
}

pub struct ChunkOrientedStep<'a, I, O> {
    name: String,
    /// Component responsible for reading items from the source
    reader: &'a dyn PagingItemSource<I>,
    /// Component responsible for processing items
    processor: &'a dyn ItemProcessor<I, O>,
    /// Component responsible for writing items to the destination
    writer: &'a dyn ItemWriter<O>,
    query: Box<dyn PageQueryProvider + 'a>,
    /// Number of items to process in each chunk
    chunk_size: usize,
}

impl<I, O> Step for ChunkOrientedStep<'_, I, O> {
    fn get_name(&self) -> &str {
        &self.name
    }

    fn execute(
        &self,
        step_execution: &mut StepExecution,
        parameters: &JobParameters,
    ) -> Result<(), BatchError> {
        step_execution.start_time = Instant::now();
        info!("Start of step: {}, id: {}", self.name, step_execution.id);

        let result = self.run(step_execution, parameters);

        match &result {
            Ok(()) => step_execution.finish(StepStatus::Exhausted),
            Err(error) => step_execution.fail(error.clone()),
        }

        info!(
            "End of step: {}, status: {:?}, read: {}, written: {}, filtered: {}",
            self.name,
            step_execution.status,
            step_execution.read_count,
            step_execution.write_count,
            step_execution.filter_count
        );

        result
    }
}

impl<I, O> ChunkOrientedStep<'_, I, O> {
    fn run(
        &self,
        step_execution: &mut StepExecution,
        parameters: &JobParameters,
    ) -> Result<(), BatchError> {
        if self.chunk_size == 0 {
            return Err(BatchError::Configuration(format!(
                "chunk size of step {} must be greater than zero",
                self.name
            )));
        }

        let query = self.query.page_query(parameters)?;
        let cursor = self.reader.open(query)?;

        if let Err(error) = self.writer.open() {
            Self::manage_error(self.reader.close(cursor));
            return Err(error);
        }

        let mut reader = PagedChunkReader::new(self.reader, cursor);
        let result = self.process_chunks(step_execution, &mut reader);

        let closed_reader = self.reader.close(reader.into_cursor());
        let closed_writer = self.writer.close();

        match result {
            Ok(()) => closed_reader.and(closed_writer),
            Err(error) => {
                Self::manage_error(closed_reader);
                Self::manage_error(closed_writer);
                Err(error)
            }
        }
    }

    fn process_chunks(
        &self,
        step_execution: &mut StepExecution,
        reader: &mut PagedChunkReader<'_, I>,
    ) -> Result<(), BatchError> {
        let mut chunk = Chunk::new(self.chunk_size);

        loop {
            step_execution.status = StepStatus::Reading;
            let chunk_status = reader.fill(&mut chunk)?;
            step_execution.read_count += chunk.len();

            if chunk.is_empty() {
                return Ok(());
            }

            step_execution.status = StepStatus::Processing;
            let processed_items = self.process_chunk(chunk.get_items())?;

            step_execution.status = StepStatus::Writing;
            self.write_chunk(&processed_items)?;

            step_execution.record_chunk(ChunkReport {
                read_count: chunk.len(),
                filter_count: chunk.len() - processed_items.len(),
                write_count: processed_items.len(),
            });
            chunk.clear();

            if chunk_status == ChunkStatus::Finished {
                return Ok(());
            }
        }
    }

    /// Applies the processor to each read item, dropping filtered ones.
    fn process_chunk(&self, read_items: &[I]) -> Result<Vec<O>, BatchError> {
        debug!("Processing chunk of {} items", read_items.len());

        let mut result = Vec::with_capacity(read_items.len());
        for item in read_items {
            match self.processor.process(item)? {
                Processed::Keep(processed_item) => result.push(processed_item),
                Processed::Drop => {}
            }
        }

        Ok(result)
    }

    fn write_chunk(&self, processed_items: &[O]) -> Result<(), BatchError> {
        if processed_items.is_empty() {
            debug!("No items to write, skipping write call");
            return Ok(());
        }

        debug!("Writing chunk of {} items", processed_items.len());
        self.writer.write(processed_items)?;
        self.writer.flush()
    }

    /// Logs errors of cleanup operations that must not hide the original failure.
    fn manage_error(result: Result<(), BatchError>) {
        if let Err(error) = result {
            warn!("Non-fatal error: {}", error);
        }
    }
}

pub struct ChunkOrientedStepBuilder<'a, I, O> {
    name: String,
    reader: Option<&'a dyn PagingItemSource<I>>,
    processor: Option<&'a dyn ItemProcessor<I, O>>,
    writer: Option<&'a dyn ItemWriter<O>>,
    query: Option<Box<dyn PageQueryProvider + 'a>>,
    chunk_size: usize,
}

impl<'a, I, O> ChunkOrientedStepBuilder<'a, I, O> {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            reader: None,
            processor: None,
            writer: None,
            query: None,
            chunk_size: 10,
        }
    }

    pub fn reader(mut self, reader: &'a dyn PagingItemSource<I>) -> Self {
        self.reader = Some(reader);
        self
    }

    pub fn processor(mut self, processor: &'a dyn ItemProcessor<I, O>) -> Self {
        self.processor = Some(processor);
        self
    }

    pub fn writer(mut self, writer: &'a dyn ItemWriter<O>) -> Self {
        self.writer = Some(writer);
        self
    }

    /// Sets the query the source is opened with: a fixed [`PageQuery`] or a closure
    /// deriving it from the job parameters. Defaults to a page size equal to the
    /// chunk size.
    pub fn query(mut self, query: impl PageQueryProvider + 'a) -> Self {
        self.query = Some(Box::new(query));
        self
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn build(self) -> Result<ChunkOrientedStep<'a, I, O>, BatchError> {
        let missing = |component: &str| {
            BatchError::Configuration(format!(
                "{} is required for building step {}",
                component, self.name
            ))
        };

        let reader = self.reader.ok_or_else(|| missing("Reader"))?;
        let processor = self.processor.ok_or_else(|| missing("Processor"))?;
        let writer = self.writer.ok_or_else(|| missing("Writer"))?;

        if self.chunk_size == 0 {
            return Err(BatchError::Configuration(format!(
                "chunk size of step {} must be greater than zero",
                self.name
            )));
        }

        let query = match self.query {
            Some(query) => query,
            None => Box::new(PageQuery::new(self.chunk_size)),
        };

        Ok(ChunkOrientedStep {
            name: self.name,
            reader,
            processor,
            writer,
            query,
            chunk_size: self.chunk_size,
        })
    }
}

impl<'a, T: Clone> ChunkOrientedStepBuilder<'a, T, T> {
    /// Uses a processor that keeps every item unchanged.
    pub fn pass_through(mut self) -> Self {
        self.processor = Some(&PassThroughProcessor);
        self
    }
}

pub struct StepBuilder {
    name: String,
}

impl StepBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }

    pub fn tasklet(self, tasklet: &dyn Tasklet) -> TaskletStepBuilder<'_> {
        TaskletStepBuilder::new(&self.name).tasklet(tasklet)
    }

    pub fn chunk<'a, I, O>(self, chunk_size: usize) -> ChunkOrientedStepBuilder<'a, I, O> {
        ChunkOrientedStepBuilder::new(&self.name).chunk_size(chunk_size)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::core::{
        item::ItemProcessorResult,
        paging::{InMemoryPagingSource, Page},
    };

    #[derive(Default)]
    struct VecWriter {
        chunks: RefCell<Vec<Vec<i32>>>,
    }

    impl ItemWriter<i32> for VecWriter {
        fn write(&self, items: &[i32]) -> Result<(), BatchError> {
            self.chunks.borrow_mut().push(items.to_vec());
            Ok(())
        }
    }

    struct EvenProcessor;

    impl ItemProcessor<i32, i32> for EvenProcessor {
        fn process(&self, item: &i32) -> ItemProcessorResult<i32> {
            if item % 2 == 0 {
                Ok(Processed::Keep(*item))
            } else {
                Ok(Processed::Drop)
            }
        }
    }

    struct UnreachableSource;

    impl PagingItemSource<i32> for UnreachableSource {
        fn read_page(&self, _query: &PageQuery) -> Result<Page<i32>, BatchError> {
            Err(BatchError::SourceUnavailable("connection refused".to_string()))
        }
    }

    #[test]
    fn chunk_step_should_filter_and_commit_chunks() -> Result<(), BatchError> {
        let reader = InMemoryPagingSource::new((1..=10).collect::<Vec<i32>>());
        let processor = EvenProcessor;
        let writer = VecWriter::default();

        let step = StepBuilder::new("even")
            .chunk::<i32, i32>(4)
            .reader(&reader)
            .processor(&processor)
            .writer(&writer)
            .query(PageQuery::new(3))
            .build()?;

        let mut step_execution = StepExecution::new(step.get_name());
        step.execute(&mut step_execution, &JobParameters::new())?;

        assert_eq!(step_execution.status, StepStatus::Exhausted);
        assert_eq!(step_execution.exit_status(), COMPLETED);
        assert_eq!(step_execution.read_count, 10);
        assert_eq!(step_execution.write_count, 5);
        assert_eq!(step_execution.filter_count, 5);
        assert_eq!(step_execution.commit_count, 3);
        assert_eq!(
            writer.chunks.borrow().as_slice(),
            &[vec![2, 4], vec![6, 8], vec![10]]
        );
        Ok(())
    }

    #[test]
    fn empty_source_should_complete_without_writing() -> Result<(), BatchError> {
        let reader = InMemoryPagingSource::new(Vec::<i32>::new());
        let writer = VecWriter::default();

        let step = StepBuilder::new("empty")
            .chunk::<i32, i32>(5)
            .reader(&reader)
            .pass_through()
            .writer(&writer)
            .build()?;

        let mut step_execution = StepExecution::new("empty");
        step.execute(&mut step_execution, &JobParameters::new())?;

        assert_eq!(step_execution.status, StepStatus::Exhausted);
        assert_eq!(step_execution.read_count, 0);
        assert_eq!(step_execution.write_count, 0);
        assert!(writer.chunks.borrow().is_empty());
        Ok(())
    }

    #[test]
    fn read_failure_should_fail_step() -> Result<(), BatchError> {
        let reader = UnreachableSource;
        let writer = VecWriter::default();

        let step = StepBuilder::new("unreachable")
            .chunk::<i32, i32>(5)
            .reader(&reader)
            .pass_through()
            .writer(&writer)
            .build()?;

        let mut step_execution = StepExecution::new("unreachable");
        let result = step.execute(&mut step_execution, &JobParameters::new());

        assert!(matches!(result, Err(BatchError::SourceUnavailable(_))));
        assert_eq!(step_execution.status, StepStatus::Failed);
        assert_eq!(step_execution.exit_status(), FAILED);
        assert!(matches!(
            step_execution.failure,
            Some(BatchError::SourceUnavailable(_))
        ));
        Ok(())
    }

    #[test]
    fn query_should_be_derived_from_parameters() -> Result<(), BatchError> {
        let reader = InMemoryPagingSource::new((1..=6).collect::<Vec<i32>>()).with_filter(
            |item: &i32, parameters| match parameters.get("max") {
                Some(crate::core::parameters::JobParameter::Long(max)) => i64::from(*item) <= *max,
                _ => true,
            },
        );
        let writer = VecWriter::default();
        let query = |parameters: &JobParameters| -> Result<PageQuery, BatchError> {
            let max = parameters
                .get_long("max")
                .ok_or_else(|| BatchError::Configuration("max is required".to_string()))?;
            Ok(PageQuery::new(2).parameter("max", max))
        };

        let step = StepBuilder::new("bounded")
            .chunk::<i32, i32>(10)
            .reader(&reader)
            .pass_through()
            .writer(&writer)
            .query(query)
            .build()?;

        let mut step_execution = StepExecution::new("bounded");
        step.execute(&mut step_execution, &JobParameters::new().with("max", 3))?;
        assert_eq!(writer.chunks.borrow().as_slice(), &[vec![1, 2, 3]]);

        let mut step_execution = StepExecution::new("bounded");
        let result = step.execute(&mut step_execution, &JobParameters::new());
        assert!(matches!(result, Err(BatchError::Configuration(_))));
        Ok(())
    }

    #[test]
    fn missing_writer_should_not_build() {
        let reader = InMemoryPagingSource::new(vec![1]);
        let result = StepBuilder::new("incomplete")
            .chunk::<i32, i32>(1)
            .reader(&reader)
            .pass_through()
            .build();
        assert!(matches!(result, Err(BatchError::Configuration(_))));
    }

    #[test]
    fn zero_chunk_size_should_not_build() {
        let reader = InMemoryPagingSource::new(vec![1]);
        let writer = VecWriter::default();
        let result = StepBuilder::new("zero")
            .chunk::<i32, i32>(0)
            .reader(&reader)
            .pass_through()
            .writer(&writer)
            .build();
        assert!(matches!(result, Err(BatchError::Configuration(_))));
    }
}
