use std::collections::VecDeque;

use log::debug;

use crate::error::BatchError;

use super::paging::{PageCursor, PagingItemSource};

#[derive(Debug, PartialEq, Clone, Copy)]
pub enum ChunkStatus {
    /// The chunk holds `chunk_size` items, more may follow.
    Full,
    /// The source is exhausted; the chunk holds the remaining items, possibly none.
    Finished,
}

/// An ordered, bounded batch of records read from a source.
pub struct Chunk<R> {
    items: Vec<R>,
    chunk_size: usize,
}

impl<R> Chunk<R> {
    pub fn new(chunk_size: usize) -> Chunk<R> {
        Chunk {
            items: Vec::with_capacity(chunk_size),
            chunk_size,
        }
    }

    pub fn add_item(&mut self, item: R) {
        self.items.push(item);
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.chunk_size
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get_items(&self) -> &[R] {
        &self.items
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

/// Diagnostics of one committed chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChunkReport {
    /// Records read from the source into the chunk
    pub read_count: usize,
    /// Records dropped by the processor
    pub filter_count: usize,
    /// Records handed to the writer
    pub write_count: usize,
}

/// Reconciles page size and chunk size: pages are buffered and handed out one record at
/// a time until a chunk is full or the source runs dry.
pub(crate) struct PagedChunkReader<'s, T> {
    source: &'s dyn PagingItemSource<T>,
    cursor: PageCursor,
    buffer: VecDeque<T>,
}

impl<'s, T> PagedChunkReader<'s, T> {
    pub(crate) fn new(source: &'s dyn PagingItemSource<T>, cursor: PageCursor) -> Self {
        Self {
            source,
            cursor,
            buffer: VecDeque::new(),
        }
    }

    /// Fills `chunk` up to its size, requesting pages as needed.
    pub(crate) fn fill(&mut self, chunk: &mut Chunk<T>) -> Result<ChunkStatus, BatchError> {
        while !chunk.is_full() {
            if let Some(item) = self.buffer.pop_front() {
                chunk.add_item(item);
                continue;
            }

            if self.cursor.is_exhausted() {
                debug!("End reading chunk: FINISHED");
                return Ok(ChunkStatus::Finished);
            }

            let page = self.source.next_page(&mut self.cursor)?;
            debug!(
                "Page {} read: {} items, has more: {}",
                self.cursor.query().page_index(),
                page.items.len(),
                page.has_more
            );
            self.buffer.extend(page.items);
        }

        debug!("End reading chunk: FULL");
        Ok(ChunkStatus::Full)
    }

    pub(crate) fn into_cursor(self) -> PageCursor {
        self.cursor
    }
}
