// Buffered pull reader with leftover carry-over
//
// `fill` compacts the unread tail to the buffer front, reads from the source
// into the remainder, and exposes the whole unread window. `advance` marks
// elements consumed. The buffer grows through the pool when the free space
// falls below the minimum read size, so unread data always survives a fill.

use crate::dialect::Token;
use crate::error::Result;
use crate::pool::{ensure_capacity, BufferPool, Lease};

use super::source::Source;
#[cfg(feature = "async")]
use super::source::AsyncSource;

const DEFAULT_CAPACITY: usize = 8 * 1024;

/// Unread window returned by a fill.
pub struct ReadResult<'a, T> {
    /// All currently unread elements.
    pub data: &'a [T],
    /// True once the source is exhausted; further fills return the same
    /// (possibly empty) window.
    pub is_final: bool,
}

/// Buffered reader over a `Source`.
pub struct BufferReader<T: Token, S> {
    source: S,
    pool: BufferPool<T>,
    buffer: Lease<T>,
    start: usize,
    end: usize,
    min_read: usize,
    completed: bool,
    bom_pending: bool,
}

impl<T: Token, S> BufferReader<T, S> {
    pub fn new(source: S) -> Self {
        Self::with_capacity(source, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(source: S, capacity: usize) -> Self {
        let capacity = capacity.max(64);
        let pool = BufferPool::new();
        let buffer = pool.rent(capacity);
        BufferReader {
            source,
            pool,
            buffer,
            start: 0,
            end: 0,
            min_read: (capacity / 8).max(16),
            completed: false,
            bom_pending: true,
        }
    }

    /// Currently unread elements without touching the source.
    pub fn unread(&self) -> &[T] {
        &self.buffer[self.start..self.end]
    }

    /// Mark `count` elements consumed.
    pub fn advance(&mut self, count: usize) {
        debug_assert!(count <= self.end - self.start);
        self.start += count;
    }

    /// Compact the unread tail to the front and grow the buffer when the
    /// remaining free space is below the minimum read size.
    fn make_room(&mut self) {
        if self.start > 0 {
            self.buffer.copy_within(self.start..self.end, 0);
            self.end -= self.start;
            self.start = 0;
        }
        if self.buffer.len() - self.end < self.min_read {
            let target = self.buffer.len() * 2;
            ensure_capacity(&self.pool, &mut self.buffer, target, true);
        }
    }

    fn finish_fill(&mut self, read: usize) -> ReadResult<'_, T> {
        if read == 0 {
            self.completed = true;
        } else {
            self.end += read;
        }
        if self.bom_pending {
            self.bom_pending = false;
            self.start += T::bom_len(&self.buffer[self.start..self.end]);
        }
        ReadResult {
            data: &self.buffer[self.start..self.end],
            is_final: self.completed,
        }
    }
}

impl<T: Token, S: Source<T>> BufferReader<T, S> {
    /// Read more data from the source and return the unread window.
    /// Idempotent at end of data.
    pub fn fill(&mut self) -> Result<ReadResult<'_, T>> {
        if self.completed {
            return Ok(ReadResult {
                data: &self.buffer[self.start..self.end],
                is_final: true,
            });
        }
        self.make_room();
        let read = self.source.read(&mut self.buffer[self.end..])?;
        Ok(self.finish_fill(read))
    }

    /// Rewind to the start of the source when supported, discarding all
    /// buffered state.
    pub fn try_reset(&mut self) -> bool {
        if !self.source.try_reset() {
            return false;
        }
        self.start = 0;
        self.end = 0;
        self.completed = false;
        self.bom_pending = true;
        true
    }
}

#[cfg(feature = "async")]
impl<T: Token, S: AsyncSource<T>> BufferReader<T, S> {
    /// Async variant of [`fill`](Self::fill).
    pub async fn fill_async(&mut self) -> Result<ReadResult<'_, T>> {
        if self.completed {
            return Ok(ReadResult {
                data: &self.buffer[self.start..self.end],
                is_final: true,
            });
        }
        self.make_room();
        let read = self.source.read(&mut self.buffer[self.end..]).await?;
        Ok(self.finish_fill(read))
    }
}
