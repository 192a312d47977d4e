// Buffered two-phase push writer
//
// Callers get spare capacity with `get_buffer`, write into it, then commit
// with `advance`. `needs_drain` trips at the high-water mark (31/32 of the
// buffer); `drain` pushes committed elements to the sink. `complete` drains,
// flushes and releases the buffers exactly once; `abort` releases without
// draining. After either, every operation fails with `Error::Disposed`.

use crate::dialect::Token;
use crate::error::{Error, Result};
use crate::pool::{ensure_capacity, BufferPool, Lease};

use super::source::Sink;
#[cfg(feature = "async")]
use super::source::AsyncSink;

const DEFAULT_CAPACITY: usize = 8 * 1024;

#[inline]
fn high_water(capacity: usize) -> usize {
    capacity - capacity / 32
}

/// Buffered writer over a `Sink`.
pub struct BufferWriter<T: Token, S> {
    sink: S,
    pool: BufferPool<T>,
    buffer: Lease<T>,
    len: usize,
    flush_at: usize,
    disposed: bool,
}

impl<T: Token, S> BufferWriter<T, S> {
    pub fn new(sink: S) -> Self {
        Self::with_capacity(sink, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(sink: S, capacity: usize) -> Self {
        let capacity = capacity.max(64);
        let pool = BufferPool::new();
        let buffer = pool.rent(capacity);
        let flush_at = high_water(buffer.len());
        BufferWriter {
            sink,
            pool,
            buffer,
            len: 0,
            flush_at,
            disposed: false,
        }
    }

    /// Spare capacity of at least `size_hint` elements, growing the buffer
    /// when the hint does not fit. Committed data is preserved across growth.
    pub fn get_buffer(&mut self, size_hint: usize) -> Result<&mut [T]> {
        if self.disposed {
            return Err(Error::Disposed);
        }
        let hint = size_hint.max(1);
        if self.buffer.len() - self.len < hint {
            let target = (self.len + hint).max(self.buffer.len() * 2);
            ensure_capacity(&self.pool, &mut self.buffer, target, true);
            self.flush_at = high_water(self.buffer.len());
        }
        Ok(&mut self.buffer[self.len..])
    }

    /// Commit `count` elements written into the buffer from `get_buffer`.
    pub fn advance(&mut self, count: usize) -> Result<()> {
        if self.disposed {
            return Err(Error::Disposed);
        }
        debug_assert!(count <= self.buffer.len() - self.len);
        self.len += count;
        Ok(())
    }

    /// True once the committed length crosses the high-water mark.
    pub fn needs_drain(&self) -> bool {
        self.len >= self.flush_at
    }

    /// Committed elements not yet drained.
    pub fn pending(&self) -> usize {
        self.len
    }

    fn release(&mut self) {
        self.len = 0;
        self.buffer = Lease::empty(&self.pool);
    }

    /// Consume the writer and return the sink. Call after `complete`.
    pub fn into_sink(self) -> S {
        self.sink
    }
}

impl<T: Token, S: Sink<T>> BufferWriter<T, S> {
    /// Push all committed elements to the sink and reset the buffer.
    pub fn drain(&mut self) -> Result<()> {
        if self.disposed {
            return Err(Error::Disposed);
        }
        if self.len > 0 {
            self.sink.write(&self.buffer[..self.len])?;
            self.len = 0;
        }
        Ok(())
    }

    /// Drain remaining data, flush the sink and release the buffers.
    /// Idempotent: later calls return `Ok(())` without touching the sink.
    pub fn complete(&mut self) -> Result<()> {
        if self.disposed {
            return Ok(());
        }
        // Latch before draining so the first error wins and the writer is
        // unusable either way.
        self.disposed = true;
        let result = if self.len > 0 {
            match self.sink.write(&self.buffer[..self.len]) {
                Ok(()) => self.sink.flush(),
                Err(e) => Err(e),
            }
        } else {
            self.sink.flush()
        };
        self.release();
        result
    }

    /// Release the buffers without draining. The failure path: nothing
    /// partial reaches the sink. Idempotent.
    pub fn abort(&mut self) {
        if !self.disposed {
            self.disposed = true;
            self.release();
        }
    }
}

#[cfg(feature = "async")]
impl<T: Token, S: AsyncSink<T>> BufferWriter<T, S> {
    /// Async variant of [`drain`](Self::drain).
    pub async fn drain_async(&mut self) -> Result<()> {
        if self.disposed {
            return Err(Error::Disposed);
        }
        if self.len > 0 {
            self.sink.write(&self.buffer[..self.len]).await?;
            self.len = 0;
        }
        Ok(())
    }

    /// Async variant of [`complete`](Self::complete).
    pub async fn complete_async(&mut self) -> Result<()> {
        if self.disposed {
            return Ok(());
        }
        self.disposed = true;
        let result = if self.len > 0 {
            match self.sink.write(&self.buffer[..self.len]).await {
                Ok(()) => self.sink.flush().await,
                Err(e) => Err(e),
            }
        } else {
            self.sink.flush().await
        };
        self.release();
        result
    }
}
