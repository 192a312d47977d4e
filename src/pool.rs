// Pooled buffers with leased ownership
//
// Buffers are rented from a shared pool and handed out as `Lease`s. Dropping
// a lease returns the buffer to the pool for reuse. Growth goes through
// `ensure_capacity`: rent a larger replacement, optionally copy the old
// contents into its head, release the old buffer. The pool allocates on a
// miss, so renting never fails.

use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};

/// Retained buffers per pool. Further returns are dropped.
const MAX_RETAINED: usize = 16;

/// Largest buffer the pool retains, in elements. Oversized buffers are
/// dropped on release so one huge rent does not pin memory for the rest of
/// the stream.
const MAX_RETAINED_CAPACITY: usize = 1 << 20;

/// Cheaply clonable handle over a shared set of retained buffers.
pub struct BufferPool<T> {
    inner: Arc<Shelves<T>>,
}

struct Shelves<T> {
    buffers: Mutex<Vec<Vec<T>>>,
}

impl<T> Clone for BufferPool<T> {
    fn clone(&self) -> Self {
        BufferPool {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for BufferPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> BufferPool<T> {
    pub fn new() -> Self {
        BufferPool {
            inner: Arc::new(Shelves {
                buffers: Mutex::new(Vec::new()),
            }),
        }
    }
}

impl<T: Copy + Default> BufferPool<T> {
    /// Rent a buffer of at least `min_len` elements. Reuses a retained buffer
    /// when one is large enough, otherwise allocates.
    pub fn rent(&self, min_len: usize) -> Lease<T> {
        let mut buf = {
            let mut shelves = self.inner.buffers.lock().unwrap();
            match shelves.iter().position(|b| b.capacity() >= min_len) {
                Some(i) => shelves.swap_remove(i),
                None => Vec::new(),
            }
        };
        let len = buf.capacity().max(min_len);
        buf.resize(len, T::default());
        Lease {
            buf: Some(buf),
            shelves: Arc::clone(&self.inner),
        }
    }
}

/// Exclusive view over a pooled buffer. Dropping the lease returns the
/// buffer to its pool.
pub struct Lease<T> {
    buf: Option<Vec<T>>,
    shelves: Arc<Shelves<T>>,
}

impl<T> Lease<T> {
    /// Zero-length placeholder lease tied to `pool`.
    pub(crate) fn empty(pool: &BufferPool<T>) -> Lease<T> {
        Lease {
            buf: Some(Vec::new()),
            shelves: Arc::clone(&pool.inner),
        }
    }
}

impl<T> Deref for Lease<T> {
    type Target = [T];

    #[inline]
    fn deref(&self) -> &[T] {
        self.buf.as_deref().unwrap_or(&[])
    }
}

impl<T> DerefMut for Lease<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut [T] {
        self.buf.as_deref_mut().unwrap_or(&mut [])
    }
}

impl<T> Drop for Lease<T> {
    fn drop(&mut self) {
        // The buffer slot is taken exactly once; Drop runs once per lease.
        if let Some(buf) = self.buf.take() {
            if buf.capacity() == 0 || buf.capacity() > MAX_RETAINED_CAPACITY {
                return;
            }
            let mut shelves = self.shelves.buffers.lock().unwrap();
            if shelves.len() < MAX_RETAINED {
                shelves.push(buf);
            }
        }
    }
}

/// Grow `lease` to at least `min_len` elements via pool swap: rent a
/// replacement (at least doubling), optionally copy the old contents into
/// its head, release the old buffer. No-op when already large enough.
pub fn ensure_capacity<T: Copy + Default>(
    pool: &BufferPool<T>,
    lease: &mut Lease<T>,
    min_len: usize,
    copy_on_resize: bool,
) {
    if lease.len() >= min_len {
        return;
    }
    let mut grown = pool.rent(min_len.max(lease.len().saturating_mul(2)));
    if copy_on_resize {
        let old = lease.len();
        grown[..old].copy_from_slice(&lease[..old]);
    }
    *lease = grown;
}
