//! Reusable byte buffers for source images.
//!
//! Every request reads one or more whole images into memory. Allocating a
//! fresh `Vec` for each of them churns the allocator under load, so buffers
//! are checked out of a shared [`BufferPool`] and handed back when the
//! [`SourceBuffer`] handle is dropped.
//!
//! Buffers that grew beyond `max_retained_capacity` are released to the
//! allocator instead of being pooled, which bounds the memory the pool can
//! pin after a burst of large images.

use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard};

/// Capacity of freshly allocated buffers.
pub const DEFAULT_INITIAL_CAPACITY: usize = 1024;

/// Buffers above this capacity are dropped rather than returned (3 MiB).
pub const DEFAULT_MAX_RETAINED_CAPACITY: usize = 3 * 1024 * 1024;

/// Upper bound on the number of idle buffers kept around.
pub const DEFAULT_MAX_POOLED: usize = 64;

struct PoolInner {
    free: Mutex<Vec<Vec<u8>>>,
    max_retained_capacity: usize,
    max_pooled: usize,
}

impl PoolInner {
    fn free_list(&self) -> MutexGuard<'_, Vec<Vec<u8>>> {
        // A panic while holding the lock cannot leave the free list inconsistent.
        self.free.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn release(&self, mut data: Vec<u8>) {
        if data.capacity() > self.max_retained_capacity {
            return;
        }
        let mut free = self.free_list();
        if free.len() < self.max_pooled {
            data.clear();
            free.push(data);
        }
    }
}

/// Process-wide pool of byte buffers.
///
/// Cloning is cheap; clones share the same free list.
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

impl BufferPool {
    /// Create a pool with default limits.
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_RETAINED_CAPACITY, DEFAULT_MAX_POOLED)
    }

    /// Create a pool with explicit limits.
    ///
    /// # Arguments
    ///
    /// * `max_retained_capacity` - Largest buffer capacity that is returned to the pool
    /// * `max_pooled` - Maximum number of idle buffers kept
    pub fn with_limits(max_retained_capacity: usize, max_pooled: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                free: Mutex::new(Vec::new()),
                max_retained_capacity,
                max_pooled,
            }),
        }
    }

    /// Check out an empty buffer.
    pub fn checkout(&self) -> SourceBuffer {
        let data = self
            .inner
            .free_list()
            .pop()
            .unwrap_or_else(|| Vec::with_capacity(DEFAULT_INITIAL_CAPACITY));

        SourceBuffer {
            data,
            pool: Some(Arc::clone(&self.inner)),
        }
    }

    /// Number of idle buffers currently pooled.
    pub fn pooled_buffers(&self) -> usize {
        self.inner.free_list().len()
    }

    /// Total capacity in bytes held by idle buffers.
    pub fn pooled_bytes(&self) -> usize {
        self.inner.free_list().iter().map(Vec::capacity).sum()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Owned image bytes, returned to their pool on drop.
///
/// A checked-out buffer belongs to exactly one request; it is `Send` so it
/// can move into the blocking transform worker, but it is never shared.
pub struct SourceBuffer {
    data: Vec<u8>,
    pool: Option<Arc<PoolInner>>,
}

impl SourceBuffer {
    /// Mutable access to the underlying vector, for filling it.
    pub fn as_mut_vec(&mut self) -> &mut Vec<u8> {
        &mut self.data
    }
}

impl Deref for SourceBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl AsRef<[u8]> for SourceBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl std::fmt::Debug for SourceBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceBuffer")
            .field("len", &self.data.len())
            .field("capacity", &self.data.capacity())
            .field("pooled", &self.pool.is_some())
            .finish()
    }
}

impl Drop for SourceBuffer {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.release(std::mem::take(&mut self.data));
        }
    }
}
