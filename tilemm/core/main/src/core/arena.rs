/// Scratch buffer pooling for transpose, dequantization and output tiles.
///
/// A `BufferPool` keeps released `Vec<T>` allocations and hands them back on
/// the next `checkout()`. Every checkout is zero-filled to the requested
/// length, so a buffer recycled from a differently-shaped call never leaks
/// stale values. Buffers go back to the pool when the `PooledBuffer` guard is
/// dropped, on every exit path including unwinding.
use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::api::types::Element;

/// Maximum number of idle buffers kept per element type.
pub(crate) const DEFAULT_POOL_CAPACITY: usize = 32;

pub(crate) static F32_POOL: BufferPool<f32> = BufferPool::new(DEFAULT_POOL_CAPACITY);
pub(crate) static F64_POOL: BufferPool<f64> = BufferPool::new(DEFAULT_POOL_CAPACITY);

/// A thread-safe pool of reusable element buffers.
pub struct BufferPool<T> {
    buffers: Mutex<Vec<Vec<T>>>,
    capacity: usize,
}

impl<T> BufferPool<T> {
    /// Create a new pool with the given maximum number of cached buffers.
    pub const fn new(capacity: usize) -> Self {
        Self {
            buffers: Mutex::new(Vec::new()),
            capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Vec<T>>> {
        self.buffers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the number of buffers currently idle in the pool.
    pub fn cached(&self) -> usize {
        self.lock().len()
    }

    /// Drop every idle buffer.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn put(&self, buf: Vec<T>) {
        let mut buffers = self.lock();
        if buffers.len() < self.capacity {
            buffers.push(buf);
        }
    }
}

impl<T: Element> BufferPool<T> {
    /// Get a zero-filled buffer of exactly `len` elements.
    ///
    /// The smallest idle buffer whose capacity fits is reused; otherwise a
    /// new one is allocated.
    pub fn checkout(&self, len: usize) -> PooledBuffer<'_, T> {
        let reused = {
            let mut buffers = self.lock();
            let mut best_idx = None;
            let mut best_cap = usize::MAX;
            for (i, buf) in buffers.iter().enumerate() {
                let cap = buf.capacity();
                if cap >= len && cap < best_cap {
                    best_idx = Some(i);
                    best_cap = cap;
                }
            }
            best_idx.map(|idx| buffers.swap_remove(idx))
        };

        let mut buf = reused.unwrap_or_default();
        buf.clear();
        buf.resize(len, T::ZERO);
        PooledBuffer {
            buf: Some(buf),
            pool: self,
        }
    }
}

/// A buffer on loan from a [`BufferPool`]; returned to the pool on drop.
pub struct PooledBuffer<'a, T> {
    buf: Option<Vec<T>>,
    pool: &'a BufferPool<T>,
}

impl<T> PooledBuffer<'_, T> {
    /// Detach the buffer from the pool; it will not be recycled.
    pub fn into_vec(mut self) -> Vec<T> {
        self.buf.take().unwrap_or_default()
    }
}

impl<T> Deref for PooledBuffer<'_, T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        self.buf.as_deref().unwrap_or(&[])
    }
}

impl<T> DerefMut for PooledBuffer<'_, T> {
    fn deref_mut(&mut self) -> &mut [T] {
        self.buf.as_deref_mut().unwrap_or(&mut [])
    }
}

impl<T> Drop for PooledBuffer<'_, T> {
    fn drop(&mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.put(buf);
        }
    }
}
