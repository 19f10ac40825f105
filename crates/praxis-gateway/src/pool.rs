//! Byte buffer pool for request-body capture.
//!
//! Every request body is copied into a buffer so the cache layer can derive
//! keys from body fields after the handler chain consumed the stream. The
//! pool bounds allocation churn by recycling those buffers.

use parking_lot::Mutex;

/// Buffers larger than this are dropped instead of recycled so one giant
/// upload does not pin its allocation forever.
const MAX_RETAINED_CAPACITY: usize = 1024 * 1024;

/// A pool of reusable byte buffers.
#[derive(Default)]
pub struct BufferPool {
    free: Mutex<Vec<Vec<u8>>>,
}

impl BufferPool {
    /// Create an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a cleared buffer from the pool, or allocate a fresh one.
    #[must_use]
    pub fn get(&self) -> Vec<u8> {
        self.free.lock().pop().unwrap_or_default()
    }

    /// Return a buffer to the pool.
    pub fn put(&self, mut buffer: Vec<u8>) {
        if buffer.capacity() > MAX_RETAINED_CAPACITY {
            return;
        }
        buffer.clear();
        self.free.lock().push(buffer);
    }

    /// Number of idle buffers currently held.
    #[must_use]
    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffers_are_recycled_cleared() {
        let pool = BufferPool::new();
        let mut buffer = pool.get();
        buffer.extend_from_slice(b"hello");
        let capacity = buffer.capacity();
        pool.put(buffer);

        assert_eq!(pool.idle(), 1);
        let recycled = pool.get();
        assert!(recycled.is_empty());
        assert_eq!(recycled.capacity(), capacity);
        assert_eq!(pool.idle(), 0);
    }

    #[test]
    fn oversized_buffers_are_dropped() {
        let pool = BufferPool::new();
        let buffer = Vec::with_capacity(MAX_RETAINED_CAPACITY + 1);
        pool.put(buffer);
        assert_eq!(pool.idle(), 0);
    }
}
