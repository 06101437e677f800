use parking_lot::Mutex;

/// Maximum number of idle buffers kept for reuse.
const MAX_IDLE_BUFFERS: usize = 6;

/// A small free list of pixel buffers shared by the decoder (producer) and the
/// render thread (consumer), so steady-state streaming does not allocate per frame.
#[derive(Debug, Default)]
pub struct BufferPool {
    idle: Mutex<Vec<Vec<u8>>>,
}

impl BufferPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a buffer of exactly `len` bytes, reusing an idle one when possible.
    /// Contents are unspecified.
    pub fn take(&self, len: usize) -> Vec<u8> {
        let reused = {
            let mut idle = self.idle.lock();
            match idle.iter().position(|buf| buf.capacity() >= len) {
                Some(index) => Some(idle.swap_remove(index)),
                None => None,
            }
        };
        let mut buf = reused.unwrap_or_default();
        buf.resize(len, 0);
        buf
    }

    /// Return a buffer for later reuse. Extra buffers beyond the idle cap are dropped.
    pub fn give(&self, buf: Vec<u8>) {
        if buf.capacity() == 0 {
            return;
        }
        let mut idle = self.idle.lock();
        if idle.len() < MAX_IDLE_BUFFERS {
            idle.push(buf);
        }
    }

    /// Number of buffers currently idle.
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_reuses_returned_buffer() {
        let pool = BufferPool::new();
        let mut buf = pool.take(12);
        buf[0] = 7;
        let ptr = buf.as_ptr();
        pool.give(buf);
        assert_eq!(pool.idle_count(), 1);

        let again = pool.take(12);
        assert_eq!(again.as_ptr(), ptr);
        assert_eq!(again.len(), 12);
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn test_pool_allocates_when_too_small() {
        let pool = BufferPool::new();
        pool.give(Vec::with_capacity(4));
        let buf = pool.take(64);
        assert_eq!(buf.len(), 64);
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn test_pool_caps_idle_buffers() {
        let pool = BufferPool::new();
        for _ in 0..(MAX_IDLE_BUFFERS + 3) {
            pool.give(vec![0u8; 8]);
        }
        assert_eq!(pool.idle_count(), MAX_IDLE_BUFFERS);
    }
}
