use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::utils::errors::Fault;

/// A thread-safe pool of accumulation buffers.
///
/// Maintains a pool of reusable byte buffers to minimize allocations while frames
/// are collated, and counts the buffers that are currently handed out so the
/// number of simultaneously live buffers stays bounded.
#[derive(Debug, Clone)]
pub struct BufferPool {
    state: Arc<Mutex<PoolState>>,
    max_size: usize,
    buffer_capacity: usize,
    max_live: usize,
}

#[derive(Debug, Default)]
struct PoolState {
    free: VecDeque<Vec<u8>>,
    live: usize,
    peak_live: usize,
}

impl BufferPool {
    /// Creates a new buffer pool with the specified parameters.
    ///
    /// # Arguments
    ///
    /// * `max_size` - Maximum number of idle buffers to keep in the pool
    /// * `buffer_capacity` - Initial capacity for each buffer
    pub fn new(max_size: usize, buffer_capacity: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(PoolState {
                free: VecDeque::with_capacity(max_size),
                ..Default::default()
            })),
            max_size,
            buffer_capacity,
            max_live: usize::MAX,
        }
    }

    /// Limits how many buffers may be handed out at the same time.
    pub fn with_live_limit(mut self, max_live: usize) -> Self {
        self.max_live = max_live;
        self
    }

    /// Acquires a buffer from the pool or creates a new one if none available.
    pub fn acquire(&self) -> Result<Vec<u8>, Fault> {
        let mut state = self.lock();
        if state.live >= self.max_live {
            return Err(Fault::BufferExhausted {
                live: state.live,
                limit: self.max_live,
            });
        }

        state.live += 1;
        state.peak_live = state.peak_live.max(state.live);

        Ok(state
            .free
            .pop_front()
            .unwrap_or_else(|| Vec::with_capacity(self.buffer_capacity)))
    }

    /// Returns a buffer to the pool for reuse.
    pub fn release(&self, mut buffer: Vec<u8>) {
        buffer.clear();

        let mut state = self.lock();
        state.live = state.live.saturating_sub(1);
        if state.free.len() < self.max_size {
            state.free.push_back(buffer);
        }
    }

    /// Buffers currently handed out.
    pub fn live(&self) -> usize {
        self.lock().live
    }

    /// Highest number of buffers that were handed out at the same time.
    pub fn peak_live(&self) -> usize {
        self.lock().peak_live
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(4, 64 * 1024)
    }
}

#[test]
fn live_limit() -> anyhow::Result<()> {
    let pool = BufferPool::new(2, 16).with_live_limit(2);

    let a = pool.acquire()?;
    let b = pool.acquire()?;
    assert_eq!(pool.live(), 2);
    assert!(matches!(
        pool.acquire(),
        Err(Fault::BufferExhausted { live: 2, limit: 2 })
    ));

    pool.release(a);
    let c = pool.acquire()?;
    assert!(c.is_empty());

    pool.release(b);
    pool.release(c);
    assert_eq!(pool.live(), 0);
    assert_eq!(pool.peak_live(), 2);
    Ok(())
}
