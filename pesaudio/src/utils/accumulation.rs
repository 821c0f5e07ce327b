use std::mem;

use crate::utils::buffer_pool::BufferPool;
use crate::utils::errors::Fault;

/// Exclusively owned byte region that collated bytes are copied into.
///
/// The storage comes from a [`BufferPool`] and goes back to it when the buffer is
/// dropped. Moving the whole value is how ownership is handed to the recovery path
/// while a fresh buffer takes over forward progress.
#[derive(Debug)]
pub struct AccumulationBuffer {
    data: Vec<u8>,
    limit: usize,
    pool: BufferPool,
}

impl AccumulationBuffer {
    /// Takes a buffer from `pool` that refuses to grow past `limit` bytes.
    pub fn acquire(pool: &BufferPool, limit: usize) -> Result<Self, Fault> {
        Ok(Self {
            data: pool.acquire()?,
            limit,
            pool: pool.clone(),
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// The last `n` accumulated bytes.
    #[inline]
    pub fn tail(&self, n: usize) -> &[u8] {
        &self.data[self.data.len().saturating_sub(n)..]
    }

    pub fn push(&mut self, bytes: &[u8]) -> Result<(), Fault> {
        let length = self.data.len() + bytes.len();
        if length > self.limit {
            return Err(Fault::ImplausibleLength {
                length,
                max: self.limit,
            });
        }

        self.data.extend_from_slice(bytes);
        Ok(())
    }

    pub fn truncate(&mut self, len: usize) {
        self.data.truncate(len);
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// Removes and returns the first `n` bytes, keeping the rest accumulated.
    pub fn split_front(&mut self, n: usize) -> Vec<u8> {
        let n = n.min(self.data.len());
        let front = self.data[..n].to_vec();
        self.data.drain(..n);
        front
    }

    pub fn shrink_to_fit(&mut self) {
        self.data.shrink_to_fit();
    }
}

impl Drop for AccumulationBuffer {
    fn drop(&mut self) {
        self.pool.release(mem::take(&mut self.data));
    }
}

#[test]
fn handoff_returns_storage() -> anyhow::Result<()> {
    let pool = BufferPool::new(2, 8).with_live_limit(2);

    let mut current = AccumulationBuffer::acquire(&pool, 8)?;
    current.push(&[1, 2, 3, 4])?;

    let fresh = AccumulationBuffer::acquire(&pool, 8)?;
    let mut old = mem::replace(&mut current, fresh);
    old.shrink_to_fit();
    assert_eq!(pool.live(), 2);
    assert_eq!(old.tail(2), &[3, 4]);

    drop(old);
    assert_eq!(pool.live(), 1);
    assert!(current.is_empty());
    Ok(())
}

#[test]
fn push_respects_limit() -> anyhow::Result<()> {
    let pool = BufferPool::default();
    let mut acc = AccumulationBuffer::acquire(&pool, 4)?;

    acc.push(&[0xAA; 3])?;
    assert_eq!(
        acc.push(&[0xBB; 2]),
        Err(Fault::ImplausibleLength { length: 5, max: 4 })
    );
    assert_eq!(acc.len(), 3);

    acc.push(&[0xCC])?;
    assert_eq!(acc.split_front(3), vec![0xAA; 3]);
    assert_eq!(acc.as_slice(), &[0xCC]);
    Ok(())
}
