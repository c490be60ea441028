//! Recycling pool for batch vectors.
//!
//! A thread buffer hands its `Vec<LogRecord>` to the queue when it flushes
//! and takes a replacement from here; the writer returns emptied vectors
//! once a batch is written. Steady-state logging therefore stops
//! allocating batch storage after warm-up.

use crate::record::LogRecord;
use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicU64, Ordering};

pub type Batch = Vec<LogRecord>;

pub struct BatchPool {
    free: ArrayQueue<Batch>,
    batch_capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl BatchPool {
    /// `slots` bounds how many idle vectors are retained.
    pub fn new(slots: usize, batch_capacity: usize) -> Self {
        Self {
            free: ArrayQueue::new(slots.max(1)),
            batch_capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Take an empty vector, allocating only when the pool is dry.
    #[inline]
    pub fn get(&self) -> Batch {
        match self.free.pop() {
            Some(batch) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                batch
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Vec::with_capacity(self.batch_capacity)
            }
        }
    }

    /// Return a vector. Oversized or surplus vectors are dropped.
    #[inline]
    pub fn put(&self, mut batch: Batch) {
        if batch.capacity() > self.batch_capacity.saturating_mul(4) {
            return;
        }
        batch.clear();
        let _ = self.free.push(batch);
    }

    pub fn idle(&self) -> usize {
        self.free.len()
    }

    /// `(hits, misses)`
    pub fn counts(&self) -> (u64, u64) {
        (
            self.hits.load(Ordering::Relaxed),
            self.misses.load(Ordering::Relaxed),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::Level;

    #[test]
    fn returned_vectors_are_reused_empty() {
        let pool = BatchPool::new(2, 8);
        let mut batch = pool.get();
        assert_eq!(pool.counts(), (0, 1));
        batch.push(LogRecord::new(Level::Info, "x", Vec::new()));
        let ptr = batch.as_ptr();
        pool.put(batch);
        let again = pool.get();
        assert!(again.is_empty());
        assert_eq!(again.as_ptr(), ptr);
        assert_eq!(pool.counts(), (1, 1));
    }

    #[test]
    fn surplus_vectors_are_dropped() {
        let pool = BatchPool::new(1, 4);
        pool.put(Vec::with_capacity(4));
        pool.put(Vec::with_capacity(4));
        assert_eq!(pool.idle(), 1);
        pool.get();
        pool.put(Vec::with_capacity(1_000));
        assert_eq!(pool.idle(), 0);
    }
}
