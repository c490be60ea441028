//! Per-producer-thread staging buffer.
//!
//! Each (logger, thread) pair owns exactly one [`ThreadBuffer`]. The
//! owning thread appends to it on every log call; other threads only touch
//! it when forcing a flush, sweeping idle buffers or shutting down, so the
//! lock around it is uncontended in steady state.

use crate::pool::{Batch, BatchPool};
use crate::record::LogRecord;
use parking_lot::Mutex;
use std::time::{Duration, Instant};

pub struct ThreadBuffer {
    records: Batch,
    capacity: usize,
    last_flush: Instant,
}

impl ThreadBuffer {
    pub fn new(records: Batch, capacity: usize) -> Self {
        Self {
            records,
            capacity,
            last_flush: Instant::now(),
        }
    }

    #[inline]
    pub fn push(&mut self, record: LogRecord) {
        self.records.push(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.records.len() >= self.capacity
    }

    /// Whether the owner should hand the buffer to the queue now: it is
    /// full, or non-empty and older than `interval`.
    #[inline]
    pub fn is_due(&self, now: Instant, interval: Duration) -> bool {
        self.is_full() || self.is_stale(now, interval)
    }

    /// Non-empty and not flushed for at least `interval`.
    pub fn is_stale(&self, now: Instant, interval: Duration) -> bool {
        !self.records.is_empty() && now.saturating_duration_since(self.last_flush) >= interval
    }

    /// Swap the buffered records out as one batch, leaving an empty vector
    /// from `pool` in their place. Returns `None` when there is nothing to
    /// flush.
    pub fn take(&mut self, pool: &BatchPool) -> Option<Batch> {
        self.last_flush = Instant::now();
        if self.records.is_empty() {
            return None;
        }
        Some(std::mem::replace(&mut self.records, pool.get()))
    }

    /// Put a batch that could not be enqueued back in front of anything
    /// appended since it was taken.
    pub fn restore(&mut self, mut batch: Batch, pool: &BatchPool) {
        batch.append(&mut self.records);
        pool.put(std::mem::replace(&mut self.records, batch));
    }
}

/// A thread's buffer as registered with its logger.
pub struct Slot {
    pub thread_id: u64,
    pub buffer: Mutex<ThreadBuffer>,
}

impl Slot {
    pub fn new(thread_id: u64, buffer: ThreadBuffer) -> Self {
        Self {
            thread_id,
            buffer: Mutex::new(buffer),
        }
    }
}
