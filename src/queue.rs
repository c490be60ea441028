//! Bounded multi-producer/single-consumer FIFO of record batches.
//!
//! This is the only structure written by more than one thread on the
//! logging path. Capacity is counted in batches, not records.

use crate::config::Backpressure;
use crate::error::ConfigError;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Why a batch was not enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// Queue full under [`Backpressure::DropNewest`] or `try_push`.
    Full,
    /// Queue stayed full for the whole [`Backpressure::Block`] timeout.
    TimedOut,
    /// Queue was closed.
    Closed,
}

/// Result of a push. Rejected and evicted batches are handed back so the
/// caller can account for the records they carried.
#[derive(Debug)]
pub enum PushOutcome<T> {
    Enqueued,
    /// Enqueued after evicting the oldest queued batch.
    Displaced(T),
    Rejected { batch: T, reason: Rejection },
}

impl<T> PushOutcome<T> {
    /// `true` if the pushed batch is now in the queue.
    pub fn enqueued(&self) -> bool {
        !matches!(self, PushOutcome::Rejected { .. })
    }
}

struct State<T> {
    items: VecDeque<T>,
    closed: bool,
    high_water: usize,
    /// Batches that have left the front, popped or evicted. Removal is
    /// strictly FIFO, so this is also the sequence number of the front.
    departed: u64,
}

pub struct BoundedQueue<T> {
    state: Mutex<State<T>>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
    accepted: AtomicU64,
    dropped: AtomicU64,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Result<Self, ConfigError> {
        if capacity == 0 {
            return Err(ConfigError::NonPositive {
                name: "queue_capacity",
            });
        }
        Ok(Self {
            state: Mutex::new(State {
                items: VecDeque::with_capacity(capacity.min(4_096)),
                closed: false,
                high_water: 0,
                departed: 0,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
            accepted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        })
    }

    /// Enqueue one batch, applying `policy` if the queue is full.
    ///
    /// Safe to call concurrently from any number of producer threads.
    pub fn push(&self, batch: T, policy: Backpressure) -> PushOutcome<T> {
        let mut state = self.state.lock();
        if state.closed {
            return PushOutcome::Rejected {
                batch,
                reason: Rejection::Closed,
            };
        }

        let mut displaced = None;
        if state.items.len() >= self.capacity {
            match policy {
                Backpressure::DropNewest => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    return PushOutcome::Rejected {
                        batch,
                        reason: Rejection::Full,
                    };
                }
                Backpressure::DropOldest => {
                    displaced = state.items.pop_front();
                    state.departed += 1;
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                }
                Backpressure::Block { timeout } => {
                    if let Err(reason) = self.wait_for_space(&mut state, Instant::now() + timeout) {
                        if reason == Rejection::TimedOut {
                            self.dropped.fetch_add(1, Ordering::Relaxed);
                        }
                        return PushOutcome::Rejected { batch, reason };
                    }
                }
            }
        }

        self.enqueue_locked(&mut state, batch);
        drop(state);
        self.not_empty.notify_one();

        match displaced {
            Some(old) => PushOutcome::Displaced(old),
            None => PushOutcome::Enqueued,
        }
    }

    /// Wait up to `timeout` for space like [`Backpressure::Block`], but a
    /// batch rejected for lack of space is not counted as dropped: the
    /// caller still owns it.
    pub fn push_within(&self, batch: T, timeout: Duration) -> PushOutcome<T> {
        let mut state = self.state.lock();
        if let Err(reason) = self.wait_for_space(&mut state, Instant::now() + timeout) {
            return PushOutcome::Rejected { batch, reason };
        }
        self.enqueue_locked(&mut state, batch);
        drop(state);
        self.not_empty.notify_one();
        PushOutcome::Enqueued
    }

    fn wait_for_space(
        &self,
        state: &mut MutexGuard<'_, State<T>>,
        deadline: Instant,
    ) -> Result<(), Rejection> {
        while state.items.len() >= self.capacity && !state.closed {
            if self.not_full.wait_until(state, deadline).timed_out() {
                break;
            }
        }
        if state.closed {
            Err(Rejection::Closed)
        } else if state.items.len() >= self.capacity {
            Err(Rejection::TimedOut)
        } else {
            Ok(())
        }
    }

    /// Enqueue without waiting; a full queue rejects with [`Rejection::Full`]
    /// and is not counted as a backpressure drop.
    pub fn try_push(&self, batch: T) -> PushOutcome<T> {
        let mut state = self.state.lock();
        let reason = if state.closed {
            Rejection::Closed
        } else if state.items.len() >= self.capacity {
            Rejection::Full
        } else {
            self.enqueue_locked(&mut state, batch);
            drop(state);
            self.not_empty.notify_one();
            return PushOutcome::Enqueued;
        };
        PushOutcome::Rejected { batch, reason }
    }

    fn enqueue_locked(&self, state: &mut State<T>, batch: T) {
        state.items.push_back(batch);
        state.high_water = state.high_water.max(state.items.len());
        self.accepted.fetch_add(1, Ordering::Release);
    }

    /// Remove the oldest batch.
    ///
    /// Waits until a batch arrives, the queue is closed, or `timeout`
    /// elapses (`None` waits indefinitely). Consumer side only.
    pub fn pop_batch(&self, timeout: Option<Duration>) -> Option<T> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.state.lock();
        while state.items.is_empty() && !state.closed {
            match deadline {
                Some(deadline) => {
                    if self.not_empty.wait_until(&mut state, deadline).timed_out() {
                        break;
                    }
                }
                None => self.not_empty.wait(&mut state),
            }
        }
        let batch = state.items.pop_front();
        if batch.is_some() {
            state.departed += 1;
            drop(state);
            self.not_full.notify_one();
        }
        batch
    }

    /// Remove the oldest batch if one is queued, without waiting.
    pub fn try_pop(&self) -> Option<T> {
        let mut state = self.state.lock();
        let batch = state.items.pop_front();
        if batch.is_some() {
            state.departed += 1;
            drop(state);
            self.not_full.notify_one();
        }
        batch
    }

    /// Remove every queued batch at once without waiting. Used on shutdown.
    pub fn drain_all(&self) -> Vec<T> {
        let mut state = self.state.lock();
        let drained: Vec<T> = state.items.drain(..).collect();
        state.departed += drained.len() as u64;
        drop(state);
        if !drained.is_empty() {
            self.not_full.notify_all();
        }
        drained
    }

    /// Reject all further pushes and wake every waiter. Idempotent.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Largest number of batches ever queued at once.
    pub fn high_water(&self) -> usize {
        self.state.lock().high_water
    }

    /// Batches ever enqueued, including ones later evicted.
    pub fn accepted_batches(&self) -> u64 {
        self.accepted.load(Ordering::Acquire)
    }

    /// Batches that have left the queue, by pop, drain or eviction. The
    /// `n` oldest accepted batches are gone once this reaches `n`.
    pub fn departed(&self) -> u64 {
        self.state.lock().departed
    }

    /// Batches lost to backpressure (full, timed out or evicted).
    pub fn dropped_batches(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn block(ms: u64) -> Backpressure {
        Backpressure::Block {
            timeout: Duration::from_millis(ms),
        }
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(BoundedQueue::<u32>::new(0).is_err());
    }

    #[test]
    fn push_and_pop_in_fifo_order() {
        let q = BoundedQueue::new(3).unwrap();
        assert!(q.push(1, block(10)).enqueued());
        assert!(q.push(2, block(10)).enqueued());
        assert_eq!(q.pop_batch(Some(Duration::ZERO)), Some(1));
        assert_eq!(q.pop_batch(Some(Duration::ZERO)), Some(2));
        assert_eq!(q.pop_batch(Some(Duration::from_millis(5))), None);
    }

    #[test]
    fn wraps_around_many_times() {
        let q = BoundedQueue::new(2).unwrap();
        for i in 0..100 {
            assert!(q.push(i, block(10)).enqueued());
            assert_eq!(q.try_pop(), Some(i));
        }
        assert_eq!(q.high_water(), 1);
        assert_eq!(q.accepted_batches(), 100);
    }

    #[test]
    fn block_waits_for_space() {
        let q = Arc::new(BoundedQueue::new(2).unwrap());
        q.push("a", block(10));
        q.push("b", block(10));

        let producer = {
            let q = Arc::clone(&q);
            thread::spawn(move || q.push("c", block(5_000)).enqueued())
        };
        thread::sleep(Duration::from_millis(50));
        assert_eq!(q.len(), 2);
        assert_eq!(q.pop_batch(None), Some("a"));
        assert!(producer.join().unwrap());
        assert_eq!(q.drain_all(), vec!["b", "c"]);
        assert_eq!(q.dropped_batches(), 0);
    }

    #[test]
    fn block_times_out_and_counts_drop() {
        let q = BoundedQueue::new(1).unwrap();
        q.push(1, block(10));
        let outcome = q.push(2, block(20));
        assert!(matches!(
            outcome,
            PushOutcome::Rejected { batch: 2, reason: Rejection::TimedOut }
        ));
        assert_eq!(q.dropped_batches(), 1);
    }

    #[test]
    fn drop_newest_rejects_immediately() {
        let q = BoundedQueue::new(1).unwrap();
        q.push(1, Backpressure::DropNewest);
        let outcome = q.push(2, Backpressure::DropNewest);
        assert!(matches!(
            outcome,
            PushOutcome::Rejected { batch: 2, reason: Rejection::Full }
        ));
        assert_eq!(q.drain_all(), vec![1]);
        assert_eq!(q.dropped_batches(), 1);
    }

    #[test]
    fn drop_oldest_evicts_front() {
        let q = BoundedQueue::new(2).unwrap();
        q.push(1, Backpressure::DropOldest);
        q.push(2, Backpressure::DropOldest);
        let outcome = q.push(3, Backpressure::DropOldest);
        assert!(matches!(outcome, PushOutcome::Displaced(1)));
        assert!(outcome.enqueued());
        assert_eq!(q.drain_all(), vec![2, 3]);
        assert_eq!(q.dropped_batches(), 1);
    }

    #[test]
    fn departures_count_pops_evictions_and_drains() {
        let q = BoundedQueue::new(2).unwrap();
        q.push(1, Backpressure::DropOldest);
        q.push(2, Backpressure::DropOldest);
        q.push(3, Backpressure::DropOldest);
        assert_eq!(q.departed(), 1);
        assert_eq!(q.try_pop(), Some(2));
        assert_eq!(q.departed(), 2);
        q.push(4, Backpressure::DropNewest);
        assert_eq!(q.drain_all(), vec![3, 4]);
        assert_eq!(q.departed(), 4);
        assert_eq!(q.departed(), q.accepted_batches());
    }

    #[test]
    fn push_within_hands_back_without_counting() {
        let q = BoundedQueue::new(1).unwrap();
        assert!(q.push_within(1, Duration::from_millis(5)).enqueued());
        let start = Instant::now();
        assert!(matches!(
            q.push_within(2, Duration::from_millis(20)),
            PushOutcome::Rejected { batch: 2, reason: Rejection::TimedOut }
        ));
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(q.dropped_batches(), 0);
        q.close();
        assert!(matches!(
            q.push_within(3, Duration::from_millis(20)),
            PushOutcome::Rejected { batch: 3, reason: Rejection::Closed }
        ));
    }

    #[test]
    fn try_push_does_not_count_drops() {
        let q = BoundedQueue::new(1).unwrap();
        assert!(q.try_push(1).enqueued());
        assert!(!q.try_push(2).enqueued());
        assert_eq!(q.dropped_batches(), 0);
    }

    #[test]
    fn close_wakes_blocked_producer() {
        let q = Arc::new(BoundedQueue::<u8>::new(1).unwrap());
        q.push(0, block(10));
        let blocked = {
            let q = Arc::clone(&q);
            thread::spawn(move || q.push(1, block(10_000)))
        };
        thread::sleep(Duration::from_millis(30));
        q.close();
        assert!(matches!(
            blocked.join().unwrap(),
            PushOutcome::Rejected { batch: 1, reason: Rejection::Closed }
        ));
        assert!(matches!(
            q.push(9, Backpressure::DropNewest),
            PushOutcome::Rejected { reason: Rejection::Closed, .. }
        ));
        assert!(q.is_closed());
        // queued batches survive close for the final drain
        assert_eq!(q.drain_all(), vec![0]);
    }

    #[test]
    fn close_wakes_waiting_consumer() {
        let q = Arc::new(BoundedQueue::<u8>::new(1).unwrap());
        let consumer = {
            let q = Arc::clone(&q);
            thread::spawn(move || q.pop_batch(None))
        };
        thread::sleep(Duration::from_millis(30));
        q.close();
        assert_eq!(consumer.join().unwrap(), None);
    }

    #[test]
    fn pop_on_closed_empty_queue_returns_immediately() {
        let q = BoundedQueue::<u8>::new(4).unwrap();
        q.close();
        let start = Instant::now();
        assert_eq!(q.pop_batch(None), None);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn drain_all_empties_without_waiting() {
        let q = BoundedQueue::new(8).unwrap();
        for i in 0..5 {
            q.push(i, Backpressure::DropNewest);
        }
        assert_eq!(q.drain_all(), vec![0, 1, 2, 3, 4]);
        assert!(q.is_empty());
        assert!(q.drain_all().is_empty());
    }
}
