//! State shared by logger handles, producer threads and the writer.

use crate::buffer::{Slot, ThreadBuffer};
use crate::config::{Backpressure, LoggerConfig};
use crate::error::ConfigError;
use crate::pool::{Batch, BatchPool};
use crate::queue::{BoundedQueue, PushOutcome, Rejection};
use crate::record::{current_thread_id, LogRecord};
use crate::stats::PipelineStats;
use crate::writer::WriterState;
use parking_lot::{Condvar, Mutex};
use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

static NEXT_PIPELINE_ID: AtomicU64 = AtomicU64::new(1);

/// Watermark over accepted batches: every batch with a sequence number
/// below it has been written (or given up on) or was evicted.
///
/// Only the writer advances it, and only once it holds no popped batch,
/// so an eviction can never carry it past a batch still being written.
#[derive(Default)]
pub(crate) struct Progress {
    through: Mutex<u64>,
    changed: Condvar,
}

impl Progress {
    pub(crate) fn advance(&self, through: u64) {
        let mut current = self.through.lock();
        if through > *current {
            *current = through;
            drop(current);
            self.changed.notify_all();
        }
    }

    #[cfg(test)]
    pub(crate) fn through(&self) -> u64 {
        *self.through.lock()
    }

    /// Wait until the first `target` accepted batches are done. `false`
    /// on timeout.
    pub(crate) fn wait_for(&self, target: u64, deadline: Instant) -> bool {
        let mut through = self.through.lock();
        while *through < target {
            if self.changed.wait_until(&mut through, deadline).timed_out() {
                return *through >= target;
            }
        }
        true
    }

    /// Wake waiters without progress, e.g. when the writer stops.
    pub(crate) fn wake(&self) {
        self.changed.notify_all();
    }
}

pub(crate) struct Pipeline {
    pub(crate) id: u64,
    pub(crate) config: LoggerConfig,
    pub(crate) queue: BoundedQueue<Batch>,
    pub(crate) pool: BatchPool,
    pub(crate) stats: PipelineStats,
    pub(crate) progress: Progress,
    slots: Mutex<Vec<Arc<Slot>>>,
    closed: AtomicBool,
    writer_state: AtomicU8,
}

impl Pipeline {
    pub(crate) fn new(config: LoggerConfig) -> Result<Arc<Self>, ConfigError> {
        config.validate()?;
        let queue = BoundedQueue::new(config.queue_capacity)?;
        // One spare vector per queued batch would be wasteful for large
        // presets; a few hundred covers every thread's swap plus the writer.
        let pool = BatchPool::new(config.queue_capacity.min(512), config.thread_buffer_capacity);
        Ok(Arc::new(Self {
            id: NEXT_PIPELINE_ID.fetch_add(1, Ordering::Relaxed),
            config,
            queue,
            pool,
            stats: PipelineStats::default(),
            progress: Progress::default(),
            slots: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            writer_state: AtomicU8::new(WriterState::Starting as u8),
        }))
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Mark closed. Returns `true` for the first caller only.
    pub(crate) fn mark_closed(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn writer_state(&self) -> WriterState {
        WriterState::from_u8(self.writer_state.load(Ordering::Acquire))
    }

    pub(crate) fn set_writer_state(&self, state: WriterState) {
        self.writer_state.store(state as u8, Ordering::Release);
        if state == WriterState::Stopped {
            self.progress.wake();
        }
    }

    /// Hot path: stage `record` in the calling thread's buffer and hand
    /// the buffer to the queue once it is due.
    pub(crate) fn append(self: &Arc<Self>, record: LogRecord) {
        PipelineStats::add(&self.stats.records_logged, 1);
        let Some(slot) = self.local_slot() else {
            // Thread-local storage is being torn down; ship the record alone.
            let mut batch = self.pool.get();
            batch.push(record);
            self.submit(batch, self.config.backpressure);
            return;
        };

        let mut buffer = slot.buffer.lock();
        buffer.push(record);
        if buffer.is_due(Instant::now(), self.config.flush_interval) {
            if let Some(batch) = buffer.take(&self.pool) {
                // The slot stays locked across the push so a concurrent
                // flush or sweep cannot overtake this batch.
                self.submit(batch, self.config.backpressure);
            }
        }
    }

    /// Push one batch and account for whatever the queue refused.
    pub(crate) fn submit(&self, batch: Batch, policy: Backpressure) -> bool {
        let records = batch.len() as u64;
        let outcome = self.queue.push(batch, policy);
        self.settle(records, outcome)
    }

    fn settle(&self, records: u64, outcome: PushOutcome<Batch>) -> bool {
        match outcome {
            PushOutcome::Enqueued => {
                PipelineStats::add(&self.stats.batches_enqueued, 1);
                true
            }
            PushOutcome::Displaced(old) => {
                PipelineStats::add(&self.stats.batches_enqueued, 1);
                PipelineStats::add(&self.stats.records_dropped, old.len() as u64);
                self.pool.put(old);
                true
            }
            PushOutcome::Rejected { batch, reason } => {
                let counter = match reason {
                    Rejection::Closed => &self.stats.records_rejected_closed,
                    Rejection::Full | Rejection::TimedOut => &self.stats.records_dropped,
                };
                PipelineStats::add(counter, records);
                self.pool.put(batch);
                false
            }
        }
    }

    /// Push every registered thread buffer to the queue.
    pub(crate) fn flush_all_buffers(&self) {
        for slot in self.slots_snapshot() {
            let mut buffer = slot.buffer.lock();
            if let Some(batch) = buffer.take(&self.pool) {
                self.submit(batch, self.config.backpressure);
            }
        }
    }

    /// Like [`Pipeline::flush_all_buffers`], but a blocking push never
    /// waits past `deadline`. A batch that finds no room in time goes back
    /// into its buffer and `false` is returned.
    pub(crate) fn flush_buffers_until(&self, deadline: Instant) -> bool {
        for slot in self.slots_snapshot() {
            let mut buffer = slot.buffer.lock();
            let Some(batch) = buffer.take(&self.pool) else {
                continue;
            };
            let records = batch.len() as u64;
            let outcome = match self.config.backpressure {
                Backpressure::Block { timeout } => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining >= timeout {
                        self.queue.push(batch, self.config.backpressure)
                    } else {
                        match self.queue.push_within(batch, remaining) {
                            PushOutcome::Rejected {
                                batch,
                                reason: Rejection::TimedOut,
                            } => {
                                buffer.restore(batch, &self.pool);
                                return false;
                            }
                            outcome => outcome,
                        }
                    }
                }
                policy => self.queue.push(batch, policy),
            };
            self.settle(records, outcome);
        }
        true
    }

    /// Ship the calling thread's buffer now. Used when a record may have
    /// landed after `close()` collected the buffers.
    pub(crate) fn flush_local_buffer(self: &Arc<Self>) -> bool {
        let Some(slot) = self.local_slot() else {
            return true;
        };
        let mut buffer = slot.buffer.lock();
        match buffer.take(&self.pool) {
            Some(batch) => self.submit(batch, self.config.backpressure),
            None => true,
        }
    }

    /// Writer-side: enqueue buffers that have sat idle past the flush
    /// interval. Never waits: busy slots are skipped and a full queue
    /// leaves the records where they were.
    pub(crate) fn sweep_stale_buffers(&self) {
        let now = Instant::now();
        for slot in self.slots_snapshot() {
            let Some(mut buffer) = slot.buffer.try_lock() else {
                continue;
            };
            if !buffer.is_stale(now, self.config.flush_interval) {
                continue;
            }
            if let Some(batch) = buffer.take(&self.pool) {
                match self.queue.try_push(batch) {
                    PushOutcome::Rejected { batch, .. } => buffer.restore(batch, &self.pool),
                    _ => PipelineStats::add(&self.stats.batches_enqueued, 1),
                }
            }
        }
    }

    pub(crate) fn thread_count(&self) -> usize {
        self.slots.lock().len()
    }

    fn slots_snapshot(&self) -> Vec<Arc<Slot>> {
        self.slots.lock().clone()
    }

    fn register(&self) -> Arc<Slot> {
        let buffer = ThreadBuffer::new(self.pool.get(), self.config.thread_buffer_capacity);
        let slot = Arc::new(Slot::new(current_thread_id(), buffer));
        self.slots.lock().push(Arc::clone(&slot));
        slot
    }

    /// Called when a producer thread exits: ship what it left behind and
    /// forget its slot.
    fn retire_slot(&self, slot: &Arc<Slot>) {
        if let Some(batch) = slot.buffer.lock().take(&self.pool) {
            self.submit(batch, self.config.backpressure);
        }
        self.slots.lock().retain(|s| !Arc::ptr_eq(s, slot));
    }

    /// The calling thread's slot for this pipeline, registering one on
    /// first use. `None` only while thread-local storage is torn down.
    fn local_slot(self: &Arc<Self>) -> Option<Arc<Slot>> {
        LOCAL_SLOTS
            .try_with(|local| {
                let mut local = local.borrow_mut();
                if let Some(entry) = local.0.iter().find(|e| e.pipeline_id == self.id) {
                    return Arc::clone(&entry.slot);
                }
                local.0.retain(|e| e.pipeline.strong_count() > 0);
                let slot = self.register();
                local.0.push(LocalSlot {
                    pipeline_id: self.id,
                    pipeline: Arc::downgrade(self),
                    slot: Arc::clone(&slot),
                });
                slot
            })
            .ok()
    }
}

struct LocalSlot {
    pipeline_id: u64,
    pipeline: Weak<Pipeline>,
    slot: Arc<Slot>,
}

/// This thread's slots, one per logger it has logged through.
struct LocalSlots(Vec<LocalSlot>);

impl Drop for LocalSlots {
    fn drop(&mut self) {
        for entry in self.0.drain(..) {
            if let Some(pipeline) = entry.pipeline.upgrade() {
                pipeline.retire_slot(&entry.slot);
            }
        }
    }
}

thread_local! {
    static LOCAL_SLOTS: RefCell<LocalSlots> = const { RefCell::new(LocalSlots(Vec::new())) };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::Level;
    use std::time::Duration;

    fn small_config() -> LoggerConfig {
        LoggerConfig::default()
            .with_queue_capacity(4)
            .with_thread_buffer_capacity(2)
            .with_flush_interval(Duration::from_secs(60))
    }

    fn rec(msg: &str) -> LogRecord {
        LogRecord::new(Level::Info, msg, Vec::new())
    }

    #[test]
    fn buffer_is_pushed_when_full() {
        let pipeline = Pipeline::new(small_config()).unwrap();
        pipeline.append(rec("a"));
        assert!(pipeline.queue.is_empty());
        pipeline.append(rec("b"));
        let batch = pipeline.queue.try_pop().unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(pipeline.thread_count(), 1);
    }

    #[test]
    fn flush_all_collects_every_thread() {
        let pipeline = Pipeline::new(small_config()).unwrap();
        pipeline.append(rec("main"));
        let worker = {
            let pipeline = Arc::clone(&pipeline);
            std::thread::spawn(move || {
                pipeline.append(rec("worker"));
                pipeline.thread_count()
            })
        };
        assert_eq!(worker.join().unwrap(), 2);
        // the worker's leftover record was shipped when it exited
        assert_eq!(pipeline.thread_count(), 1);
        assert_eq!(pipeline.queue.try_pop().unwrap()[0].message, "worker");

        pipeline.flush_all_buffers();
        assert_eq!(pipeline.queue.try_pop().unwrap()[0].message, "main");
        assert!(pipeline.queue.is_empty());
    }

    #[test]
    fn sweep_only_moves_stale_buffers() {
        let config = small_config().with_flush_interval(Duration::from_millis(20));
        let pipeline = Pipeline::new(config).unwrap();
        pipeline.append(rec("idle"));
        pipeline.sweep_stale_buffers();
        assert!(pipeline.queue.is_empty());
        std::thread::sleep(Duration::from_millis(30));
        pipeline.sweep_stale_buffers();
        assert_eq!(pipeline.queue.try_pop().unwrap()[0].message, "idle");
    }

    #[test]
    fn closed_queue_counts_rejected_records() {
        let pipeline = Pipeline::new(small_config()).unwrap();
        pipeline.queue.close();
        let mut batch = pipeline.pool.get();
        batch.push(rec("late"));
        assert!(!pipeline.submit(batch, Backpressure::DropNewest));
        let snapshot = pipeline.stats.snapshot(pipeline.queue.dropped_batches());
        assert_eq!(snapshot.records_rejected_closed, 1);
        assert_eq!(snapshot.records_dropped, 0);
    }

    #[test]
    fn evictions_do_not_advance_progress() {
        let config = small_config().with_queue_capacity(1);
        let pipeline = Pipeline::new(config).unwrap();
        for msg in ["first", "second"] {
            let mut batch = pipeline.pool.get();
            batch.push(rec(msg));
            assert!(pipeline.submit(batch, Backpressure::DropOldest));
        }
        assert_eq!(pipeline.progress.through(), 0);
        assert_eq!(pipeline.queue.departed(), 1);
        assert_eq!(pipeline.queue.try_pop().unwrap()[0].message, "second");
        assert_eq!(pipeline.queue.dropped_batches(), 1);
    }

    #[test]
    fn progress_wait_times_out() {
        let progress = Progress::default();
        progress.advance(2);
        progress.advance(1);
        assert_eq!(progress.through(), 2);
        assert!(progress.wait_for(2, Instant::now()));
        assert!(!progress.wait_for(3, Instant::now() + Duration::from_millis(10)));
    }

    #[test]
    fn bounded_flush_keeps_records_that_find_no_room() {
        let config = small_config()
            .with_queue_capacity(1)
            .with_thread_buffer_capacity(8);
        let pipeline = Pipeline::new(config).unwrap();
        let mut filler = pipeline.pool.get();
        filler.push(rec("filler"));
        assert!(pipeline.queue.try_push(filler).enqueued());

        pipeline.append(rec("kept"));
        let start = Instant::now();
        assert!(!pipeline.flush_buffers_until(Instant::now() + Duration::from_millis(30)));
        assert!(start.elapsed() < Duration::from_secs(2));
        assert_eq!(pipeline.queue.dropped_batches(), 0);

        pipeline.queue.try_pop().unwrap();
        assert!(pipeline.flush_buffers_until(Instant::now() + Duration::from_secs(1)));
        assert_eq!(pipeline.queue.try_pop().unwrap()[0].message, "kept");
    }

    #[test]
    fn local_flush_after_close_counts_rejection() {
        let pipeline = Pipeline::new(small_config()).unwrap();
        pipeline.append(rec("late"));
        pipeline.mark_closed();
        pipeline.queue.close();
        assert!(!pipeline.flush_local_buffer());
        let snapshot = pipeline.stats.snapshot(pipeline.queue.dropped_batches());
        assert_eq!(snapshot.records_rejected_closed, 1);
        assert_eq!(snapshot.in_flight(), 0);
    }
}
