use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Pipeline counters. Internal failures are reported here instead of
/// being raised to callers.
#[derive(Debug, Default)]
pub struct PipelineStats {
    /// Records accepted by the hot path (at or above the minimum level).
    pub records_logged: AtomicU64,
    pub batches_enqueued: AtomicU64,
    /// Records in batches lost to backpressure.
    pub records_dropped: AtomicU64,
    /// Records refused because the logger was closed.
    pub records_rejected_closed: AtomicU64,
    pub records_written: AtomicU64,
    pub sink_writes: AtomicU64,
    /// Individual failed write attempts, including ones that later succeeded.
    pub sink_write_failures: AtomicU64,
    /// Chunks given up on after exhausting retries.
    pub chunks_lost: AtomicU64,
    pub records_lost_to_sink: AtomicU64,
    pub serialization_fallbacks: AtomicU64,
}

impl PipelineStats {
    #[inline]
    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self, batches_dropped: u64) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            records_logged: load(&self.records_logged),
            batches_enqueued: load(&self.batches_enqueued),
            batches_dropped,
            records_dropped: load(&self.records_dropped),
            records_rejected_closed: load(&self.records_rejected_closed),
            records_written: load(&self.records_written),
            sink_writes: load(&self.sink_writes),
            sink_write_failures: load(&self.sink_write_failures),
            chunks_lost: load(&self.chunks_lost),
            records_lost_to_sink: load(&self.records_lost_to_sink),
            serialization_fallbacks: load(&self.serialization_fallbacks),
        }
    }
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub records_logged: u64,
    pub batches_enqueued: u64,
    /// Batches lost to backpressure, as counted by the queue.
    pub batches_dropped: u64,
    pub records_dropped: u64,
    pub records_rejected_closed: u64,
    pub records_written: u64,
    pub sink_writes: u64,
    pub sink_write_failures: u64,
    pub chunks_lost: u64,
    pub records_lost_to_sink: u64,
    pub serialization_fallbacks: u64,
}

impl StatsSnapshot {
    /// Records that reached neither the sink nor a drop counter yet.
    pub fn in_flight(&self) -> u64 {
        self.records_logged.saturating_sub(
            self.records_written
                + self.records_dropped
                + self.records_rejected_closed
                + self.records_lost_to_sink,
        )
    }
}
