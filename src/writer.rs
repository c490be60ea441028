//! Background writer: the single consumer of the batch queue.
//!
//! Runs on its own OS thread as a small state machine:
//! `Starting → Running → Draining → Stopped`.

use crate::encode::{encode_record, Fallback};
use crate::error::ConfigError;
use crate::pipeline::Pipeline;
use crate::pool::Batch;
use crate::sink::Sink;
use crate::stats::PipelineStats;
use std::cmp;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WriterState {
    Starting = 0,
    Running = 1,
    Draining = 2,
    Stopped = 3,
}

impl WriterState {
    pub(crate) fn from_u8(v: u8) -> Self {
        match v {
            0 => WriterState::Starting,
            1 => WriterState::Running,
            2 => WriterState::Draining,
            _ => WriterState::Stopped,
        }
    }
}

/// Start the writer thread for `pipeline`.
pub(crate) fn spawn(
    pipeline: Arc<Pipeline>,
    sink: Box<dyn Sink>,
) -> Result<JoinHandle<()>, ConfigError> {
    thread::Builder::new()
        .name("rapidlog-writer".to_string())
        .spawn(move || Writer::new(pipeline, sink).run())
        .map_err(|e| ConfigError::Spawn(e.to_string()))
}

struct Writer {
    pipeline: Arc<Pipeline>,
    sink: Box<dyn Sink>,
    scratch: Vec<u8>,
    pending: Vec<Batch>,
    pending_records: usize,
    dirty: bool,
    fallback_warned: bool,
    reported_drops: u64,
    last_sweep: Instant,
}

impl Writer {
    fn new(pipeline: Arc<Pipeline>, sink: Box<dyn Sink>) -> Self {
        Self {
            pipeline,
            sink,
            scratch: Vec::new(),
            pending: Vec::new(),
            pending_records: 0,
            dirty: false,
            fallback_warned: false,
            reported_drops: 0,
            last_sweep: Instant::now(),
        }
    }

    fn run(mut self) {
        let batch_size = self.pipeline.config.batch_size;
        // Rough line size; the buffer grows as needed and is then reused.
        self.scratch = Vec::with_capacity(batch_size.saturating_mul(256).min(4 << 20));
        self.pending = Vec::with_capacity(batch_size.min(1_024));
        self.pipeline.set_writer_state(WriterState::Running);
        tracing::debug!(batch_size, "log writer running");

        let idle_wait = self.pipeline.config.flush_interval;
        while !self.pipeline.queue.is_closed() {
            match self.pipeline.queue.pop_batch(Some(idle_wait)) {
                Some(batch) => {
                    self.stage(batch);
                    while self.pending_records < batch_size {
                        match self.pipeline.queue.try_pop() {
                            Some(batch) => self.stage(batch),
                            None => break,
                        }
                    }
                    self.write_pending();
                    // A busy queue must not starve quiet threads' buffers.
                    if self.last_sweep.elapsed() >= idle_wait {
                        self.sweep();
                    }
                }
                None => self.idle(),
            }
        }

        self.pipeline.set_writer_state(WriterState::Draining);
        let remaining = self.pipeline.queue.drain_all();
        tracing::debug!(batches = remaining.len(), "log writer draining");
        for batch in remaining {
            self.stage(batch);
            if self.pending_records >= batch_size {
                self.write_pending();
            }
        }
        self.write_pending();
        if let Err(e) = self.sink.flush() {
            tracing::warn!(error = %e, "failed to flush log sink on shutdown");
        }
        self.report_drops();
        self.pipeline.set_writer_state(WriterState::Stopped);
    }

    fn stage(&mut self, batch: Batch) {
        self.pending_records += batch.len();
        self.pending.push(batch);
    }

    /// Nothing arrived within the flush interval.
    fn idle(&mut self) {
        if self.dirty {
            if let Err(e) = self.sink.flush() {
                tracing::warn!(error = %e, "failed to flush log sink");
            }
            self.dirty = false;
        }
        self.sweep();
        self.report_drops();
    }

    fn sweep(&mut self) {
        self.pipeline.sweep_stale_buffers();
        self.last_sweep = Instant::now();
    }

    /// Serialize every staged batch and write it, one sink write per
    /// `batch_size` records.
    fn write_pending(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let batch_size = self.pipeline.config.batch_size;
        let mut pending = std::mem::take(&mut self.pending);
        let mut chunk_records = 0;
        self.scratch.clear();

        for batch in &pending {
            for record in batch {
                let stats = &self.pipeline.stats;
                let warned = &mut self.fallback_warned;
                encode_record(record, &mut self.scratch, |fallback| {
                    report_fallback(stats, warned, fallback)
                });
                chunk_records += 1;
                if chunk_records >= batch_size {
                    self.emit(chunk_records);
                    chunk_records = 0;
                }
            }
        }
        if chunk_records > 0 {
            self.emit(chunk_records);
        }

        // Every batch that has left the queue so far was either evicted or
        // is in `pending` and now written.
        self.pipeline.progress.advance(self.pipeline.queue.departed());
        for batch in pending.drain(..) {
            self.pipeline.pool.put(batch);
        }
        self.pending = pending;
        self.pending_records = 0;
    }

    /// Write the scratch buffer, retrying with exponential backoff.
    fn emit(&mut self, records: usize) {
        let retry = self.pipeline.config.retry;
        let stats = &self.pipeline.stats;
        let mut backoff = retry.initial_backoff;
        let mut attempt = 0;

        loop {
            match self.sink.write(&self.scratch) {
                Ok(()) => {
                    PipelineStats::add(&stats.sink_writes, 1);
                    PipelineStats::add(&stats.records_written, records as u64);
                    self.dirty = true;
                    break;
                }
                Err(e) => {
                    PipelineStats::add(&stats.sink_write_failures, 1);
                    if attempt >= retry.max_retries {
                        PipelineStats::add(&stats.chunks_lost, 1);
                        PipelineStats::add(&stats.records_lost_to_sink, records as u64);
                        tracing::error!(error = %e, records, attempts = attempt + 1, "dropping log chunk after repeated sink failures");
                        break;
                    }
                    tracing::warn!(error = %e, ?backoff, "log sink write failed, retrying");
                    thread::sleep(backoff);
                    backoff = cmp::min(backoff * 2, retry.max_backoff);
                    attempt += 1;
                }
            }
        }
        self.scratch.clear();
    }

    fn report_drops(&mut self) {
        let dropped = self.pipeline.stats.records_dropped.load(Ordering::Relaxed);
        if dropped > self.reported_drops {
            tracing::warn!(
                records = dropped - self.reported_drops,
                total = dropped,
                "log records dropped by backpressure"
            );
            self.reported_drops = dropped;
        }
    }
}

fn report_fallback(stats: &PipelineStats, warned: &mut bool, fallback: Fallback) {
    PipelineStats::add(&stats.serialization_fallbacks, 1);
    if *warned {
        tracing::debug!(field = %fallback.field, reason = %fallback.reason, "log field replaced by its debug text");
    } else {
        *warned = true;
        tracing::warn!(field = %fallback.field, reason = %fallback.reason, "log field could not be encoded, replaced by its debug text");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LoggerConfig, RetryPolicy};
    use crate::level::Level;
    use crate::record::LogRecord;
    use crate::sink::MemorySink;
    use std::io;
    use std::time::Duration;

    /// Fails the first `failures` writes, then records into `inner`.
    struct FlakySink {
        failures: usize,
        inner: MemorySink,
    }

    impl Sink for FlakySink {
        fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
            if self.failures > 0 {
                self.failures -= 1;
                return Err(io::Error::new(io::ErrorKind::Other, "disk on fire"));
            }
            self.inner.write(bytes)
        }
    }

    fn config() -> LoggerConfig {
        LoggerConfig::default()
            .with_queue_capacity(16)
            .with_thread_buffer_capacity(4)
            .with_batch_size(3)
            .with_flush_interval(Duration::from_millis(10))
            .with_retry(RetryPolicy {
                max_retries: 2,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(2),
            })
    }

    fn batch(pipeline: &Pipeline, messages: &[&str]) -> Batch {
        let mut batch = pipeline.pool.get();
        batch.extend(messages.iter().map(|m| LogRecord::new(Level::Info, *m, Vec::new())));
        batch
    }

    fn run_to_completion(pipeline: &Arc<Pipeline>, sink: Box<dyn Sink>) {
        let handle = spawn(Arc::clone(pipeline), sink).unwrap();
        pipeline.queue.close();
        handle.join().unwrap();
        assert_eq!(pipeline.writer_state(), WriterState::Stopped);
    }

    #[test]
    fn writes_one_chunk_per_batch_size() {
        let pipeline = Pipeline::new(config()).unwrap();
        let sink = MemorySink::new();
        pipeline.queue.try_push(batch(&pipeline, &["a", "b"]));
        pipeline.queue.try_push(batch(&pipeline, &["c", "d", "e", "f"]));
        pipeline.queue.try_push(batch(&pipeline, &["g"]));
        run_to_completion(&pipeline, Box::new(sink.clone()));

        let messages: Vec<String> = sink
            .lines()
            .iter()
            .map(|l| serde_json::from_str::<serde_json::Value>(l).unwrap()["message"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(messages, ["a", "b", "c", "d", "e", "f", "g"]);
        // 7 records in chunks of 3
        assert_eq!(sink.write_count(), 3);
        assert_eq!(pipeline.progress.through(), 3);
    }

    #[test]
    fn retries_transient_sink_failures() {
        let pipeline = Pipeline::new(config()).unwrap();
        let memory = MemorySink::new();
        pipeline.queue.try_push(batch(&pipeline, &["x"]));
        run_to_completion(&pipeline, Box::new(FlakySink { failures: 2, inner: memory.clone() }));

        assert_eq!(memory.lines().len(), 1);
        let stats = pipeline.stats.snapshot(0);
        assert_eq!(stats.sink_write_failures, 2);
        assert_eq!(stats.chunks_lost, 0);
        assert_eq!(stats.records_written, 1);
    }

    #[test]
    fn gives_up_after_max_retries_and_keeps_going() {
        let pipeline = Pipeline::new(config().with_batch_size(1)).unwrap();
        let memory = MemorySink::new();
        pipeline.queue.try_push(batch(&pipeline, &["lost", "kept"]));
        run_to_completion(&pipeline, Box::new(FlakySink { failures: 3, inner: memory.clone() }));

        let stats = pipeline.stats.snapshot(0);
        assert_eq!(stats.chunks_lost, 1);
        assert_eq!(stats.records_lost_to_sink, 1);
        assert_eq!(stats.records_written, 1);
        assert_eq!(memory.lines().len(), 1);
        assert!(memory.lines()[0].contains("\"kept\""));
    }

    #[test]
    fn unencodable_field_keeps_batch_mates() {
        let pipeline = Pipeline::new(config()).unwrap();
        let sink = MemorySink::new();
        let mut b = batch(&pipeline, &["ok-1"]);
        b.push(LogRecord::new(Level::Info, "bad", vec![("ratio".into(), f64::INFINITY.into())]));
        b.push(LogRecord::new(Level::Info, "ok-2", Vec::new()));
        pipeline.queue.try_push(b);
        run_to_completion(&pipeline, Box::new(sink.clone()));

        let lines = sink.lines();
        assert_eq!(lines.len(), 3);
        let bad: serde_json::Value = serde_json::from_str(&lines[1]).unwrap();
        assert_eq!(bad["ratio"], "inf");
        assert_eq!(pipeline.stats.snapshot(0).serialization_fallbacks, 1);
    }

    #[test]
    fn state_round_trips_through_u8() {
        for state in [
            WriterState::Starting,
            WriterState::Running,
            WriterState::Draining,
            WriterState::Stopped,
        ] {
            assert_eq!(WriterState::from_u8(state as u8), state);
        }
    }
}
