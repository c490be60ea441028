use crate::backend::{make_sink, SinkTarget};
use crate::config::{LoggerConfig, Preset};
use crate::error::{ConfigError, LogError};
use crate::level::Level;
use crate::pipeline::Pipeline;
use crate::record::LogRecord;
use crate::sink::{Sink, StdoutSink};
use crate::stats::StatsSnapshot;
use crate::value::FieldValue;
use crate::writer::{self, WriterState};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Structured JSON logger.
///
/// Logging calls stage records in a per-thread buffer; full or stale
/// buffers move to a bounded queue as one batch, and a single background
/// thread serializes and writes them. Nothing on the logging path returns
/// an error or panics because of pipeline conditions.
///
/// `Logger` is a cheap handle: clones share the same pipeline. The
/// pipeline is closed by [`Logger::close`] or when the last handle is
/// dropped.
///
/// Records still buffered when the process exits without `close()` (or
/// without dropping the logger) are lost. There is no at-exit hook.
#[derive(Clone)]
pub struct Logger {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Logger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Logger").finish_non_exhaustive()
    }
}

struct Inner {
    pipeline: Arc<Pipeline>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl Logger {
    /// Validate `config`, start the writer thread and return a handle.
    pub fn new(config: LoggerConfig, sink: impl Sink + 'static) -> Result<Self, ConfigError> {
        Self::with_boxed_sink(config, Box::new(sink))
    }

    pub fn with_boxed_sink(config: LoggerConfig, sink: Box<dyn Sink>) -> Result<Self, ConfigError> {
        let pipeline = Pipeline::new(config)?;
        let handle = writer::spawn(Arc::clone(&pipeline), sink)?;
        tracing::debug!(
            pipeline = pipeline.id,
            queue_capacity = pipeline.config.queue_capacity,
            thread_buffer = pipeline.config.thread_buffer_capacity,
            batch_size = pipeline.config.batch_size,
            "logger started"
        );
        Ok(Self {
            inner: Arc::new(Inner {
                pipeline,
                writer: Mutex::new(Some(handle)),
            }),
        })
    }

    pub fn with_preset(preset: Preset, sink: impl Sink + 'static) -> Result<Self, ConfigError> {
        Self::new(LoggerConfig::preset(preset), sink)
    }

    /// Open the sink described by `target` and start a logger on it.
    pub fn to_target(config: LoggerConfig, target: &SinkTarget) -> Result<Self, ConfigError> {
        Self::with_boxed_sink(config, make_sink(target)?)
    }

    /// Build from `RAPIDLOG_*` environment variables, including the sink.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = LoggerConfig::from_env()?;
        let target = crate::backend::sink_target_from_env()?;
        Self::to_target(config, &target)
    }

    pub fn config(&self) -> &LoggerConfig {
        &self.inner.pipeline.config
    }

    pub fn min_level(&self) -> Level {
        self.inner.pipeline.config.level
    }

    #[inline]
    pub fn is_enabled_for(&self, level: Level) -> bool {
        level >= self.inner.pipeline.config.level
    }

    /// Log a record. Silently ignored below the minimum level and, unless
    /// the logger is strict, after `close()`.
    ///
    /// # Panics
    ///
    /// With `strict` enabled, panics when called after `close()`.
    #[inline]
    pub fn log<I, K, V>(&self, level: Level, message: impl Into<String>, fields: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FieldValue>,
    {
        if let Err(e) = self.try_log(level, message, fields) {
            if self.inner.pipeline.config.strict {
                panic!("rapidlog: {e}");
            }
        }
    }

    /// Like [`Logger::log`] but reports logging after `close()`.
    #[inline]
    pub fn try_log<I, K, V>(
        &self,
        level: Level,
        message: impl Into<String>,
        fields: I,
    ) -> Result<(), LogError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FieldValue>,
    {
        if !self.is_enabled_for(level) {
            return Ok(());
        }
        let pipeline = &self.inner.pipeline;
        if pipeline.is_closed() {
            return Err(LogError::Closed);
        }
        let fields = fields.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        pipeline.append(LogRecord::new(level, message, fields));
        // close() may have collected the buffers between the check above
        // and the append; ship the record so it is written or counted.
        if pipeline.is_closed() && !pipeline.flush_local_buffer() {
            return Err(LogError::Closed);
        }
        Ok(())
    }

    pub fn debug<I, K, V>(&self, message: impl Into<String>, fields: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FieldValue>,
    {
        self.log(Level::Debug, message, fields)
    }

    pub fn info<I, K, V>(&self, message: impl Into<String>, fields: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FieldValue>,
    {
        self.log(Level::Info, message, fields)
    }

    pub fn warning<I, K, V>(&self, message: impl Into<String>, fields: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FieldValue>,
    {
        self.log(Level::Warning, message, fields)
    }

    pub fn error<I, K, V>(&self, message: impl Into<String>, fields: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FieldValue>,
    {
        self.log(Level::Error, message, fields)
    }

    pub fn critical<I, K, V>(&self, message: impl Into<String>, fields: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<FieldValue>,
    {
        self.log(Level::Critical, message, fields)
    }

    /// Push every thread's buffered records to the queue and wait for the
    /// writer to finish with them, bounded by the configured flush timeout.
    ///
    /// Returns `true` if everything accepted so far was written (or given
    /// up on) before the deadline. The deadline also bounds the time spent
    /// pushing buffers into a full queue; records that find no room stay
    /// buffered for the next flush.
    pub fn flush(&self) -> bool {
        self.flush_timeout(self.inner.pipeline.config.flush_timeout)
    }

    pub fn flush_timeout(&self, timeout: Duration) -> bool {
        let pipeline = &self.inner.pipeline;
        if pipeline.is_closed() {
            return pipeline.writer_state() == WriterState::Stopped;
        }
        let deadline = Instant::now() + timeout;
        if !pipeline.flush_buffers_until(deadline) {
            return false;
        }
        let target = pipeline.queue.accepted_batches();
        pipeline.progress.wait_for(target, deadline)
    }

    /// Flush, stop accepting records, drain the queue and stop the writer.
    ///
    /// Idempotent: later calls return once the first one has finished.
    pub fn close(&self) {
        self.inner.close();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.pipeline.is_closed()
    }

    pub fn writer_state(&self) -> WriterState {
        self.inner.pipeline.writer_state()
    }

    pub fn stats(&self) -> StatsSnapshot {
        let pipeline = &self.inner.pipeline;
        pipeline.stats.snapshot(pipeline.queue.dropped_batches())
    }

    /// Batches currently waiting for the writer.
    pub fn queue_len(&self) -> usize {
        self.inner.pipeline.queue.len()
    }

    /// Largest number of batches queued at any point.
    pub fn queue_high_water(&self) -> usize {
        self.inner.pipeline.queue.high_water()
    }

    /// Producer threads with a live buffer.
    pub fn thread_count(&self) -> usize {
        self.inner.pipeline.thread_count()
    }
}

impl Inner {
    fn close(&self) {
        let mut writer = self.writer.lock();
        let Some(handle) = writer.take() else {
            return;
        };
        let pipeline = &self.pipeline;
        // Ship what producers have buffered before refusing new batches.
        pipeline.flush_all_buffers();
        pipeline.mark_closed();
        pipeline.flush_all_buffers();
        pipeline.queue.close();
        if handle.join().is_err() {
            tracing::error!(pipeline = pipeline.id, "log writer thread panicked");
            pipeline.set_writer_state(WriterState::Stopped);
        }
        let stats = pipeline.stats.snapshot(pipeline.queue.dropped_batches());
        tracing::debug!(
            pipeline = pipeline.id,
            written = stats.records_written,
            dropped = stats.records_dropped,
            "logger closed"
        );
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.close();
    }
}

/// Create a logger writing to standard output.
///
/// `level` is a level name such as `"INFO"`; `preset` is `None` for
/// `balanced`.
pub fn get_logger(level: &str, preset: Option<&str>) -> Result<Logger, ConfigError> {
    let config = match preset {
        Some(name) => LoggerConfig::named(name)?,
        None => LoggerConfig::default(),
    };
    Logger::new(config.with_level_name(level)?, StdoutSink)
}
