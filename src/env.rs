//! Environment variable names understood by
//! [`LoggerConfig::from_env`](crate::config::LoggerConfig::from_env).
//!
//! These are purely helpers; the logger itself never reads the
//! environment unless asked to.

/// Minimum level, e.g. `INFO`.
pub const RAPIDLOG_LEVEL_ENV: &str = "RAPIDLOG_LEVEL";

/// Preset name: `low-memory`, `balanced` or `throughput`.
pub const RAPIDLOG_PRESET_ENV: &str = "RAPIDLOG_PRESET";

/// Queue capacity in batches.
pub const RAPIDLOG_QUEUE_CAPACITY_ENV: &str = "RAPIDLOG_QUEUE_CAPACITY";

/// Records per sink write.
pub const RAPIDLOG_BATCH_SIZE_ENV: &str = "RAPIDLOG_BATCH_SIZE";

/// Records held per thread before handing a batch to the queue.
pub const RAPIDLOG_THREAD_BUFFER_ENV: &str = "RAPIDLOG_THREAD_BUFFER";

/// Flush interval in milliseconds.
pub const RAPIDLOG_FLUSH_INTERVAL_MS_ENV: &str = "RAPIDLOG_FLUSH_INTERVAL_MS";

/// Backpressure policy: `block`, `drop-newest` or `drop-oldest`.
pub const RAPIDLOG_BACKPRESSURE_ENV: &str = "RAPIDLOG_BACKPRESSURE";

/// Sink target, see [`parse_sink_target`](crate::backend::parse_sink_target).
pub const RAPIDLOG_SINK_ENV: &str = "RAPIDLOG_SINK";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
