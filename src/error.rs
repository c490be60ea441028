/// Error returned when a logger or one of its parts is configured with
/// invalid parameters.
///
/// Raised synchronously at construction time only; nothing on the
/// logging hot path produces it.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown log level: {0:?} (expected DEBUG, INFO, WARNING, ERROR or CRITICAL)")]
    UnknownLevel(String),

    #[error("unknown preset: {0:?} (expected low-memory, balanced or throughput)")]
    UnknownPreset(String),

    #[error("unknown backpressure policy: {0:?} (expected block, drop-newest or drop-oldest)")]
    UnknownPolicy(String),

    #[error("{name} must be greater than zero")]
    NonPositive { name: &'static str },

    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },

    #[error("unsupported sink target: {0:?}")]
    UnknownSink(String),

    #[error("failed to open sink {target}: {reason}")]
    SinkOpen { target: String, reason: String },

    #[error("failed to spawn writer thread: {0}")]
    Spawn(String),

    #[error("a global logger is already installed")]
    AlreadyInitialized,
}

/// Error surfaced to callers that opt into checked logging.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogError {
    #[error("logger is closed")]
    Closed,
}
