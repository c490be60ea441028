//! High-throughput structured JSON logging.
//!
//! Logging calls append typed records to a buffer owned by the calling
//! thread. Full or stale buffers move as one batch into a bounded queue,
//! the only point where producers synchronize, and a single background
//! thread serializes batches to JSON lines and writes them to a [`Sink`].
//!
//! ```no_run
//! use rapidlog::{fields, get_logger};
//!
//! let logger = get_logger("INFO", Some("low-memory"))?;
//! logger.info("user login", fields!["user_id" => 123, "action" => "login"]);
//! logger.close();
//! # Ok::<(), rapidlog::ConfigError>(())
//! ```
//!
//! Records that are still buffered when the process exits without
//! [`Logger::close`], a successful [`Logger::flush`] or dropping the last
//! logger handle are lost.

pub mod backend;
pub mod buffer;
pub mod config;
pub mod encode;
pub mod env;
pub mod error;
pub mod global;
pub mod level;
pub mod logger;
pub mod noop_sink;
pub mod pool;
pub mod queue;
pub mod record;
pub mod sink;
pub mod stats;
pub mod value;
pub mod writer;

mod pipeline;

#[cfg(feature = "tracing-bridge")]
pub mod init;
#[cfg(feature = "tracing-bridge")]
pub mod layer;

pub use backend::{make_sink, parse_sink_target, SinkTarget};
pub use config::{Backpressure, LoggerConfig, Preset, RetryPolicy};
pub use error::{ConfigError, LogError};
pub use global::{global, init_global, shutdown_global};
pub use level::Level;
pub use logger::{get_logger, Logger};
pub use noop_sink::NoopSink;
pub use queue::{BoundedQueue, PushOutcome, Rejection};
pub use record::LogRecord;
pub use sink::{FileSink, IoSink, MemorySink, Sink, StderrSink, StdoutSink};
pub use stats::StatsSnapshot;
pub use value::FieldValue;
pub use writer::WriterState;

#[cfg(feature = "tracing-bridge")]
pub use init::{init_tracing, init_tracing_with_config, BridgeConfig};
#[cfg(feature = "tracing-bridge")]
pub use layer::RapidlogLayer;
