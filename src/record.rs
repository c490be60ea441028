use crate::error::ConfigError;
use crate::level::Level;
use crate::value::FieldValue;
use chrono::Utc;
use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

/// One logged event.
///
/// Records are immutable once built and are moved, never shared, from the
/// producing thread's buffer to the queue and on to the writer.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    /// Nanoseconds since the Unix epoch. Never decreases within a process.
    pub timestamp: i64,
    pub level: Level,
    pub message: String,
    /// User fields in call order.
    pub fields: Vec<(String, FieldValue)>,
    pub thread_id: u64,
}

impl LogRecord {
    /// Build a record stamped with the current time and thread.
    pub fn new(level: Level, message: impl Into<String>, fields: Vec<(String, FieldValue)>) -> Self {
        LogRecord {
            timestamp: now_nanos(),
            level,
            message: message.into(),
            fields,
            thread_id: current_thread_id(),
        }
    }

    /// Like [`LogRecord::new`] but takes the level by name.
    ///
    /// **Returns**
    /// - `Err(ConfigError::UnknownLevel)` if `level` is not a recognized
    ///   level name. This is the only failure mode.
    pub fn build(
        level: &str,
        message: impl Into<String>,
        fields: Vec<(String, FieldValue)>,
    ) -> Result<Self, ConfigError> {
        let level = level.parse::<Level>()?;
        Ok(Self::new(level, message, fields))
    }

    /// Look up the first field with the given name.
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }
}

struct Clock {
    anchor_nanos: i64,
    anchor: Instant,
}

static CLOCK: OnceLock<Clock> = OnceLock::new();

/// Wall-clock nanoseconds derived from a monotonic source.
///
/// The wall clock is sampled once per process; later readings add the
/// monotonic elapsed time, so values never go backwards even if the system
/// clock is adjusted.
pub fn now_nanos() -> i64 {
    let clock = CLOCK.get_or_init(|| Clock {
        anchor_nanos: Utc::now().timestamp_nanos_opt().unwrap_or(0),
        anchor: Instant::now(),
    });
    let elapsed = i64::try_from(clock.anchor.elapsed().as_nanos()).unwrap_or(i64::MAX);
    clock.anchor_nanos.saturating_add(elapsed)
}

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_ID: Cell<u64> = const { Cell::new(0) };
}

/// Small process-unique id of the calling thread, assigned on first use.
pub fn current_thread_id() -> u64 {
    THREAD_ID.with(|id| {
        let current = id.get();
        if current != 0 {
            return current;
        }
        let assigned = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
        id.set(assigned);
        assigned
    })
}
