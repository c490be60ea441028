use crate::env;
use crate::error::ConfigError;
use crate::level::Level;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Named sizing bundles trading memory for throughput.
///
/// Presets never change which records are produced, only how much is
/// buffered along the way.
///
/// | preset       | queue (batches) | thread buffer | batch size | flush interval |
/// |--------------|-----------------|---------------|------------|----------------|
/// | `low-memory` | 2 048           | 8             | 64         | 100 ms         |
/// | `balanced`   | 32 768          | 32            | 256        | 50 ms          |
/// | `throughput` | 131 072         | 128           | 1 024      | 10 ms          |
///
/// Every preset uses [`Backpressure::Block`] with a 5 second timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Preset {
    LowMemory,
    #[default]
    Balanced,
    Throughput,
}

impl Preset {
    pub const fn as_str(self) -> &'static str {
        match self {
            Preset::LowMemory => "low-memory",
            Preset::Balanced => "balanced",
            Preset::Throughput => "throughput",
        }
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Preset {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low-memory" | "low_memory" => Ok(Preset::LowMemory),
            "balanced" => Ok(Preset::Balanced),
            "throughput" => Ok(Preset::Throughput),
            _ => Err(ConfigError::UnknownPreset(s.to_string())),
        }
    }
}

/// What a producer does when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backpressure {
    /// Wait for space up to `timeout`, then drop the batch.
    Block { timeout: Duration },
    /// Drop the incoming batch immediately.
    DropNewest,
    /// Evict the oldest queued batch to make room for the incoming one.
    DropOldest,
}

pub const DEFAULT_BLOCK_TIMEOUT: Duration = Duration::from_secs(5);

impl Default for Backpressure {
    fn default() -> Self {
        Backpressure::Block {
            timeout: DEFAULT_BLOCK_TIMEOUT,
        }
    }
}

impl FromStr for Backpressure {
    type Err = ConfigError;

    /// Parses `block`, `drop-newest` (alias `drop`) and `drop-oldest`.
    /// `block` uses [`DEFAULT_BLOCK_TIMEOUT`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "block" => Ok(Backpressure::default()),
            "drop" | "drop-newest" | "drop_newest" => Ok(Backpressure::DropNewest),
            "drop-oldest" | "drop_oldest" => Ok(Backpressure::DropOldest),
            _ => Err(ConfigError::UnknownPolicy(s.to_string())),
        }
    }
}

/// Bounded retry with exponential backoff for failed sink writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_secs(1),
        }
    }
}

/// Complete logger configuration.
///
/// **Fields**
/// - `level`: records below this level are discarded on the hot path.
/// - `queue_capacity`: batches the cross-thread queue can hold.
/// - `thread_buffer_capacity`: records a thread collects before pushing
///   them to the queue as one batch.
/// - `batch_size`: records the writer accumulates per sink write.
/// - `flush_interval`: maximum age of a non-empty thread buffer.
/// - `backpressure`: behavior when the queue is full.
/// - `retry`: sink write retry policy.
/// - `flush_timeout`: default bound for [`Logger::flush`](crate::Logger::flush).
/// - `strict`: panic when logging after `close()` instead of ignoring it.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggerConfig {
    pub level: Level,
    pub queue_capacity: usize,
    pub thread_buffer_capacity: usize,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub backpressure: Backpressure,
    pub retry: RetryPolicy,
    pub flush_timeout: Duration,
    pub strict: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self::preset(Preset::Balanced)
    }
}

impl LoggerConfig {
    pub fn preset(preset: Preset) -> Self {
        let (queue_capacity, batch_size, thread_buffer_capacity, flush_ms) = match preset {
            Preset::LowMemory => (2_048, 64, 8, 100),
            Preset::Balanced => (32_768, 256, 32, 50),
            Preset::Throughput => (131_072, 1_024, 128, 10),
        };
        Self {
            level: Level::Info,
            queue_capacity,
            thread_buffer_capacity,
            batch_size,
            flush_interval: Duration::from_millis(flush_ms),
            backpressure: Backpressure::default(),
            retry: RetryPolicy::default(),
            flush_timeout: Duration::from_secs(30),
            strict: false,
        }
    }

    /// Look a preset up by name.
    pub fn named(preset: &str) -> Result<Self, ConfigError> {
        Ok(Self::preset(preset.parse()?))
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_level_name(self, level: &str) -> Result<Self, ConfigError> {
        Ok(self.with_level(level.parse()?))
    }

    pub fn with_queue_capacity(mut self, batches: usize) -> Self {
        self.queue_capacity = batches;
        self
    }

    pub fn with_thread_buffer_capacity(mut self, records: usize) -> Self {
        self.thread_buffer_capacity = records;
        self
    }

    pub fn with_batch_size(mut self, records: usize) -> Self {
        self.batch_size = records;
        self
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }

    pub fn with_backpressure(mut self, policy: Backpressure) -> Self {
        self.backpressure = policy;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_flush_timeout(mut self, timeout: Duration) -> Self {
        self.flush_timeout = timeout;
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Upper bound on records held by the queue at any time.
    pub fn max_buffered_records(&self) -> usize {
        self.queue_capacity.saturating_mul(self.thread_buffer_capacity)
    }

    /// Reject degenerate sizes. Called by [`Logger::new`](crate::Logger::new).
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("queue_capacity", self.queue_capacity),
            ("thread_buffer_capacity", self.thread_buffer_capacity),
            ("batch_size", self.batch_size),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ConfigError::NonPositive { name });
            }
        }
        if self.flush_interval.is_zero() {
            return Err(ConfigError::NonPositive {
                name: "flush_interval",
            });
        }
        if let Backpressure::Block { timeout } = self.backpressure {
            if timeout.is_zero() {
                return Err(ConfigError::NonPositive {
                    name: "block_timeout",
                });
            }
        }
        if self.flush_timeout.is_zero() {
            return Err(ConfigError::NonPositive {
                name: "flush_timeout",
            });
        }
        Ok(())
    }

    /// Build a configuration from `RAPIDLOG_*` environment variables.
    ///
    /// The preset (default `balanced`) is applied first, then individual
    /// overrides. Unset variables keep the preset's value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`LoggerConfig::from_env`] with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup(env::RAPIDLOG_PRESET_ENV) {
            Some(name) => Self::named(&name)?,
            None => Self::default(),
        };
        if let Some(level) = lookup(env::RAPIDLOG_LEVEL_ENV) {
            config.level = level.parse()?;
        }
        if let Some(v) = lookup(env::RAPIDLOG_QUEUE_CAPACITY_ENV) {
            config.queue_capacity = parse_number(env::RAPIDLOG_QUEUE_CAPACITY_ENV, &v)?;
        }
        if let Some(v) = lookup(env::RAPIDLOG_BATCH_SIZE_ENV) {
            config.batch_size = parse_number(env::RAPIDLOG_BATCH_SIZE_ENV, &v)?;
        }
        if let Some(v) = lookup(env::RAPIDLOG_THREAD_BUFFER_ENV) {
            config.thread_buffer_capacity = parse_number(env::RAPIDLOG_THREAD_BUFFER_ENV, &v)?;
        }
        if let Some(v) = lookup(env::RAPIDLOG_FLUSH_INTERVAL_MS_ENV) {
            let ms: u64 = parse_number(env::RAPIDLOG_FLUSH_INTERVAL_MS_ENV, &v)?;
            config.flush_interval = Duration::from_millis(ms);
        }
        if let Some(v) = lookup(env::RAPIDLOG_BACKPRESSURE_ENV) {
            config.backpressure = v.parse()?;
        }
        config.validate()?;
        Ok(config)
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn presets_match_documented_sizes() {
        let low = LoggerConfig::preset(Preset::LowMemory);
        assert_eq!(low.queue_capacity, 2_048);
        assert_eq!(low.batch_size, 64);
        assert_eq!(low.thread_buffer_capacity, 8);
        assert_eq!(low.flush_interval, Duration::from_millis(100));

        let throughput = LoggerConfig::named("throughput").unwrap();
        assert_eq!(throughput.queue_capacity, 131_072);
        assert_eq!(throughput.batch_size, 1_024);

        assert_eq!(LoggerConfig::default(), LoggerConfig::preset(Preset::Balanced));
        for preset in [Preset::LowMemory, Preset::Balanced, Preset::Throughput] {
            let config = LoggerConfig::preset(preset);
            assert!(matches!(config.backpressure, Backpressure::Block { .. }));
            config.validate().unwrap();
        }
    }

    #[test]
    fn unknown_preset_is_rejected() {
        let err = LoggerConfig::named("turbo").unwrap_err();
        assert_eq!(err, ConfigError::UnknownPreset("turbo".into()));
    }

    #[test]
    fn zero_sizes_are_rejected() {
        let err = LoggerConfig::default().with_queue_capacity(0).validate().unwrap_err();
        assert_eq!(err, ConfigError::NonPositive { name: "queue_capacity" });

        let err = LoggerConfig::default().with_batch_size(0).validate().unwrap_err();
        assert_eq!(err, ConfigError::NonPositive { name: "batch_size" });

        let err = LoggerConfig::default()
            .with_flush_interval(Duration::ZERO)
            .validate()
            .unwrap_err();
        assert_eq!(err, ConfigError::NonPositive { name: "flush_interval" });

        let err = LoggerConfig::default()
            .with_backpressure(Backpressure::Block { timeout: Duration::ZERO })
            .validate()
            .unwrap_err();
        assert_eq!(err, ConfigError::NonPositive { name: "block_timeout" });
    }

    #[test]
    fn max_buffered_records_is_derived() {
        let config = LoggerConfig::preset(Preset::LowMemory);
        assert_eq!(config.max_buffered_records(), 2_048 * 8);
    }

    #[test]
    fn lookup_applies_preset_then_overrides() {
        let vars: HashMap<&str, &str> = [
            (env::RAPIDLOG_PRESET_ENV, "low-memory"),
            (env::RAPIDLOG_LEVEL_ENV, "debug"),
            (env::RAPIDLOG_BATCH_SIZE_ENV, "16"),
            (env::RAPIDLOG_FLUSH_INTERVAL_MS_ENV, "5"),
            (env::RAPIDLOG_BACKPRESSURE_ENV, "drop-oldest"),
        ]
        .into_iter()
        .collect();
        let config = LoggerConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();
        assert_eq!(config.level, Level::Debug);
        assert_eq!(config.queue_capacity, 2_048);
        assert_eq!(config.batch_size, 16);
        assert_eq!(config.flush_interval, Duration::from_millis(5));
        assert_eq!(config.backpressure, Backpressure::DropOldest);
    }

    #[test]
    fn lookup_rejects_garbage() {
        let err = LoggerConfig::from_lookup(|k| {
            (k == env::RAPIDLOG_QUEUE_CAPACITY_ENV).then(|| "lots".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        let err = LoggerConfig::from_lookup(|k| {
            (k == env::RAPIDLOG_THREAD_BUFFER_ENV).then(|| "0".to_string())
        })
        .unwrap_err();
        assert_eq!(err, ConfigError::NonPositive { name: "thread_buffer_capacity" });
    }
}
