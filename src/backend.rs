use std::path::PathBuf;

use crate::env::{env_or, RAPIDLOG_SINK_ENV};
use crate::error::ConfigError;
use crate::noop_sink::NoopSink;
use crate::sink::{FileSink, MemorySink, Sink, StderrSink, StdoutSink};

/// Sink selected by a target string or explicit configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkTarget {
    Stdout,
    Stderr,
    /// Append to a file, creating it if needed.
    File(PathBuf),
    Memory,
    Null,
}

/// Parse a sink target string.
///
/// Examples:
/// - "stdout" (also "-")
/// - "stderr"
/// - "file:/var/log/app.jsonl"
/// - "memory"
/// - "null"
pub fn parse_sink_target(target: &str) -> Result<SinkTarget, ConfigError> {
    let trimmed = target.trim();
    let lower = trimmed.to_ascii_lowercase();

    if lower == "stdout" || lower == "-" {
        Ok(SinkTarget::Stdout)
    } else if lower == "stderr" {
        Ok(SinkTarget::Stderr)
    } else if lower == "memory" {
        Ok(SinkTarget::Memory)
    } else if lower == "null" || lower == "none" {
        Ok(SinkTarget::Null)
    } else if lower.starts_with("file:") {
        let path = trimmed["file:".len()..].trim_start_matches("//");
        if path.is_empty() {
            return Err(ConfigError::UnknownSink(target.to_string()));
        }
        Ok(SinkTarget::File(PathBuf::from(path)))
    } else {
        Err(ConfigError::UnknownSink(target.to_string()))
    }
}

/// Read the sink target from `RAPIDLOG_SINK`, defaulting to stdout.
pub fn sink_target_from_env() -> Result<SinkTarget, ConfigError> {
    parse_sink_target(&env_or(RAPIDLOG_SINK_ENV, "stdout"))
}

/// Create a concrete [`Sink`] for a [`SinkTarget`].
///
/// Opening a file is the only fallible case and reports
/// [`ConfigError::SinkOpen`], so construction still fails fast.
pub fn make_sink(target: &SinkTarget) -> Result<Box<dyn Sink>, ConfigError> {
    match target {
        SinkTarget::Stdout => Ok(Box::new(StdoutSink)),
        SinkTarget::Stderr => Ok(Box::new(StderrSink)),
        SinkTarget::Memory => Ok(Box::new(MemorySink::new())),
        SinkTarget::Null => Ok(Box::new(NoopSink)),
        SinkTarget::File(path) => {
            let sink = FileSink::append(path).map_err(|e| ConfigError::SinkOpen {
                target: path.display().to_string(),
                reason: e.to_string(),
            })?;
            Ok(Box::new(sink))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_targets() {
        assert_eq!(parse_sink_target("stdout").unwrap(), SinkTarget::Stdout);
        assert_eq!(parse_sink_target("-").unwrap(), SinkTarget::Stdout);
        assert_eq!(parse_sink_target("STDERR").unwrap(), SinkTarget::Stderr);
        assert_eq!(parse_sink_target("null").unwrap(), SinkTarget::Null);
        assert_eq!(
            parse_sink_target("file:/tmp/app.log").unwrap(),
            SinkTarget::File(PathBuf::from("/tmp/app.log"))
        );
        assert_eq!(
            parse_sink_target("file:///tmp/App.log").unwrap(),
            SinkTarget::File(PathBuf::from("/tmp/App.log"))
        );
    }

    #[test]
    fn rejects_network_and_empty_targets() {
        assert!(matches!(
            parse_sink_target("tcp://127.0.0.1:9000"),
            Err(ConfigError::UnknownSink(_))
        ));
        assert!(parse_sink_target("file:").is_err());
    }

    #[test]
    fn file_target_appends() {
        let path = std::env::temp_dir().join(format!("rapidlog-backend-{}.log", std::process::id()));
        let _ = std::fs::remove_file(&path);
        let target = SinkTarget::File(path.clone());
        for _ in 0..2 {
            let mut sink = make_sink(&target).unwrap();
            sink.write(b"x\n").unwrap();
            sink.flush().unwrap();
        }
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "x\nx\n");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn unopenable_file_is_config_error() {
        let target = SinkTarget::File(PathBuf::from("/nonexistent-dir/rapidlog/out.log"));
        assert!(matches!(make_sink(&target), Err(ConfigError::SinkOpen { .. })));
    }
}
