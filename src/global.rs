//! Optional process-wide default logger.
//!
//! The slot starts empty. [`init_global`] fills it once, [`global`] hands
//! out clones of the handle and [`shutdown_global`] closes and clears it.
//! Nothing is initialized implicitly and nothing is flushed at exit.

use crate::config::LoggerConfig;
use crate::error::ConfigError;
use crate::logger::Logger;
use crate::sink::Sink;
use parking_lot::RwLock;

static GLOBAL: RwLock<Option<Logger>> = parking_lot::const_rwlock(None);

/// Create the default logger.
///
/// **Returns**
/// - `Err(ConfigError::AlreadyInitialized)` if one is already installed;
///   the existing logger is left untouched.
pub fn init_global(config: LoggerConfig, sink: impl Sink + 'static) -> Result<Logger, ConfigError> {
    let mut slot = GLOBAL.write();
    if slot.is_some() {
        return Err(ConfigError::AlreadyInitialized);
    }
    let logger = Logger::new(config, sink)?;
    *slot = Some(logger.clone());
    Ok(logger)
}

/// Like [`init_global`], configured from `RAPIDLOG_*` variables.
pub fn init_global_from_env() -> Result<Logger, ConfigError> {
    let mut slot = GLOBAL.write();
    if slot.is_some() {
        return Err(ConfigError::AlreadyInitialized);
    }
    let logger = Logger::from_env()?;
    *slot = Some(logger.clone());
    Ok(logger)
}

/// The default logger, if one was installed.
pub fn global() -> Option<Logger> {
    GLOBAL.read().clone()
}

/// Close and remove the default logger. Returns `false` if there was none.
pub fn shutdown_global() -> bool {
    let taken = GLOBAL.write().take();
    match taken {
        Some(logger) => {
            logger.close();
            true
        }
        None => false,
    }
}
