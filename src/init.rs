use crate::layer::RapidlogLayer;
use crate::logger::Logger;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Options for installing the `tracing` bridge.
///
/// **Fields**
/// - `echo_to_stderr`: if `true`, a `tracing_subscriber::fmt` layer is
///   added next to [`RapidlogLayer`] and events are also printed in human
///   readable form on stderr.
#[derive(Clone, Debug, Default)]
pub struct BridgeConfig {
    pub echo_to_stderr: bool,
}

/// Install a global `tracing` subscriber that forwards every event to
/// `logger`.
///
/// **Effects**
///
/// This installs a [`Registry`] combined with [`RapidlogLayer`] as the
/// global default subscriber, so all `tracing` events in the process are
/// observed by the logger. The subscriber holds a clone of `logger`;
/// close it explicitly before exit.
///
/// **Returns**
/// - `Err(..)` if a global subscriber was already installed.
pub fn init_tracing_with_config(
    logger: &Logger,
    config: BridgeConfig,
) -> Result<(), SetGlobalDefaultError> {
    let layer = RapidlogLayer::new(logger.clone());

    // Both arms build a different subscriber type, hence the duplication.
    if config.echo_to_stderr {
        let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);
        let subscriber = Registry::default().with(layer).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)
    } else {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::set_global_default(subscriber)
    }
}

/// Equivalent to [`init_tracing_with_config`] with
/// [`BridgeConfig::default`].
pub fn init_tracing(logger: &Logger) -> Result<(), SetGlobalDefaultError> {
    init_tracing_with_config(logger, BridgeConfig::default())
}
