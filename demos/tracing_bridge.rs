use rapidlog::{init_tracing_with_config, BridgeConfig, Logger, LoggerConfig, StdoutSink};
use tracing::{error, info, warn};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let logger = Logger::new(LoggerConfig::default(), StdoutSink)?;
    init_tracing_with_config(&logger, BridgeConfig { echo_to_stderr: true })?;

    info!(user_id = 42, "user login");
    warn!(retries = 3_u64, "upstream flaky");
    for i in 0..5 {
        error!(iteration = i, "bridge test error");
    }

    logger.close();
    Ok(())
}
