//! Relay Bot - Main entry point.

use anyhow::{Context, Result};
use relay_bot::run;
use relay_common::config::Config;
use relay_common::logging::init_logging;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load_with_env()?;

    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    tracing::info!("Relay Bot v{}", env!("CARGO_PKG_VERSION"));

    config.validate().context("Invalid configuration")?;

    run(config).await
}
