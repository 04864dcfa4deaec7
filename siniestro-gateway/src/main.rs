//! Siniestro Gateway - Main entry point.

use anyhow::Result;
use siniestro_common::config::Config;
use siniestro_common::logging::init_logging;
use siniestro_gateway::start_server;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load_with_env()?;

    // Initialize logging
    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    tracing::info!("Siniestro Gateway v{}", env!("CARGO_PKG_VERSION"));

    // Start the HTTP server
    start_server(&config).await
}
