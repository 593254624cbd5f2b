//! fin.sankey report service - Main entry point.

use anyhow::Result;
use sankey_common::config::Config;
use sankey_common::logging::init_logging;
use sankey_reports::start_server;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    );

    tracing::info!("fin.sankey report service v{}", env!("CARGO_PKG_VERSION"));

    // Start the HTTP server
    start_server(&config).await
}
