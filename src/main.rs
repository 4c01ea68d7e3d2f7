use anyhow::Context;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use tripgate::config::GateConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .context("invalid log filter")?;
    fmt().with_env_filter(filter).init();

    let config = GateConfig::from_env().context("loading TRIPGATE_* configuration")?;

    // Startup banner at info level so something always prints at default verbosity
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(target: "startup", "tripgate starting: RUST_LOG='{}', config={:?}", rust_log, config);

    tripgate::server::run(config).await
}
