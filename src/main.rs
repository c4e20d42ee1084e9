//!
//! pethaven server binary
//! ----------------------
//! Command-line entry point for the adoption site. Configuration comes from an
//! optional JSON file, `PETHAVEN_*` environment variables and CLI flags.

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use pethaven::config::{wants_help, ServerConfig, USAGE};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if wants_help(&args) {
        println!("{}", USAGE);
        return Ok(());
    }

    // Init logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .context("While building the log filter")?;
    fmt().with_env_filter(filter).init();

    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    let config = ServerConfig::load(&args).context("While loading configuration")?;
    info!(
        target: "pethaven",
        "pethaven starting: RUST_LOG='{}', http_port={}",
        rust_log, config.http_port
    );

    pethaven::server::run(config).await
}
