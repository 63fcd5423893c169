#![cfg(not(tarpaulin_include))]

use log::error;
use orgchart::app;
use orgchart::config::AppConfig;

/// Main entry point for the org chart web server
///
/// Reads the configuration from the environment and serves the chart, the
/// admin pages and the JSON API until the process is stopped.
///
/// # Environment
/// * `ADMIN_PASSWORD` or `ADMIN_PASSWORD_HASH` - required
/// * `ORGCHART_ADDR`, `DATA_DIR`, `BUNDLED_DATA_DIR`, `STATIC_DIR`,
///   `SESSION_TTL_HOURS`, `MAX_UPLOAD_BYTES`, `ORGCHART_MAPPING` - optional
/// * `RUST_LOG` - log filter, `info` by default
///
/// # Returns
/// * `Result<(), Box<dyn std::error::Error>>` - Success or error object
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::from_env().inspect_err(|e| error!("invalid configuration: {}", e))?;

    app::run(config).await?;
    Ok(())
}
