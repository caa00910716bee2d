use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use dumbdo::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Init logging
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).init();

    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(target: "dumbdo", "RUST_LOG='{}'", rust_log);

    let config = Config::from_env()?;
    dumbdo::server::run(config).await
}
