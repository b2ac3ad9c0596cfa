use std::path::Path;

use abi::Config;
use anyhow::{anyhow, Result};
use reservation_service::start_server_with_shutdown;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    init_logger()?;

    let filename = config_file()?;
    info!(%filename, "loading config");
    let config = Config::load(&filename)?;

    start_server_with_shutdown(&config, shutdown_signal()).await
}

// we would first try RESERVATION_CONFIG env var,
// then try "./reservation.yml", then try "~/.config/reservation.yml"
// then try "/etc/reservation.yml"
fn config_file() -> Result<String> {
    if let Ok(filename) = std::env::var("RESERVATION_CONFIG") {
        return Ok(filename);
    }
    let candidates = [
        "./reservation.yml".to_string(),
        shellexpand::tilde("~/.config/reservation.yml").into_owned(),
        "/etc/reservation.yml".to_string(),
    ];
    first_existing(candidates).ok_or_else(|| anyhow!("no config file found"))
}

fn first_existing(candidates: impl IntoIterator<Item = String>) -> Option<String> {
    candidates.into_iter().find(|p| Path::new(p).exists())
}

fn init_logger() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into());

    let subscriber = tracing_subscriber::fmt::layer()
        .with_file(true)
        .with_line_number(true)
        .with_target(false);

    tracing_subscriber::registry()
        .with(subscriber)
        .with(env_filter)
        .try_init()?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
