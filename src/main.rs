use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

mod ai;
mod api;
mod config;
mod db;
mod error;
mod models;
mod search;
mod services;

use api::{AppState, Capabilities};
use config::Config;
use db::Repository;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();
    let config_path = match args.iter().position(|a| a == "--config") {
        Some(i) => Some(PathBuf::from(
            args.get(i + 1).context("--config requires a path")?,
        )),
        None => None,
    };

    let config = Config::load(config_path.as_deref()).context("failed to load configuration")?;

    // RUST_LOG wins over the configured filter
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Some(parent) = std::path::Path::new(&config.db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::create_dir_all(&config.audio_dir)?;

    let repository = Repository::new(&config.db_path)
        .await
        .with_context(|| format!("failed to open database at {}", config.db_path))?;
    let capabilities = Capabilities::from_config(&config, &repository)?;
    tracing::info!(
        llm = capabilities.llm.model_name(),
        db = %config.db_path,
        "Capabilities resolved"
    );

    let shutdown = CancellationToken::new();
    let state = Arc::new(AppState::new(
        repository,
        capabilities,
        PathBuf::from(&config.audio_dir),
        shutdown.clone(),
    ));

    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received");
            ctrl_c.cancel();
        }
    });

    api::serve(
        state,
        &config.bind_addr,
        shutdown,
        Duration::from_secs(config.shutdown_grace_secs),
    )
    .await?;

    Ok(())
}
