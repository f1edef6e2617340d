pub mod classifier;
pub mod config;
pub mod db;
pub mod display;
pub mod error;
pub mod monitor;
mod utils;

use std::path::PathBuf;

use anyhow::{Context, Result};
use log::{info, warn};
use tokio_util::sync::CancellationToken;

use classifier::ModelClassifier;
use config::{MonitorConfig, CONFIG_ENV};
use db::Database;
use display::ChannelSink;
use monitor::{Monitor, MonitorController};

pub use error::MonitorError;

/// Loads configuration, opens the store and model, and runs the monitor
/// until Ctrl-C.
pub async fn run(config_path: Option<PathBuf>) -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    info!("RR monitor starting up...");

    let config_path = config_path.or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
    let config = MonitorConfig::load(config_path.as_deref())?;

    let database = Database::new(config.database_path.clone())?;
    let classifier = ModelClassifier::load(&config.model_path, &config.scaler_path)
        .context("failed to load classifier")?;
    info!(
        "Classifier loaded from {} (scaler {})",
        config.model_path.display(),
        config.scaler_path.display()
    );

    let (sink, dashboard_rx) = ChannelSink::new();
    let render_cancel = CancellationToken::new();
    let renderer = tokio::spawn(display::console::render_loop(
        dashboard_rx,
        config.output,
        render_cancel.clone(),
    ));

    let mut controller = MonitorController::new();
    controller.start(Monitor::new(
        database.clone(),
        classifier,
        sink,
        config.monitor_settings(),
    ))?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    info!("Shutdown requested");

    controller.stop().await?;
    render_cancel.cancel();
    if let Err(err) = renderer.await {
        warn!("renderer task failed to join: {err}");
    }

    match controller.retained() {
        Some(state) => info!(
            "Last classification: {} at {} (stored rate {})",
            state.category, state.timestamp, state.stored_rate
        ),
        None => info!("No definitive classification was observed"),
    }
    info!("Closing database at {}", database.path().display());

    Ok(())
}
