//! RR monitor: polls respiratory-rate readings, classifies them and renders
//! the live status.
//!
//! Usage:
//!   rr-monitor                  # defaults, or $RR_MONITOR_CONFIG
//!   rr-monitor monitor.json     # JSON config file

use std::path::PathBuf;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    rr_monitor_lib::run(config_path).await
}
