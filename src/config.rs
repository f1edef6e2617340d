use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::monitor::MonitorSettings;

pub const CONFIG_ENV: &str = "RR_MONITOR_CONFIG";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitorConfig {
    pub database_path: PathBuf,
    pub model_path: PathBuf,
    pub scaler_path: PathBuf,
    /// Readings fetched per poll.
    pub fetch_limit: usize,
    pub poll_interval_ms: u64,
    /// Upper bound on one fetch/backfill/publish iteration.
    pub iteration_timeout_ms: u64,
    /// Window length fed to the classifier alongside the rate.
    pub window_secs: u32,
    pub output: OutputFormat,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            database_path: PathBuf::from("rr_monitor.sqlite3"),
            model_path: PathBuf::from("model/lstm_model.json"),
            scaler_path: PathBuf::from("model/scaler.json"),
            fetch_limit: 20,
            poll_interval_ms: 1000,
            iteration_timeout_ms: 10_000,
            window_secs: 60,
            output: OutputFormat::Text,
        }
    }
}

impl MonitorConfig {
    /// Defaults, then the JSON file (if any), then environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(db) = lookup("RR_MONITOR_DB") {
            self.database_path = PathBuf::from(db);
        }
        if let Some(ms) = lookup("RR_MONITOR_POLL_MS") {
            self.poll_interval_ms = ms
                .trim()
                .parse()
                .with_context(|| format!("RR_MONITOR_POLL_MS is not a number: {ms}"))?;
        }
        if let Some(limit) = lookup("RR_MONITOR_FETCH_LIMIT") {
            self.fetch_limit = limit
                .trim()
                .parse()
                .with_context(|| format!("RR_MONITOR_FETCH_LIMIT is not a number: {limit}"))?;
        }
        if let Some(output) = lookup("RR_MONITOR_OUTPUT") {
            self.output = match output.trim().to_ascii_lowercase().as_str() {
                "text" => OutputFormat::Text,
                "json" => OutputFormat::Json,
                other => bail!("RR_MONITOR_OUTPUT must be text or json, got {other}"),
            };
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.fetch_limit == 0 {
            bail!("fetch_limit must be greater than zero");
        }
        if self.poll_interval_ms == 0 {
            bail!("poll_interval_ms must be greater than zero");
        }
        if self.iteration_timeout_ms == 0 {
            bail!("iteration_timeout_ms must be greater than zero");
        }
        if self.window_secs == 0 {
            bail!("window_secs must be greater than zero");
        }
        Ok(())
    }

    pub fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings {
            fetch_limit: self.fetch_limit,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            iteration_timeout: Duration::from_millis(self.iteration_timeout_ms),
            window_secs: self.window_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn partial_file_keeps_defaults() {
        let config: MonitorConfig =
            serde_json::from_str(r#"{ "fetch_limit": 50, "output": "json" }"#).unwrap();
        assert_eq!(config.fetch_limit, 50);
        assert_eq!(config.output, OutputFormat::Json);
        assert_eq!(config.poll_interval_ms, 1000);
        assert_eq!(config.window_secs, 60);
    }

    #[test]
    fn env_overrides_win() {
        let env: HashMap<&str, &str> = [
            ("RR_MONITOR_DB", "/tmp/other.sqlite3"),
            ("RR_MONITOR_POLL_MS", "250"),
            ("RR_MONITOR_OUTPUT", "JSON"),
        ]
        .into_iter()
        .collect();

        let mut config = MonitorConfig::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.database_path, PathBuf::from("/tmp/other.sqlite3"));
        assert_eq!(config.poll_interval_ms, 250);
        assert_eq!(config.output, OutputFormat::Json);
        assert_eq!(config.fetch_limit, 20);
    }

    #[test]
    fn bad_override_is_an_error() {
        let mut config = MonitorConfig::default();
        assert!(config
            .apply_overrides(|key| (key == "RR_MONITOR_FETCH_LIMIT").then(|| "lots".to_string()))
            .is_err());
    }

    #[test]
    fn zero_limits_are_rejected() {
        let mut config = MonitorConfig::default();
        config.fetch_limit = 0;
        assert!(config.validate().is_err());

        let mut config = MonitorConfig::default();
        config.poll_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn settings_carry_durations() {
        let settings = MonitorConfig::default().monitor_settings();
        assert_eq!(settings.poll_interval, Duration::from_secs(1));
        assert_eq!(settings.iteration_timeout, Duration::from_secs(10));
        assert_eq!(settings.fetch_limit, 20);
    }
}
