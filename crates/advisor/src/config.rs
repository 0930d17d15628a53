//! Daemon configuration

use advisor_lib::drift::{DriftThresholds, RetrainPolicy};
use advisor_lib::store::ModelStoreConfig;
use advisor_lib::training::TrainerConfig;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Default config file, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "advisor.toml";

/// Daemon configuration, from `advisor.toml` and `ADVISOR_*` variables
#[derive(Debug, Clone, Deserialize)]
pub struct AdvisorConfig {
    /// Site name attached to every structured log record
    #[serde(default = "default_site_name")]
    pub site_name: String,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,

    #[serde(default = "default_versions_to_keep")]
    pub versions_to_keep: usize,

    /// JSON array of unit-tagged sensor readings
    #[serde(default = "default_readings_file")]
    pub readings_file: PathBuf,

    /// Optional JSON array of historical weather observations
    #[serde(default)]
    pub weather_file: Option<PathBuf>,

    #[serde(default = "default_prediction_log_file")]
    pub prediction_log_file: PathBuf,

    #[serde(default = "default_drift_report_file")]
    pub drift_report_file: PathBuf,

    /// Seconds between scheduled retraining checks
    #[serde(default = "default_retrain_interval")]
    pub retrain_interval_secs: u64,

    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,

    #[serde(default = "default_min_collected_samples")]
    pub min_collected_samples: usize,

    #[serde(default = "default_site_lat")]
    pub site_lat: f64,

    #[serde(default = "default_site_lon")]
    pub site_lon: f64,
}

fn default_site_name() -> String {
    std::env::var("SITE_NAME").unwrap_or_else(|_| "unknown".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_model_dir() -> PathBuf {
    ModelStoreConfig::default().model_dir
}

fn default_versions_to_keep() -> usize {
    ModelStoreConfig::default().versions_to_keep
}

fn default_readings_file() -> PathBuf {
    PathBuf::from("data/readings.json")
}

fn default_prediction_log_file() -> PathBuf {
    PathBuf::from("data/predictions.json")
}

fn default_drift_report_file() -> PathBuf {
    PathBuf::from("logs/drift_monitoring_report.json")
}

fn default_retrain_interval() -> u64 {
    RetrainPolicy::default().interval_secs
}

fn default_lookback_days() -> i64 {
    TrainerConfig::default().lookback_days
}

fn default_min_collected_samples() -> usize {
    TrainerConfig::default().min_collected_samples
}

fn default_site_lat() -> f64 {
    TrainerConfig::default().site_lat
}

fn default_site_lon() -> f64 {
    TrainerConfig::default().site_lon
}

impl AdvisorConfig {
    /// Load configuration from `advisor.toml` (if present) and environment
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    pub fn load_from(file: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(file).required(false))
            .add_source(config::Environment::with_prefix("ADVISOR"))
            .build()
            .context("Failed to read advisor configuration")?;

        config
            .try_deserialize()
            .context("Invalid advisor configuration")
    }

    pub fn store_config(&self) -> ModelStoreConfig {
        ModelStoreConfig {
            model_dir: self.model_dir.clone(),
            versions_to_keep: self.versions_to_keep,
        }
    }

    pub fn trainer_config(&self) -> TrainerConfig {
        TrainerConfig {
            lookback_days: self.lookback_days,
            min_collected_samples: self.min_collected_samples,
            site_lat: self.site_lat,
            site_lon: self.site_lon,
            ..TrainerConfig::default()
        }
    }

    pub fn retrain_policy(&self) -> RetrainPolicy {
        RetrainPolicy {
            interval_secs: self.retrain_interval_secs,
            ..RetrainPolicy::default()
        }
    }

    pub fn drift_thresholds(&self) -> DriftThresholds {
        DriftThresholds::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_file() {
        let config = AdvisorConfig::load_from("does-not-exist").unwrap();
        assert_eq!(config.api_port, 8080);
        assert_eq!(config.retrain_interval_secs, 86_400);
        assert_eq!(config.lookback_days, 30);
        assert_eq!(config.min_collected_samples, 50);
        assert_eq!(config.store_config().versions_to_keep, 5);
    }

    #[test]
    fn test_file_values_override_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("advisor.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "api_port = 9100\nmodel_dir = \"/var/lib/advisor\"\nlookback_days = 14").unwrap();

        let config = AdvisorConfig::load_from(path.to_str().unwrap()).unwrap();
        assert_eq!(config.api_port, 9100);
        assert_eq!(config.model_dir, PathBuf::from("/var/lib/advisor"));
        assert_eq!(config.trainer_config().lookback_days, 14);
        assert_eq!(config.trainer_config().min_samples, 10);
    }
}
