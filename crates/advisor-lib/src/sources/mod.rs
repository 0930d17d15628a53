//! Contracts with the external collaborators
//!
//! The sensor store, the weather service and the prediction log live
//! outside this crate. They are consumed through the narrow async traits
//! below; in-memory and JSON-file implementations back the tests, the CLI
//! and the daemon.

mod json;
mod memory;

pub use json::{JsonPredictionLog, JsonSensorStore};
pub use memory::{InMemoryPredictionLog, InMemorySensorStore, NoWeather, StaticWeather};

use crate::error::Result;
use crate::models::{LoggedPrediction, Prediction, WeatherContext};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One unit-tagged row from the sensor store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub sensor_id: String,
    /// Unix timestamp in milliseconds
    pub timestamp_ms: i64,
    pub value: String,
    pub unit: String,
}

/// Read access to historical sensor readings
#[async_trait]
pub trait SensorStore: Send + Sync {
    /// Identifiers of sensors currently reporting
    async fn active_sensors(&self) -> Result<Vec<String>>;

    /// Readings of one sensor in `[start, end]`
    async fn readings(
        &self,
        sensor_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SensorReading>>;
}

/// Weather observations for a site
#[async_trait]
pub trait WeatherSource: Send + Sync {
    async fn current_weather(&self, lat: f64, lon: f64) -> Result<Option<WeatherContext>>;

    /// Ordered weather history in `[start, end]`
    async fn historical_weather(
        &self,
        lat: f64,
        lon: f64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<WeatherContext>>;
}

/// Log of served predictions, later augmented with observed outcomes
#[async_trait]
pub trait PredictionLog: Send + Sync {
    /// Persist a served prediction and return its entry id
    async fn record(&self, sensor_id: &str, prediction: &Prediction) -> Result<u64>;

    /// Attach the irrigation outcome observed after the fact
    async fn record_outcome(&self, id: u64, actual_irrigation: bool) -> Result<()>;

    /// Entries predicted in `[start, end]` whose outcome is known, oldest first
    async fn outcomes_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LoggedPrediction>>;
}

/// Build a log entry from a served prediction
pub(crate) fn log_entry(id: u64, sensor_id: &str, prediction: &Prediction) -> LoggedPrediction {
    LoggedPrediction {
        id,
        sensor_id: sensor_id.to_string(),
        predicted_at: prediction.generated_at * 1000,
        irrigation_needed: prediction.irrigation_needed,
        irrigation_probability: prediction.irrigation_probability,
        confidence: prediction.confidence,
        actual_irrigation: None,
    }
}

/// Filter and order entries with known outcomes inside a time window
pub(crate) fn select_outcomes(
    entries: &[LoggedPrediction],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Vec<LoggedPrediction> {
    let (start_ms, end_ms) = (start.timestamp_millis(), end.timestamp_millis());
    let mut selected: Vec<LoggedPrediction> = entries
        .iter()
        .filter(|e| e.actual_irrigation.is_some())
        .filter(|e| e.predicted_at >= start_ms && e.predicted_at <= end_ms)
        .cloned()
        .collect();
    selected.sort_by_key(|e| e.predicted_at);
    selected
}
