//! In-memory collaborator implementations

use super::{
    log_entry, select_outcomes, PredictionLog, SensorReading, SensorStore, WeatherSource,
};
use crate::error::{AdvisorError, Result};
use crate::models::{LoggedPrediction, Prediction, WeatherContext};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use tokio::sync::RwLock;

/// Sensor store holding readings in memory
#[derive(Debug, Default)]
pub struct InMemorySensorStore {
    readings: RwLock<Vec<SensorReading>>,
}

impl InMemorySensorStore {
    pub fn new(readings: Vec<SensorReading>) -> Self {
        Self {
            readings: RwLock::new(readings),
        }
    }

    pub async fn push(&self, reading: SensorReading) {
        self.readings.write().await.push(reading);
    }
}

#[async_trait]
impl SensorStore for InMemorySensorStore {
    async fn active_sensors(&self) -> Result<Vec<String>> {
        let readings = self.readings.read().await;
        let ids: BTreeSet<&str> = readings.iter().map(|r| r.sensor_id.as_str()).collect();
        Ok(ids.into_iter().map(str::to_string).collect())
    }

    async fn readings(
        &self,
        sensor_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SensorReading>> {
        let (start_ms, end_ms) = (start.timestamp_millis(), end.timestamp_millis());
        let readings = self.readings.read().await;
        let mut selected: Vec<SensorReading> = readings
            .iter()
            .filter(|r| r.sensor_id == sensor_id)
            .filter(|r| r.timestamp_ms >= start_ms && r.timestamp_ms <= end_ms)
            .cloned()
            .collect();
        selected.sort_by_key(|r| r.timestamp_ms);
        Ok(selected)
    }
}

/// Weather source that never has data; everything degrades to defaults
#[derive(Debug, Clone, Copy, Default)]
pub struct NoWeather;

#[async_trait]
impl WeatherSource for NoWeather {
    async fn current_weather(&self, _lat: f64, _lon: f64) -> Result<Option<WeatherContext>> {
        Ok(None)
    }

    async fn historical_weather(
        &self,
        _lat: f64,
        _lon: f64,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<Vec<WeatherContext>> {
        Ok(Vec::new())
    }
}

/// Weather source replaying a fixed series
#[derive(Debug, Clone, Default)]
pub struct StaticWeather {
    points: Vec<WeatherContext>,
}

impl StaticWeather {
    pub fn new(mut points: Vec<WeatherContext>) -> Self {
        points.sort_by_key(|w| w.timestamp_ms);
        Self { points }
    }
}

#[async_trait]
impl WeatherSource for StaticWeather {
    async fn current_weather(&self, _lat: f64, _lon: f64) -> Result<Option<WeatherContext>> {
        Ok(self.points.last().copied())
    }

    async fn historical_weather(
        &self,
        _lat: f64,
        _lon: f64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<WeatherContext>> {
        let (start_ms, end_ms) = (start.timestamp_millis(), end.timestamp_millis());
        Ok(self
            .points
            .iter()
            .filter(|w| w.timestamp_ms >= start_ms && w.timestamp_ms <= end_ms)
            .copied()
            .collect())
    }
}

/// Prediction log kept in memory
#[derive(Debug, Default)]
pub struct InMemoryPredictionLog {
    entries: RwLock<Vec<LoggedPrediction>>,
}

impl InMemoryPredictionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the log with already-evaluated entries
    pub fn with_entries(entries: Vec<LoggedPrediction>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl PredictionLog for InMemoryPredictionLog {
    async fn record(&self, sensor_id: &str, prediction: &Prediction) -> Result<u64> {
        let mut entries = self.entries.write().await;
        let id = entries.iter().map(|e| e.id).max().map_or(1, |m| m + 1);
        entries.push(log_entry(id, sensor_id, prediction));
        Ok(id)
    }

    async fn record_outcome(&self, id: u64, actual_irrigation: bool) -> Result<()> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| AdvisorError::Source(format!("unknown prediction id {id}")))?;
        entry.actual_irrigation = Some(actual_irrigation);
        Ok(())
    }

    async fn outcomes_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LoggedPrediction>> {
        let entries = self.entries.read().await;
        Ok(select_outcomes(&entries, start, end))
    }
}
