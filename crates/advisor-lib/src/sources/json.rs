//! JSON-file collaborator implementations used by the daemon and the CLI

use super::{
    log_entry, select_outcomes, InMemorySensorStore, PredictionLog, SensorReading, SensorStore,
};
use crate::error::{AdvisorError, Result};
use crate::models::{LoggedPrediction, Prediction};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

/// Sensor store backed by a JSON array of `SensorReading`s.
///
/// The file is re-read on every query so a long-running daemon sees
/// readings appended after start-up.
#[derive(Debug)]
pub struct JsonSensorStore {
    path: PathBuf,
}

impl JsonSensorStore {
    /// Open the file, failing early if it cannot be parsed
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let store = Self { path: path.into() };
        store.load().await?;
        Ok(store)
    }

    async fn load(&self) -> Result<InMemorySensorStore> {
        let content = tokio::fs::read(&self.path).await?;
        let readings: Vec<SensorReading> = serde_json::from_slice(&content)?;
        debug!(path = %self.path.display(), readings = readings.len(), "Loaded sensor readings");
        Ok(InMemorySensorStore::new(readings))
    }
}

#[async_trait]
impl SensorStore for JsonSensorStore {
    async fn active_sensors(&self) -> Result<Vec<String>> {
        self.load().await?.active_sensors().await
    }

    async fn readings(
        &self,
        sensor_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<SensorReading>> {
        self.load().await?.readings(sensor_id, start, end).await
    }
}

/// Prediction log persisted as a JSON array.
///
/// Every write rewrites the whole file through a temp file and a rename, so
/// a concurrent reader never sees a half-written log. A missing file is an
/// empty log.
#[derive(Debug)]
pub struct JsonPredictionLog {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonPredictionLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every entry in the log, evaluated or not
    pub async fn entries(&self) -> Result<Vec<LoggedPrediction>> {
        let _guard = self.lock.lock().await;
        self.read_entries().await
    }

    async fn read_entries(&self) -> Result<Vec<LoggedPrediction>> {
        match tokio::fs::read(&self.path).await {
            Ok(content) if content.is_empty() => Ok(Vec::new()),
            Ok(content) => Ok(serde_json::from_slice(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_entries(&self, entries: &[LoggedPrediction]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let temp = self.path.with_extension("json.tmp");
        tokio::fs::write(&temp, serde_json::to_vec_pretty(entries)?).await?;
        tokio::fs::rename(&temp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl PredictionLog for JsonPredictionLog {
    async fn record(&self, sensor_id: &str, prediction: &Prediction) -> Result<u64> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read_entries().await?;
        let id = entries.iter().map(|e| e.id).max().map_or(1, |m| m + 1);
        entries.push(log_entry(id, sensor_id, prediction));
        self.write_entries(&entries).await?;
        Ok(id)
    }

    async fn record_outcome(&self, id: u64, actual_irrigation: bool) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.read_entries().await?;
        let entry = entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| AdvisorError::Source(format!("unknown prediction id {id}")))?;
        entry.actual_irrigation = Some(actual_irrigation);
        self.write_entries(&entries).await
    }

    async fn outcomes_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<LoggedPrediction>> {
        let _guard = self.lock.lock().await;
        let entries = self.read_entries().await?;
        Ok(select_outcomes(&entries, start, end))
    }
}
