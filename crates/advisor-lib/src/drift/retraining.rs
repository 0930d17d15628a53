//! Scheduled retraining
//!
//! Decides whether the served model should be replaced (drift, age, fresh
//! data, or no model at all), runs the trainer off the async runtime,
//! persists the result and swaps it into the serving handle.

use super::monitor::{DriftMonitor, DriftReport, Stability, DEFAULT_DRIFT_WINDOW_DAYS};
use crate::error::{AdvisorError, Result};
use crate::health::HealthRegistry;
use crate::observability::{AdvisorMetrics, StructuredLogger};
use crate::sources::{PredictionLog, SensorStore, WeatherSource};
use crate::store::{ArtifactHandle, ModelArtifact, ModelStore};
use crate::training::ModelTrainer;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

/// Default interval between scheduled retraining checks (daily)
pub const DEFAULT_RETRAIN_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// When a served model should be replaced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrainPolicy {
    pub max_model_age_days: i64,
    /// Retrain when more than this many fresh records arrived
    pub new_samples_threshold: usize,
    pub new_samples_window_days: i64,
    pub drift_window_days: i64,
    pub interval_secs: u64,
}

impl Default for RetrainPolicy {
    fn default() -> Self {
        Self {
            max_model_age_days: 7,
            new_samples_threshold: 20,
            new_samples_window_days: 3,
            drift_window_days: DEFAULT_DRIFT_WINDOW_DAYS,
            interval_secs: DEFAULT_RETRAIN_INTERVAL.as_secs(),
        }
    }
}

/// What one scheduled check decided and did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrainingReport {
    pub checked_at: DateTime<Utc>,
    pub drift: Stability,
    pub triggered: bool,
    pub reasons: Vec<String>,
    pub new_version: Option<String>,
    /// Drift status re-evaluated after a successful retrain
    pub post_training: Option<Stability>,
    pub error: Option<String>,
}

/// Collaborators the orchestrator reads from
#[derive(Clone)]
pub struct RetrainingSources {
    pub sensors: Arc<dyn SensorStore>,
    pub weather: Arc<dyn WeatherSource>,
    pub log: Arc<dyn PredictionLog>,
}

pub struct RetrainingOrchestrator {
    trainer: Arc<ModelTrainer>,
    store: Arc<ModelStore>,
    handle: ArtifactHandle,
    sources: RetrainingSources,
    monitor: DriftMonitor,
    policy: RetrainPolicy,
    logger: StructuredLogger,
    metrics: AdvisorMetrics,
    health: Option<HealthRegistry>,
    report_path: Option<PathBuf>,
}

impl RetrainingOrchestrator {
    pub fn new(
        trainer: ModelTrainer,
        store: ModelStore,
        handle: ArtifactHandle,
        sources: RetrainingSources,
    ) -> Self {
        Self {
            trainer: Arc::new(trainer),
            store: Arc::new(store),
            handle,
            sources,
            monitor: DriftMonitor::default(),
            policy: RetrainPolicy::default(),
            logger: StructuredLogger::new("local"),
            metrics: AdvisorMetrics::new(),
            health: None,
            report_path: None,
        }
    }

    pub fn with_policy(mut self, policy: RetrainPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_monitor(mut self, monitor: DriftMonitor) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    /// Write a `DriftReport` here after every drift check
    pub fn with_report_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.report_path = Some(path.into());
        self
    }

    pub fn policy(&self) -> &RetrainPolicy {
        &self.policy
    }

    pub fn handle(&self) -> &ArtifactHandle {
        &self.handle
    }

    /// Evaluate drift over the policy window; log failures count as unknown
    pub async fn check_drift(&self) -> Stability {
        let stability = match self
            .monitor
            .evaluate(self.sources.log.as_ref(), self.policy.drift_window_days)
            .await
        {
            Ok(outcome) => {
                let (accuracy, reasons) = match outcome.evaluation() {
                    Some(e) => (Some(e.accuracy), e.reasons.clone()),
                    None => (None, Vec::new()),
                };
                let stability = outcome.stability();
                self.logger.log_drift(stability.as_str(), accuracy, &reasons);
                if let Some(path) = &self.report_path {
                    self.write_report(path.clone(), DriftReport::new(&outcome, None))
                        .await;
                }
                stability
            }
            Err(e) => {
                warn!(error = %e, "Drift evaluation failed");
                Stability::Unknown
            }
        };

        self.metrics
            .set_drift_detected(stability == Stability::Drifted);
        if let Some(health) = &self.health {
            health.record_drift(stability).await;
        }
        stability
    }

    /// Persist a report off the runtime, carrying over the last evaluation
    async fn write_report(&self, path: PathBuf, mut report: DriftReport) {
        let task = tokio::task::spawn_blocking(move || {
            report.previous = match DriftReport::load(&path) {
                Ok(previous) => previous.and_then(|r| r.evaluation),
                Err(e) => {
                    warn!(error = %e, "Previous drift report unreadable");
                    None
                }
            };
            if let Err(e) = report.save(&path) {
                warn!(error = %e, path = %path.display(), "Failed to write drift report");
            }
        });
        if let Err(e) = task.await {
            warn!(error = %e, "Drift report task failed");
        }
    }

    /// Serve the stored model if nothing is loaded yet
    pub async fn ensure_loaded(&self) -> Result<Option<Arc<ModelArtifact>>> {
        if let Some(current) = self.handle.current() {
            return Ok(Some(current));
        }
        let store = Arc::clone(&self.store);
        let loaded = tokio::task::spawn_blocking(move || store.load())
            .await
            .map_err(|e| AdvisorError::Source(format!("model load task failed: {e}")))??;

        if let Some(artifact) = loaded {
            info!(version = %artifact.version, "Loaded stored model");
            self.metrics.set_model(
                &artifact.version,
                artifact.metrics.accuracy,
                artifact.metrics.humidity_mae,
            );
            self.handle.install(artifact);
        }
        let current = self.handle.current();
        if let Some(health) = &self.health {
            health
                .record_model(current.as_ref().map(|a| a.version.as_str()))
                .await;
        }
        Ok(current)
    }

    /// Reasons to retrain now; empty means keep the current model
    async fn retraining_reasons(&self, drift: Stability) -> Vec<String> {
        let mut reasons = Vec::new();
        if drift == Stability::Drifted {
            reasons.push("Drift detected in the model".to_string());
        }

        let current = match self.ensure_loaded().await {
            Ok(current) => current,
            Err(e) => {
                warn!(error = %e, "Stored model unusable");
                None
            }
        };

        let Some(artifact) = current else {
            reasons.push("Model not found".to_string());
            return reasons;
        };

        let age = artifact.age(Utc::now());
        self.metrics.set_model_age(age.num_seconds());
        if age.num_days() > self.policy.max_model_age_days {
            reasons.push(format!("Model is {} days old", age.num_days()));
        }

        let end = Utc::now();
        let start = end - chrono::Duration::days(self.policy.new_samples_window_days);
        match self
            .trainer
            .collect_records(self.sources.sensors.as_ref(), start, end)
            .await
        {
            Ok((records, _)) if records.len() > self.policy.new_samples_threshold => {
                reasons.push(format!("{} new samples available", records.len()));
            }
            Ok((records, _)) => debug!(records = records.len(), "Not enough fresh data"),
            Err(e) => warn!(error = %e, "Could not count fresh samples"),
        }

        reasons
    }

    /// Check every retraining trigger and retrain when any fires.
    ///
    /// Training failures are reported, never propagated; the previously
    /// served model stays in place.
    pub async fn scheduled_retraining(&self) -> RetrainingReport {
        let drift = self.check_drift().await;
        let reasons = self.retraining_reasons(drift).await;

        let mut report = RetrainingReport {
            checked_at: Utc::now(),
            drift,
            triggered: !reasons.is_empty(),
            reasons,
            new_version: None,
            post_training: None,
            error: None,
        };

        if !report.triggered {
            info!(drift = %drift, "Retraining not needed");
            return report;
        }

        self.logger.log_retraining_triggered(&report.reasons);
        self.metrics.inc_retraining_runs();

        match self.retrain().await {
            Ok(version) => {
                if let Some(health) = &self.health {
                    health.record_training(None).await;
                    health.record_model(Some(&version)).await;
                }
                report.new_version = Some(version);

                let post = self.check_drift().await;
                if post == Stability::Stable {
                    info!("Retrained model is stable");
                } else {
                    warn!(status = %post, "Retrained model still not confirmed stable");
                }
                report.post_training = Some(post);
            }
            Err(e) => {
                let message = e.to_string();
                if e.is_data_shortage() {
                    warn!(error = %message, "Retraining skipped for lack of data");
                } else {
                    error!(error = %message, "Retraining failed");
                }
                self.metrics.inc_training_failures();
                self.logger.log_training_failed(&message);
                if let Some(health) = &self.health {
                    health.record_training(Some(&message)).await;
                }
                report.error = Some(message);
            }
        }

        report
    }

    /// Collect, fit, persist and install a new artifact
    async fn retrain(&self) -> Result<String> {
        let lookback = chrono::Duration::days(self.trainer.config().lookback_days);
        let data = self
            .trainer
            .collect_training_data(
                self.sources.sensors.as_ref(),
                self.sources.weather.as_ref(),
                lookback,
            )
            .await?;

        let start = Instant::now();
        let trainer = Arc::clone(&self.trainer);
        let artifact = tokio::task::spawn_blocking(move || trainer.train(&data.records, &data.weather))
            .await
            .map_err(|e| AdvisorError::Source(format!("training task failed: {e}")))??;
        let duration = start.elapsed().as_secs_f64();

        let store = Arc::clone(&self.store);
        let to_save = artifact.clone();
        tokio::task::spawn_blocking(move || store.save(&to_save))
            .await
            .map_err(|e| AdvisorError::Source(format!("model save task failed: {e}")))??;

        let version = artifact.version.clone();
        self.logger.log_model_trained(
            &version,
            artifact.metrics.training_samples,
            artifact.metrics.accuracy,
            artifact.metrics.humidity_mae,
            duration,
        );
        self.metrics.set_model(
            &version,
            artifact.metrics.accuracy,
            artifact.metrics.humidity_mae,
        );
        self.metrics.set_model_age(0);

        let previous = self.handle.install(artifact);
        self.logger
            .log_model_swap(previous.as_ref().map(|a| a.version.as_str()), &version);
        Ok(version)
    }
}

/// Runs scheduled retraining on a fixed interval until shutdown
pub struct RetrainingWorker {
    orchestrator: Arc<RetrainingOrchestrator>,
    period: Duration,
}

impl RetrainingWorker {
    pub fn new(orchestrator: Arc<RetrainingOrchestrator>) -> Self {
        let period = Duration::from_secs(orchestrator.policy().interval_secs.max(1));
        Self {
            orchestrator,
            period,
        }
    }

    /// Run the loop; the first check happens immediately
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(interval_secs = self.period.as_secs(), "Starting retraining worker");
        let mut ticker = interval(self.period);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.orchestrator.scheduled_retraining().await;
                    debug!(
                        triggered = report.triggered,
                        new_version = ?report.new_version,
                        "Scheduled retraining check finished"
                    );
                }
                _ = shutdown.recv() => {
                    info!("Shutting down retraining worker");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::components;
    use crate::models::LoggedPrediction;
    use crate::sources::{InMemoryPredictionLog, InMemorySensorStore, NoWeather, SensorReading};
    use crate::store::ModelStoreConfig;
    use crate::training::TrainerConfig;
    use tempfile::TempDir;

    const HOUR_MS: i64 = 3_600_000;

    /// `n` hourly readings ending now, dry soil labelled as irrigated
    fn recent_readings(n: usize) -> Vec<SensorReading> {
        let now = Utc::now().timestamp_millis();
        let mut readings = Vec::new();
        for i in 0..n {
            let ts = now - (n - i) as i64 * HOUR_MS;
            let moisture = 10.0 + (i * 37 % 80) as f64;
            let irrigated = if moisture < 35.0 { "1" } else { "0" };
            for (value, unit) in [
                (format!("{moisture}"), "%"),
                ("6.5".to_string(), "pH"),
                (r#"{"P": 12, "K": 30}"#.to_string(), "ppm"),
                (irrigated.to_string(), "irrigation"),
            ] {
                readings.push(SensorReading {
                    sensor_id: "s1".to_string(),
                    timestamp_ms: ts,
                    value,
                    unit: unit.to_string(),
                });
            }
        }
        readings
    }

    /// Confident predictions contradicted by the recorded outcome
    fn wrong_predictions() -> Vec<LoggedPrediction> {
        let now = Utc::now().timestamp_millis();
        (0..40)
            .map(|i| LoggedPrediction {
                id: i,
                sensor_id: "s1".to_string(),
                predicted_at: now - HOUR_MS,
                irrigation_needed: true,
                irrigation_probability: 0.9,
                confidence: 0.9,
                actual_irrigation: Some(false),
            })
            .collect()
    }

    fn orchestrator(dir: &TempDir, readings: usize, log: InMemoryPredictionLog) -> RetrainingOrchestrator {
        let sources = RetrainingSources {
            sensors: Arc::new(InMemorySensorStore::new(recent_readings(readings))),
            weather: Arc::new(NoWeather),
            log: Arc::new(log),
        };
        let store = ModelStore::new(ModelStoreConfig {
            model_dir: dir.path().to_path_buf(),
            ..Default::default()
        });
        RetrainingOrchestrator::new(
            ModelTrainer::new(TrainerConfig::default()),
            store,
            ArtifactHandle::new(),
            sources,
        )
    }

    #[tokio::test]
    async fn test_missing_model_triggers_training() {
        let dir = TempDir::new().unwrap();
        let health = HealthRegistry::new();
        let orch = orchestrator(&dir, 80, InMemoryPredictionLog::new()).with_health(health.clone());

        let report = orch.scheduled_retraining().await;
        assert!(report.triggered);
        assert!(report.reasons.iter().any(|r| r == "Model not found"));
        assert_eq!(report.drift, Stability::Unknown);
        assert!(report.error.is_none(), "{:?}", report.error);

        let version = report.new_version.expect("new version");
        assert_eq!(orch.handle().version(), Some(version.clone()));
        assert_eq!(
            ModelStore::open(dir.path()).current_version().unwrap(),
            Some(version)
        );
        assert_eq!(report.post_training, Some(Stability::Unknown));

        let h = health.health().await;
        assert_eq!(
            h.components[components::TRAINER].status,
            crate::health::ComponentStatus::Healthy
        );
    }

    #[tokio::test]
    async fn test_fresh_model_without_triggers_is_kept() {
        let dir = TempDir::new().unwrap();
        let first = orchestrator(&dir, 80, InMemoryPredictionLog::new());
        let version = first.scheduled_retraining().await.new_version.unwrap();

        // Few fresh readings and no drift evidence
        let orch = orchestrator(&dir, 5, InMemoryPredictionLog::new());
        let report = orch.scheduled_retraining().await;
        assert!(!report.triggered, "{:?}", report.reasons);
        assert_eq!(orch.handle().version(), Some(version));
    }

    #[tokio::test]
    async fn test_drift_is_a_reason() {
        let dir = TempDir::new().unwrap();
        let report_path = dir.path().join("drift_report.json");
        let orch = orchestrator(&dir, 80, InMemoryPredictionLog::with_entries(wrong_predictions()))
            .with_report_path(&report_path);

        let report = orch.scheduled_retraining().await;
        assert_eq!(report.drift, Stability::Drifted);
        let written = DriftReport::load(&report_path).unwrap().unwrap();
        assert_eq!(written.status, Stability::Drifted);
        assert!(written.previous.is_some());
        assert!(report.reasons.iter().any(|r| r.contains("Drift")));
        assert_eq!(report.post_training, Some(Stability::Drifted));
    }

    #[tokio::test]
    async fn test_training_failure_keeps_serving_nothing_and_reports() {
        let dir = TempDir::new().unwrap();
        let health = HealthRegistry::new();
        let orch = orchestrator(&dir, 12, InMemoryPredictionLog::new()).with_health(health.clone());

        let report = orch.scheduled_retraining().await;
        assert!(report.triggered);
        assert!(report.new_version.is_none());
        assert!(report.error.unwrap().contains("insufficient data"));
        assert!(!orch.handle().is_loaded());

        let h = health.health().await;
        assert_eq!(
            h.components[components::TRAINER].status,
            crate::health::ComponentStatus::Degraded
        );
    }

    #[tokio::test]
    async fn test_failed_retrain_keeps_stored_and_served_model() {
        let dir = TempDir::new().unwrap();
        let version = orchestrator(&dir, 80, InMemoryPredictionLog::new())
            .scheduled_retraining()
            .await
            .new_version
            .unwrap();
        let store = ModelStore::open(dir.path());
        let stored = store.load().unwrap().unwrap();

        // Drift forces a retrain, but the history is too short to fit
        let orch = orchestrator(&dir, 12, InMemoryPredictionLog::with_entries(wrong_predictions()));
        let served = orch.ensure_loaded().await.unwrap().unwrap();
        assert_eq!(served.version, version);

        let report = orch.scheduled_retraining().await;
        assert!(report.triggered);
        assert!(report.new_version.is_none());
        assert!(report.error.unwrap().contains("insufficient data"));

        assert_eq!(store.current_version().unwrap(), Some(version.clone()));
        assert_eq!(store.versions().unwrap(), vec![version.clone()]);
        assert_eq!(store.load().unwrap().unwrap(), stored);
        assert_eq!(orch.handle().version(), Some(version));
        assert!(Arc::ptr_eq(&orch.handle().current().unwrap(), &served));
    }

    #[tokio::test]
    async fn test_worker_stops_on_shutdown() {
        let dir = TempDir::new().unwrap();
        let orch = Arc::new(orchestrator(&dir, 5, InMemoryPredictionLog::new()).with_policy(
            RetrainPolicy {
                interval_secs: 3600,
                ..Default::default()
            },
        ));
        let (tx, rx) = broadcast::channel(1);
        let task = tokio::spawn(RetrainingWorker::new(orch).run(rx));
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("worker did not stop")
            .unwrap();
    }
}
