//! Serving irrigation predictions from the loaded artifact

use super::output::{OutputFormatter, RawOutputs};
use super::weather::apply_forecast;
use crate::error::{AdvisorError, Result};
use crate::features::FeatureEngineer;
use crate::models::{CuratedRecord, ForecastPoint, Prediction, SensorObservation, WeatherContext};
use crate::observability::{AdvisorMetrics, StructuredLogger};
use crate::store::{ArtifactHandle, ModelArtifact};
use chrono::Timelike;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Default prediction horizon in hours
pub const DEFAULT_HORIZON_HOURS: u32 = 4;

/// Latency above which a single prediction is logged as slow
const SLOW_PREDICTION_MS: u128 = 50;

/// Prediction service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    pub horizon_hours: u32,
    /// Fixed local hour for recommendations; `None` reads the system clock
    pub local_hour: Option<u32>,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            horizon_hours: DEFAULT_HORIZON_HOURS,
            local_hour: None,
        }
    }
}

/// Serves predictions against whatever artifact the handle currently holds.
///
/// Never returns an error: every fault becomes a degraded `Prediction`.
#[derive(Debug, Clone)]
pub struct PredictionService {
    handle: ArtifactHandle,
    engineer: FeatureEngineer,
    formatter: OutputFormatter,
    config: PredictionConfig,
    metrics: AdvisorMetrics,
    logger: StructuredLogger,
}

impl PredictionService {
    pub fn new(handle: ArtifactHandle, config: PredictionConfig) -> Self {
        Self {
            handle,
            engineer: FeatureEngineer::new(),
            formatter: OutputFormatter::new(),
            config,
            metrics: AdvisorMetrics::new(),
            logger: StructuredLogger::new("local"),
        }
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn logger(&self) -> &StructuredLogger {
        &self.logger
    }

    pub fn with_artifact(artifact: ModelArtifact) -> Self {
        Self::new(
            ArtifactHandle::with_artifact(artifact),
            PredictionConfig::default(),
        )
    }

    pub fn handle(&self) -> &ArtifactHandle {
        &self.handle
    }

    pub fn config(&self) -> &PredictionConfig {
        &self.config
    }

    pub fn model_version(&self) -> Option<String> {
        self.handle.version()
    }

    /// Swap in a new artifact; in-flight predictions finish on the old one
    pub fn install(&self, artifact: ModelArtifact) -> Option<Arc<ModelArtifact>> {
        self.metrics.set_model(
            &artifact.version,
            artifact.metrics.accuracy,
            artifact.metrics.humidity_mae,
        );
        self.handle.install(artifact)
    }

    /// Predict without weather; default weather values fill the gaps
    pub fn predict(&self, observation: &SensorObservation, horizon_hours: u32) -> Prediction {
        self.predict_record(
            &CuratedRecord::without_weather(*observation),
            horizon_hours,
            self.local_hour(),
        )
    }

    /// Predict with current weather merged in, then apply forecast rules
    pub fn predict_with_weather(
        &self,
        observation: &SensorObservation,
        current_weather: Option<WeatherContext>,
        forecast: &[ForecastPoint],
    ) -> Prediction {
        let record = CuratedRecord {
            observation: *observation,
            weather: current_weather
                .unwrap_or_else(|| WeatherContext::fallback(observation.timestamp_ms)),
        };
        let mut prediction =
            self.predict_record(&record, self.config.horizon_hours, self.local_hour());
        apply_forecast(&mut prediction, forecast);
        prediction
    }

    /// One prediction per observation; failures stay local to their entry
    pub fn predict_batch(
        &self,
        observations: &[SensorObservation],
        horizon_hours: u32,
    ) -> Vec<Prediction> {
        let hour = self.local_hour();
        observations
            .iter()
            .map(|o| self.predict_record(&CuratedRecord::without_weather(*o), horizon_hours, hour))
            .collect()
    }

    /// Predict for an already weather-joined record at a given local hour
    pub fn predict_record(
        &self,
        record: &CuratedRecord,
        horizon_hours: u32,
        local_hour: u32,
    ) -> Prediction {
        let start = Instant::now();
        let result = self.try_predict(record, horizon_hours, local_hour);
        let elapsed = start.elapsed();
        self.metrics
            .observe_prediction_latency(elapsed.as_secs_f64());

        if elapsed.as_millis() > SLOW_PREDICTION_MS {
            warn!(latency_ms = elapsed.as_millis(), "Slow prediction");
        }

        match result {
            Ok(prediction) => {
                self.metrics.inc_predictions_served();
                self.logger.log_prediction(&prediction);
                prediction
            }
            Err(e) => {
                self.metrics.inc_prediction_errors();
                warn!(error = %e, "Prediction degraded");
                Prediction::degraded(e.to_string())
            }
        }
    }

    fn try_predict(
        &self,
        record: &CuratedRecord,
        horizon_hours: u32,
        local_hour: u32,
    ) -> Result<Prediction> {
        let artifact = self.handle.current().ok_or(AdvisorError::ModelNotTrained)?;

        let features = self.engineer.engineer_one(record);
        let row = artifact.prepare_row(&features)?;
        if let Some(i) = row.iter().position(|v| !v.is_finite()) {
            return Err(AdvisorError::Prediction(format!(
                "non-finite value for feature {}",
                artifact
                    .manifest
                    .columns()
                    .get(i)
                    .map(String::as_str)
                    .unwrap_or("?")
            )));
        }

        let raw = RawOutputs {
            probability: artifact.classifier.predict_proba(&row)?,
            member_probabilities: artifact.classifier.member_probabilities(&row)?,
            humidity: artifact.regressor.predict(&row)?,
        };
        debug!(
            version = %artifact.version,
            probability = raw.probability,
            humidity = raw.humidity,
            "Ensemble outputs"
        );

        Ok(self.formatter.format(
            &raw,
            &record.observation,
            horizon_hours,
            local_hour,
            &artifact.version,
        ))
    }

    fn local_hour(&self) -> u32 {
        self.config
            .local_hour
            .unwrap_or_else(|| chrono::Local::now().hour())
    }
}
