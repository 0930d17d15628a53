//! Observability infrastructure for the irrigation advisor
//!
//! Provides:
//! - Prometheus metrics (prediction latency, training duration, model quality, drift)
//! - Structured JSON logging with tracing

use crate::models::Prediction;
use prometheus::{
    register_gauge, register_gauge_vec, register_histogram, register_int_gauge, Gauge, GaugeVec,
    Histogram, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for single predictions (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Histogram buckets for training runs (in seconds)
const TRAINING_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0];

static GLOBAL_METRICS: OnceLock<AdvisorMetricsInner> = OnceLock::new();

struct AdvisorMetricsInner {
    prediction_latency_seconds: Histogram,
    training_duration_seconds: Histogram,
    predictions_served: IntGauge,
    prediction_errors: IntGauge,
    retraining_runs: IntGauge,
    training_failures: IntGauge,
    model_accuracy: Gauge,
    humidity_mae: Gauge,
    drift_detected: IntGauge,
    model_age_seconds: IntGauge,
    model_version_info: GaugeVec,
}

impl AdvisorMetricsInner {
    fn new() -> Self {
        Self {
            prediction_latency_seconds: register_histogram!(
                "irrigation_advisor_prediction_latency_seconds",
                "Time spent producing a single irrigation prediction",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register prediction_latency_seconds"),

            training_duration_seconds: register_histogram!(
                "irrigation_advisor_training_duration_seconds",
                "Time spent fitting a new model artifact",
                TRAINING_BUCKETS.to_vec()
            )
            .expect("Failed to register training_duration_seconds"),

            predictions_served: register_int_gauge!(
                "irrigation_advisor_predictions_served_total",
                "Total number of predictions served"
            )
            .expect("Failed to register predictions_served"),

            prediction_errors: register_int_gauge!(
                "irrigation_advisor_prediction_errors_total",
                "Total number of predictions degraded by an error"
            )
            .expect("Failed to register prediction_errors"),

            retraining_runs: register_int_gauge!(
                "irrigation_advisor_retraining_runs_total",
                "Total number of retraining runs triggered"
            )
            .expect("Failed to register retraining_runs"),

            training_failures: register_int_gauge!(
                "irrigation_advisor_training_failures_total",
                "Total number of failed training runs"
            )
            .expect("Failed to register training_failures"),

            model_accuracy: register_gauge!(
                "irrigation_advisor_model_accuracy",
                "Held-out accuracy of the loaded irrigation classifier"
            )
            .expect("Failed to register model_accuracy"),

            humidity_mae: register_gauge!(
                "irrigation_advisor_humidity_mae",
                "Held-out mean absolute error of the loaded humidity regressor"
            )
            .expect("Failed to register humidity_mae"),

            drift_detected: register_int_gauge!(
                "irrigation_advisor_drift_detected",
                "1 when the last drift evaluation detected drift"
            )
            .expect("Failed to register drift_detected"),

            model_age_seconds: register_int_gauge!(
                "irrigation_advisor_model_age_seconds",
                "Age of the loaded model artifact"
            )
            .expect("Failed to register model_age_seconds"),

            model_version_info: register_gauge_vec!(
                "irrigation_advisor_model_version_info",
                "Information about the currently loaded model",
                &["version"]
            )
            .expect("Failed to register model_version_info"),
        }
    }
}

/// Handle to the process-wide advisor metrics.
///
/// Clones share the same underlying Prometheus collectors.
#[derive(Debug, Clone)]
pub struct AdvisorMetrics {
    _private: (),
}

impl Default for AdvisorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl AdvisorMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(AdvisorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &AdvisorMetricsInner {
        GLOBAL_METRICS.get_or_init(AdvisorMetricsInner::new)
    }

    pub fn observe_prediction_latency(&self, duration_secs: f64) {
        self.inner().prediction_latency_seconds.observe(duration_secs);
    }

    pub fn observe_training_duration(&self, duration_secs: f64) {
        self.inner().training_duration_seconds.observe(duration_secs);
    }

    pub fn inc_predictions_served(&self) {
        self.inner().predictions_served.inc();
    }

    pub fn inc_prediction_errors(&self) {
        self.inner().prediction_errors.inc();
    }

    pub fn inc_retraining_runs(&self) {
        self.inner().retraining_runs.inc();
    }

    pub fn inc_training_failures(&self) {
        self.inner().training_failures.inc();
    }

    /// Publish quality and identity of a newly loaded model
    pub fn set_model(&self, version: &str, accuracy: f64, humidity_mae: f64) {
        let inner = self.inner();
        inner.model_accuracy.set(accuracy);
        inner.humidity_mae.set(humidity_mae);
        inner.model_version_info.reset();
        inner
            .model_version_info
            .with_label_values(&[version])
            .set(1.0);
    }

    pub fn set_model_age(&self, age_secs: i64) {
        self.inner().model_age_seconds.set(age_secs);
    }

    pub fn set_drift_detected(&self, detected: bool) {
        self.inner().drift_detected.set(i64::from(detected));
    }
}

/// Structured logger for advisor lifecycle events
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    site: String,
}

impl StructuredLogger {
    pub fn new(site: impl Into<String>) -> Self {
        Self { site: site.into() }
    }

    pub fn site(&self) -> &str {
        &self.site
    }

    pub fn log_prediction(&self, prediction: &Prediction) {
        info!(
            event = "prediction_served",
            site = %self.site,
            irrigation_needed = prediction.irrigation_needed,
            probability = prediction.irrigation_probability,
            confidence = prediction.confidence,
            predicted_humidity = prediction.predicted_humidity,
            horizon_hours = prediction.horizon_hours,
            model_version = prediction.model_version.as_deref().unwrap_or("none"),
            "Served irrigation prediction"
        );
    }

    pub fn log_model_trained(
        &self,
        version: &str,
        samples: usize,
        accuracy: f64,
        humidity_mae: f64,
        duration_secs: f64,
    ) {
        info!(
            event = "model_trained",
            site = %self.site,
            version = %version,
            samples = samples,
            accuracy = accuracy,
            humidity_mae = humidity_mae,
            duration_secs = duration_secs,
            "Trained new irrigation model"
        );
    }

    pub fn log_training_failed(&self, error: &str) {
        warn!(
            event = "training_failed",
            site = %self.site,
            error = %error,
            "Training run failed, keeping previous model"
        );
    }

    pub fn log_drift(&self, status: &str, accuracy: Option<f64>, reasons: &[String]) {
        if status == "drifted" {
            warn!(
                event = "drift_evaluated",
                site = %self.site,
                status = %status,
                accuracy = ?accuracy,
                reasons = ?reasons,
                "Model drift detected"
            );
        } else {
            info!(
                event = "drift_evaluated",
                site = %self.site,
                status = %status,
                accuracy = ?accuracy,
                "Model drift evaluated"
            );
        }
    }

    pub fn log_retraining_triggered(&self, reasons: &[String]) {
        info!(
            event = "retraining_triggered",
            site = %self.site,
            reasons = ?reasons,
            "Retraining triggered"
        );
    }

    pub fn log_model_swap(&self, old_version: Option<&str>, new_version: &str) {
        info!(
            event = "model_swapped",
            site = %self.site,
            old_version = old_version.unwrap_or("none"),
            new_version = %new_version,
            "Serving new model artifact"
        );
    }

    pub fn log_startup(&self, version: &str, model_version: Option<&str>) {
        info!(
            event = "advisor_started",
            site = %self.site,
            advisor_version = %version,
            model_version = model_version.unwrap_or("none"),
            "Irrigation advisor started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "advisor_shutdown",
            site = %self.site,
            reason = %reason,
            "Irrigation advisor shutting down"
        );
    }
}
