//! Model drift monitoring and retraining
//!
//! This module provides:
//! - Drift evaluation of logged predictions against observed outcomes
//! - Monitoring reports
//! - Trigger-based retraining with an interval worker

mod monitor;
mod retraining;

pub use monitor::{
    DriftEvaluation, DriftMonitor, DriftOutcome, DriftReport, DriftThresholds, Stability,
    DEFAULT_DRIFT_WINDOW_DAYS, REC_INVESTIGATE, REC_MONITOR_MORE, REC_RETRAIN_NOW,
};
pub use retraining::{
    RetrainPolicy, RetrainingOrchestrator, RetrainingReport, RetrainingSources, RetrainingWorker,
    DEFAULT_RETRAIN_INTERVAL,
};
