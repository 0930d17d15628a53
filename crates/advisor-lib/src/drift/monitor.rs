//! Drift evaluation against observed irrigation outcomes

use crate::error::Result;
use crate::models::LoggedPrediction;
use crate::sources::PredictionLog;
use crate::training::ConfusionMatrix;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info, warn};

/// Default trailing evaluation window in days
pub const DEFAULT_DRIFT_WINDOW_DAYS: i64 = 7;

pub const REC_RETRAIN_NOW: &str = "Retrain the model immediately";
pub const REC_INVESTIGATE: &str = "Investigate the cause of the drift";
pub const REC_MONITOR_MORE: &str = "Increase monitoring frequency";

/// Quality floors and ceilings below/above which a model counts as drifted
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftThresholds {
    pub min_accuracy: f64,
    pub max_brier_score: f64,
    pub min_f1: f64,
}

impl Default for DriftThresholds {
    fn default() -> Self {
        Self {
            min_accuracy: 0.75,
            max_brier_score: 0.25,
            min_f1: 0.7,
        }
    }
}

/// Quality of served predictions over one evaluation window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftEvaluation {
    pub period_days: i64,
    pub evaluated_at: DateTime<Utc>,
    pub sample_count: usize,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Mean absolute gap between predicted probability and outcome
    pub brier_score: f64,
    pub confusion: ConfusionMatrix,
    pub drift_detected: bool,
    pub reasons: Vec<String>,
}

/// Three-valued model stability. `Unknown` is never a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stability {
    Stable,
    Drifted,
    Unknown,
}

impl Stability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stability::Stable => "stable",
            Stability::Drifted => "drifted",
            Stability::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Stability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one drift check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DriftOutcome {
    Evaluated(DriftEvaluation),
    /// No prediction with a known outcome in the window
    InsufficientData { period_days: i64 },
}

impl DriftOutcome {
    pub fn stability(&self) -> Stability {
        match self {
            DriftOutcome::Evaluated(e) if e.drift_detected => Stability::Drifted,
            DriftOutcome::Evaluated(_) => Stability::Stable,
            DriftOutcome::InsufficientData { .. } => Stability::Unknown,
        }
    }

    pub fn evaluation(&self) -> Option<&DriftEvaluation> {
        match self {
            DriftOutcome::Evaluated(e) => Some(e),
            DriftOutcome::InsufficientData { .. } => None,
        }
    }
}

/// Monitoring report persisted alongside the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    pub generated_at: DateTime<Utc>,
    pub status: Stability,
    pub evaluation: Option<DriftEvaluation>,
    /// Evaluation carried over from the previous report, if any
    #[serde(default)]
    pub previous: Option<DriftEvaluation>,
    pub recommendations: Vec<String>,
}

impl DriftReport {
    pub fn new(outcome: &DriftOutcome, previous: Option<DriftEvaluation>) -> Self {
        let status = outcome.stability();
        let recommendations = if status == Stability::Drifted {
            [REC_RETRAIN_NOW, REC_INVESTIGATE, REC_MONITOR_MORE]
                .iter()
                .map(|s| s.to_string())
                .collect()
        } else {
            Vec::new()
        };
        Self {
            generated_at: Utc::now(),
            status,
            evaluation: outcome.evaluation().cloned(),
            previous,
            recommendations,
        }
    }

    /// Read a report written earlier; a missing file yields `None`
    pub fn load(path: &Path) -> Result<Option<Self>> {
        match std::fs::read(path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(self)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }
}

/// Scores logged predictions against their observed outcomes
#[derive(Debug, Clone, Default)]
pub struct DriftMonitor {
    thresholds: DriftThresholds,
}

impl DriftMonitor {
    pub fn new(thresholds: DriftThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &DriftThresholds {
        &self.thresholds
    }

    /// Evaluate the trailing `days` of the prediction log
    pub async fn evaluate(&self, log: &dyn PredictionLog, days: i64) -> Result<DriftOutcome> {
        let end = Utc::now();
        let start = end - chrono::Duration::days(days);
        let entries = log.outcomes_between(start, end).await?;
        debug!(days, entries = entries.len(), "Loaded prediction outcomes");
        Ok(self.evaluate_entries(&entries, days))
    }

    /// Evaluate already selected log entries; entries without an outcome are skipped
    pub fn evaluate_entries(&self, entries: &[LoggedPrediction], period_days: i64) -> DriftOutcome {
        let scored: Vec<(bool, f64, bool)> = entries
            .iter()
            .filter_map(|e| {
                e.actual_irrigation
                    .map(|actual| (e.irrigation_needed, e.irrigation_probability, actual))
            })
            .collect();

        if scored.is_empty() {
            warn!(period_days, "No evaluation data for drift check");
            return DriftOutcome::InsufficientData { period_days };
        }

        let confusion =
            ConfusionMatrix::from_pairs(scored.iter().map(|&(pred, _, actual)| (pred, actual)));
        let brier_score = scored
            .iter()
            .map(|&(_, p, actual)| (p - if actual { 1.0 } else { 0.0 }).abs())
            .sum::<f64>()
            / scored.len() as f64;

        let accuracy = confusion.accuracy();
        let f1 = confusion.f1();
        let t = &self.thresholds;
        let mut reasons = Vec::new();
        if accuracy < t.min_accuracy {
            reasons.push(format!("Low accuracy: {accuracy:.3} < {}", t.min_accuracy));
        }
        if brier_score > t.max_brier_score {
            reasons.push(format!(
                "Poor calibration: Brier score {brier_score:.3} > {}",
                t.max_brier_score
            ));
        }
        if f1 < t.min_f1 {
            reasons.push(format!("Low F1 score: {f1:.3} < {}", t.min_f1));
        }

        let evaluation = DriftEvaluation {
            period_days,
            evaluated_at: Utc::now(),
            sample_count: scored.len(),
            accuracy,
            precision: confusion.precision(),
            recall: confusion.recall(),
            f1,
            brier_score,
            confusion,
            drift_detected: !reasons.is_empty(),
            reasons,
        };

        info!(
            samples = evaluation.sample_count,
            accuracy = evaluation.accuracy,
            f1 = evaluation.f1,
            brier_score = evaluation.brier_score,
            drift_detected = evaluation.drift_detected,
            "Drift evaluation complete"
        );
        DriftOutcome::Evaluated(evaluation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::InMemoryPredictionLog;
    use tempfile::TempDir;

    fn entry(id: u64, predicted: bool, probability: f64, actual: Option<bool>) -> LoggedPrediction {
        LoggedPrediction {
            id,
            sensor_id: "s1".to_string(),
            predicted_at: Utc::now().timestamp_millis() - 3_600_000,
            irrigation_needed: predicted,
            irrigation_probability: probability,
            confidence: probability.max(1.0 - probability),
            actual_irrigation: actual,
        }
    }

    /// 100 pairs of which the first `correct` match their outcome
    fn pairs(correct: usize) -> Vec<LoggedPrediction> {
        (0..100)
            .map(|i| {
                let actual = i % 2 == 0;
                let predicted = if i < correct { actual } else { !actual };
                let p = if predicted { 0.8 } else { 0.2 };
                entry(i as u64, predicted, p, Some(actual))
            })
            .collect()
    }

    #[test]
    fn test_sixty_percent_accuracy_is_drift() {
        let outcome = DriftMonitor::default().evaluate_entries(&pairs(60), 7);
        assert_eq!(outcome.stability(), Stability::Drifted);
        let eval = outcome.evaluation().unwrap();
        assert_eq!(eval.sample_count, 100);
        assert!((eval.accuracy - 0.60).abs() < 1e-12);
        assert!(eval.reasons.iter().any(|r| r.contains("accuracy")));
    }

    #[test]
    fn test_accurate_calibrated_model_is_stable() {
        let outcome = DriftMonitor::default().evaluate_entries(&pairs(100), 7);
        let eval = outcome.evaluation().unwrap();
        assert_eq!(outcome.stability(), Stability::Stable);
        assert!((eval.brier_score - 0.2).abs() < 1e-12);
        assert!(eval.reasons.is_empty());
    }

    #[test]
    fn test_poor_calibration_alone_is_drift() {
        let entries: Vec<_> = (0..20)
            .map(|i| {
                let actual = i % 2 == 0;
                entry(i, actual, if actual { 0.55 } else { 0.45 }, Some(actual))
            })
            .collect();
        let eval = DriftMonitor::default().evaluate_entries(&entries, 7);
        let eval = eval.evaluation().unwrap();
        assert_eq!(eval.accuracy, 1.0);
        assert!(eval.drift_detected);
        assert_eq!(eval.reasons.len(), 1);
        assert!(eval.reasons[0].contains("Brier"));
    }

    #[test]
    fn test_empty_window_is_unknown_not_stable() {
        let outcome =
            DriftMonitor::default().evaluate_entries(&[entry(1, true, 0.9, None)], 7);
        assert_eq!(outcome, DriftOutcome::InsufficientData { period_days: 7 });
        assert_eq!(outcome.stability(), Stability::Unknown);
    }

    #[tokio::test]
    async fn test_evaluate_reads_log_window() {
        let log = InMemoryPredictionLog::with_entries(pairs(90));
        let outcome = DriftMonitor::default().evaluate(&log, 7).await.unwrap();
        assert_eq!(outcome.evaluation().unwrap().sample_count, 100);

        let empty = InMemoryPredictionLog::new();
        let outcome = DriftMonitor::default().evaluate(&empty, 7).await.unwrap();
        assert_eq!(outcome.stability(), Stability::Unknown);
    }

    #[test]
    fn test_report_recommendations_and_persistence() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reports").join("drift.json");
        assert!(DriftReport::load(&path).unwrap().is_none());

        let drifted = DriftMonitor::default().evaluate_entries(&pairs(60), 7);
        let report = DriftReport::new(&drifted, None);
        assert_eq!(report.status, Stability::Drifted);
        assert_eq!(
            report.recommendations,
            vec![REC_RETRAIN_NOW, REC_INVESTIGATE, REC_MONITOR_MORE]
        );
        report.save(&path).unwrap();

        let loaded = DriftReport::load(&path).unwrap().unwrap();
        assert_eq!(loaded, report);

        let stable = DriftMonitor::default().evaluate_entries(&pairs(100), 7);
        let next = DriftReport::new(&stable, loaded.evaluation);
        assert!(next.recommendations.is_empty());
        assert!(next.previous.is_some());
    }
}
