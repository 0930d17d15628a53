//! Drift evaluation and retraining commands

use anyhow::{Context, Result};
use advisor_lib::drift::{
    DriftMonitor, DriftOutcome, DriftReport, RetrainingOrchestrator, RetrainingReport,
    RetrainingSources,
};
use advisor_lib::sources::{JsonPredictionLog, JsonSensorStore};
use advisor_lib::store::{ArtifactHandle, ModelStore};
use advisor_lib::training::{ModelTrainer, TrainerConfig};
use std::path::Path;
use std::sync::Arc;

use super::weather_source;
use crate::output::{
    color_stability, format_percent, print_info, print_json, print_rows, print_success,
    print_warning, FieldRow, OutputFormat,
};

fn outcome_rows(outcome: &DriftOutcome) -> Vec<FieldRow> {
    let mut rows = vec![FieldRow::new("Status", color_stability(outcome.stability()))];
    match outcome {
        DriftOutcome::Evaluated(e) => {
            rows.extend([
                FieldRow::new("Window", format!("{} days", e.period_days)),
                FieldRow::new("Samples", e.sample_count.to_string()),
                FieldRow::new("Accuracy", format_percent(e.accuracy)),
                FieldRow::new("Precision", format_percent(e.precision)),
                FieldRow::new("Recall", format_percent(e.recall)),
                FieldRow::new("F1", format!("{:.3}", e.f1)),
                FieldRow::new("Brier score", format!("{:.3}", e.brier_score)),
            ]);
            for reason in &e.reasons {
                rows.push(FieldRow::new("Reason", reason.clone()));
            }
        }
        DriftOutcome::InsufficientData { period_days } => {
            rows.push(FieldRow::new(
                "Window",
                format!("{period_days} days, no predictions with known outcome"),
            ));
        }
    }
    rows
}

/// Evaluate logged predictions against their outcomes
pub async fn evaluate(
    log: &Path,
    days: i64,
    report: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    let prediction_log = JsonPredictionLog::new(log);
    let outcome = DriftMonitor::default()
        .evaluate(&prediction_log, days)
        .await
        .with_context(|| format!("Failed to evaluate {}", log.display()))?;

    let drift_report = match report {
        Some(path) => {
            let previous = DriftReport::load(path)?.and_then(|r| r.evaluation);
            let drift_report = DriftReport::new(&outcome, previous);
            drift_report.save(path)?;
            Some((path, drift_report))
        }
        None => None,
    };

    match format {
        OutputFormat::Json => print_json(&outcome)?,
        OutputFormat::Table => {
            print_rows(outcome_rows(&outcome));
            if let Some((path, drift_report)) = &drift_report {
                for rec in &drift_report.recommendations {
                    print_warning(rec);
                }
                print_info(&format!("Report written to {}", path.display()));
            }
        }
    }
    Ok(())
}

/// Run one scheduled retraining check against files
pub async fn retrain(
    model_dir: &Path,
    readings: &Path,
    log: &Path,
    weather: Option<&Path>,
    report: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    let sensors = JsonSensorStore::open(readings)
        .await
        .with_context(|| format!("Failed to open readings {}", readings.display()))?;
    let sources = RetrainingSources {
        sensors: Arc::new(sensors),
        weather: Arc::from(weather_source(weather)?),
        log: Arc::new(JsonPredictionLog::new(log)),
    };

    let mut orchestrator = RetrainingOrchestrator::new(
        ModelTrainer::new(TrainerConfig::default()),
        ModelStore::open(model_dir),
        ArtifactHandle::new(),
        sources,
    );
    if let Some(path) = report {
        orchestrator = orchestrator.with_report_path(path);
    }

    let result = orchestrator.scheduled_retraining().await;
    print_report(&result, format)
}

fn print_report(report: &RetrainingReport, format: OutputFormat) -> Result<()> {
    if let OutputFormat::Json = format {
        return print_json(report);
    }

    let mut rows = vec![FieldRow::new("Drift", color_stability(report.drift))];
    for reason in &report.reasons {
        rows.push(FieldRow::new("Reason", reason.clone()));
    }
    if let Some(post) = report.post_training {
        rows.push(FieldRow::new("After retraining", color_stability(post)));
    }
    print_rows(rows);

    match (&report.new_version, &report.error) {
        (Some(version), _) => print_success(&format!("Retrained and installed {version}")),
        (None, Some(error)) => print_warning(&format!("Retraining failed: {error}")),
        (None, None) if !report.triggered => print_info("Retraining not needed"),
        (None, None) => {}
    }
    Ok(())
}
