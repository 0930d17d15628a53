//! Model training, inspection and rollback commands

use anyhow::{Context, Result};
use advisor_lib::sources::JsonSensorStore;
use advisor_lib::store::{ModelArtifact, ModelStore, StoredVersion};
use advisor_lib::training::{BalanceStrategy, ModelTrainer, TrainerConfig};
use serde::Serialize;
use std::path::Path;
use tabled::Tabled;

use super::weather_source;
use crate::output::{
    color_confidence, format_percent, print_info, print_json, print_rows, print_success,
    print_warning, FieldRow, OutputFormat,
};

/// Number of feature importances shown by `status`
const TOP_FEATURES: usize = 5;

/// Row for the stored versions table
#[derive(Tabled)]
struct VersionRow {
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Trained")]
    trained_at: String,
    #[tabled(rename = "Accuracy")]
    accuracy: String,
    #[tabled(rename = "Humidity MAE")]
    humidity_mae: String,
    #[tabled(rename = "Current")]
    current: String,
}

impl From<&StoredVersion> for VersionRow {
    fn from(v: &StoredVersion) -> Self {
        Self {
            version: v.version.clone(),
            trained_at: v.trained_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            accuracy: format_percent(v.accuracy),
            humidity_mae: format!("{:.2}", v.humidity_mae),
            current: if v.current { "*".to_string() } else { String::new() },
        }
    }
}

fn balancing_label(strategy: &BalanceStrategy) -> String {
    match strategy {
        BalanceStrategy::None => "none".to_string(),
        BalanceStrategy::Synthesized { added } => format!("synthesized {added} samples"),
        BalanceStrategy::ClassWeighted { ratio } => format!("class weights (ratio {ratio:.1})"),
    }
}

fn summary_rows(artifact: &ModelArtifact) -> Vec<FieldRow> {
    let m = &artifact.metrics;
    let mut rows = vec![
        FieldRow::new("Version", artifact.version.clone()),
        FieldRow::new(
            "Trained at",
            artifact.trained_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        ),
        FieldRow::new("Samples", m.training_samples.to_string()),
        FieldRow::new(
            "Classes",
            format!(
                "irrigate {} / no irrigation {}",
                m.class_distribution.irrigate, m.class_distribution.no_irrigate
            ),
        ),
        FieldRow::new("Balancing", balancing_label(&m.balancing)),
        FieldRow::new("Accuracy", color_confidence(m.accuracy)),
        FieldRow::new("Humidity MAE", format!("{:.2}", m.humidity_mae)),
    ];
    if let Some(cv) = &m.cv_accuracy {
        rows.push(FieldRow::new(
            "CV accuracy",
            format!("{:.3} ± {:.3} ({} folds)", cv.mean, cv.std, cv.folds),
        ));
    }
    if let Some(cv) = &m.cv_humidity_mae {
        rows.push(FieldRow::new(
            "CV humidity MAE",
            format!("{:.2} ± {:.2} ({} folds)", cv.mean, cv.std, cv.folds),
        ));
    }
    rows
}

/// Train a model from a readings file and store it
pub async fn train(
    model_dir: &Path,
    readings: &Path,
    weather: Option<&Path>,
    lookback_days: i64,
    min_samples: usize,
    format: OutputFormat,
) -> Result<()> {
    let sensors = JsonSensorStore::open(readings)
        .await
        .with_context(|| format!("Failed to open readings {}", readings.display()))?;
    let weather = weather_source(weather)?;

    let trainer = ModelTrainer::new(TrainerConfig {
        lookback_days,
        min_collected_samples: min_samples,
        ..TrainerConfig::default()
    });
    let data = trainer
        .collect_training_data(&sensors, weather.as_ref(), chrono::Duration::days(lookback_days))
        .await?;

    let artifact =
        tokio::task::spawn_blocking(move || trainer.train(&data.records, &data.weather))
            .await
            .context("Training task failed")??;

    let store = ModelStore::open(model_dir);
    let path = store.save(&artifact)?;

    match format {
        OutputFormat::Json => print_json(&TrainOutput {
            version: &artifact.version,
            path: path.display().to_string(),
            metrics: &artifact.metrics,
        })?,
        OutputFormat::Table => {
            print_success(&format!("Trained model {}", artifact.version));
            print_rows(summary_rows(&artifact));
            print_info(&format!("Saved to {}", path.display()));
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct TrainOutput<'a> {
    version: &'a str,
    path: String,
    metrics: &'a advisor_lib::store::TrainingMetrics,
}

/// Show the current model and the stored versions
pub fn status(model_dir: &Path, format: OutputFormat) -> Result<()> {
    let store = ModelStore::open(model_dir);
    let Some(artifact) = store.load()? else {
        match format {
            OutputFormat::Json => print_json(&serde_json::json!({ "trained": false }))?,
            OutputFormat::Table => print_warning("No trained model found"),
        }
        return Ok(());
    };
    let versions = store.list()?;

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "trained": true,
            "version": artifact.version,
            "trained_at": artifact.trained_at,
            "metrics": artifact.metrics,
            "top_features": artifact.metrics.top_irrigation_features(TOP_FEATURES),
            "versions": versions,
        }))?,
        OutputFormat::Table => {
            print_rows(summary_rows(&artifact));

            let features: Vec<FieldRow> = artifact
                .metrics
                .top_irrigation_features(TOP_FEATURES)
                .into_iter()
                .map(|(name, importance)| FieldRow::new(name, format!("{importance:.3}")))
                .collect();
            if !features.is_empty() {
                println!("\nTop irrigation features:");
                print_rows(features);
            }

            println!("\nStored versions:");
            print_rows(versions.iter().map(VersionRow::from).collect());
        }
    }
    Ok(())
}

/// Point the store back at the previous version
pub fn rollback(model_dir: &Path, format: OutputFormat) -> Result<()> {
    let store = ModelStore::open(model_dir);
    let restored = store.rollback()?;

    match format {
        OutputFormat::Json => print_json(&serde_json::json!({ "current": restored }))?,
        OutputFormat::Table => match &restored {
            Some(version) => print_success(&format!("Rolled back to {version}")),
            None => print_warning("No previous version to roll back to"),
        },
    }
    Ok(())
}
