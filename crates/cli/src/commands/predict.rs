//! Prediction command

use anyhow::{Context, Result};
use advisor_lib::predictor::{PredictionConfig, PredictionService};
use advisor_lib::sources::{JsonPredictionLog, PredictionLog};
use advisor_lib::store::{ArtifactHandle, ModelStore};
use advisor_lib::{ForecastPoint, Prediction, SensorObservation, WeatherContext};
use serde::Deserialize;
use std::path::Path;
use tabled::Tabled;

use super::read_json;
use crate::output::{
    color_confidence, color_decision, print_error, print_json, print_rows, print_warning,
    FieldRow, OutputFormat,
};

/// An observation file holds one observation or a list of them
#[derive(Deserialize)]
#[serde(untagged)]
enum ObservationInput {
    One(SensorObservation),
    Many(Vec<SensorObservation>),
}

/// Where served predictions are recorded for later drift evaluation
pub struct LogTarget<'a> {
    pub path: &'a Path,
    pub sensor_id: &'a str,
}

/// Row for batch prediction output
#[derive(Tabled)]
struct PredictionRow {
    #[tabled(rename = "Moisture")]
    moisture: String,
    #[tabled(rename = "Decision")]
    decision: String,
    #[tabled(rename = "Probability")]
    probability: String,
    #[tabled(rename = "Confidence")]
    confidence: String,
    #[tabled(rename = "Forecast humidity")]
    predicted_humidity: String,
    #[tabled(rename = "Error")]
    error: String,
}

impl From<&Prediction> for PredictionRow {
    fn from(p: &Prediction) -> Self {
        Self {
            moisture: format!("{:.1}", p.current_humidity),
            decision: color_decision(p.irrigation_needed),
            probability: format!("{:.3}", p.irrigation_probability),
            confidence: color_confidence(p.confidence),
            predicted_humidity: format!("{:.1}", p.predicted_humidity),
            error: p.error.clone().unwrap_or_default(),
        }
    }
}

fn detail_rows(p: &Prediction) -> Vec<FieldRow> {
    let ci = &p.confidence_interval;
    let mut rows = vec![
        FieldRow::new("Decision", color_decision(p.irrigation_needed)),
        FieldRow::new("Probability", format!("{:.3}", p.irrigation_probability)),
        FieldRow::new("Confidence", color_confidence(p.confidence)),
        FieldRow::new(
            "95% interval",
            format!("[{:.3}, {:.3}] (std {:.3})", ci.lower, ci.upper, ci.std_dev),
        ),
        FieldRow::new("Current humidity", format!("{:.1}%", p.current_humidity)),
        FieldRow::new(
            "Forecast humidity",
            format!("{:.1}% in {}h", p.predicted_humidity, p.horizon_hours),
        ),
    ];
    if let Some(trend) = &p.trend {
        rows.push(FieldRow::new(
            "Soil state",
            format!(
                "moisture {:?}, pH {:?}, nutrients {:?}",
                trend.humidity_status, trend.ph_status, trend.nutrient_status
            )
            .to_lowercase(),
        ));
    }
    if let Some(version) = &p.model_version {
        rows.push(FieldRow::new("Model", version.clone()));
    }
    rows
}

/// Predict irrigation need for the observations in a file
pub async fn predict(
    model_dir: &Path,
    observation: &Path,
    weather: Option<&Path>,
    forecast: Option<&Path>,
    horizon: u32,
    log: Option<LogTarget<'_>>,
    format: OutputFormat,
) -> Result<()> {
    let input: ObservationInput = read_json(observation)?;
    let current_weather: Option<WeatherContext> = weather.map(read_json).transpose()?;
    let forecast: Vec<ForecastPoint> = forecast.map(read_json).transpose()?.unwrap_or_default();

    let handle = ArtifactHandle::new();
    if let Some(artifact) = ModelStore::open(model_dir)
        .load()
        .context("Failed to load stored model")?
    {
        handle.install(artifact);
    }
    let service = PredictionService::new(
        handle,
        PredictionConfig {
            horizon_hours: horizon,
            ..PredictionConfig::default()
        },
    );

    let predictions = match input {
        ObservationInput::One(obs) => {
            vec![service.predict_with_weather(&obs, current_weather, &forecast)]
        }
        ObservationInput::Many(observations) => {
            if current_weather.is_some() || !forecast.is_empty() {
                print_warning("Weather and forecast apply to single observations only");
            }
            service.predict_batch(&observations, horizon)
        }
    };

    if let Some(target) = log {
        let log = JsonPredictionLog::new(target.path);
        for prediction in predictions.iter().filter(|p| !p.is_degraded()) {
            log.record(target.sensor_id, prediction).await?;
        }
    }

    match format {
        OutputFormat::Json => match predictions.as_slice() {
            [single] => print_json(single)?,
            many => print_json(many)?,
        },
        OutputFormat::Table => match predictions.as_slice() {
            [single] => {
                if let Some(error) = &single.error {
                    print_error(error);
                    return Ok(());
                }
                print_rows(detail_rows(single));
                if !single.recommendations.is_empty() {
                    println!("\nRecommendations:");
                    for (i, rec) in single.recommendations.iter().enumerate() {
                        println!("  {}. {}", i + 1, rec);
                    }
                }
            }
            many => print_rows(many.iter().map(PredictionRow::from).collect()),
        },
    }
    Ok(())
}
