//! End-to-end tests of the model lifecycle: curate, train, store, serve,
//! monitor.

use advisor_lib::curation::{join_weather, DataCurator};
use advisor_lib::drift::{DriftMonitor, Stability};
use advisor_lib::features::{ColumnManifest, FeatureEngineer};
use advisor_lib::predictor::{PredictionConfig, PredictionService, REC_RAIN_POSTPONE};
use advisor_lib::sources::{InMemoryPredictionLog, PredictionLog};
use advisor_lib::store::{ArtifactHandle, ModelArtifact, ModelStore};
use advisor_lib::training::{class_counts, ImbalanceBalancer, ModelTrainer, TrainerConfig};
use advisor_lib::{
    AdvisorError, CuratedRecord, ForecastPoint, LoggedPrediction, RawSensorRecord,
    SensorObservation, WeatherContext,
};
use std::sync::OnceLock;
use tempfile::TempDir;

const START_MS: i64 = 1_700_000_000_000;
const HOUR_MS: i64 = 3_600_000;

fn raw(i: usize, moisture: f64, ph: f64, irrigation: bool) -> RawSensorRecord {
    RawSensorRecord {
        sensor_id: None,
        timestamp: Some(START_MS + i as i64 * HOUR_MS),
        moisture: Some(moisture),
        ph: Some(ph),
        phosphorus: Some(1.0),
        potassium: Some(1.0),
        irrigation: Some(if irrigation { 1.0 } else { 0.0 }),
    }
}

/// Low moisture with ideal pH is irrigated, everything else is not
fn field_history(n: usize) -> Vec<RawSensorRecord> {
    (0..n)
        .map(|i| {
            let moisture = 10.0 + (i * 37 % 80) as f64;
            raw(i, moisture, 6.8, moisture < 35.0)
        })
        .collect()
}

fn weather_history(n: usize) -> Vec<WeatherContext> {
    (0..n)
        .map(|i| WeatherContext {
            timestamp_ms: START_MS + i as i64 * HOUR_MS + 60_000,
            temperature: 22.0 + (i % 10) as f64,
            air_humidity: 65.0,
            precipitation: 0.0,
            wind_speed: 2.0,
            pressure: 1012.0,
        })
        .collect()
}

fn trained() -> ModelArtifact {
    static ARTIFACT: OnceLock<ModelArtifact> = OnceLock::new();
    ARTIFACT
        .get_or_init(|| {
            ModelTrainer::new(TrainerConfig::default())
                .train(&field_history(150), &weather_history(150))
                .expect("training succeeds")
        })
        .clone()
}

fn service(artifact: ModelArtifact) -> PredictionService {
    PredictionService::new(
        ArtifactHandle::with_artifact(artifact),
        PredictionConfig {
            local_hour: Some(7),
            ..Default::default()
        },
    )
}

fn observation(moisture: f64, ph: f64) -> SensorObservation {
    SensorObservation {
        timestamp_ms: START_MS + 200 * HOUR_MS,
        moisture,
        ph,
        phosphorus: true,
        potassium: true,
        irrigation: false,
    }
}

#[test]
fn test_dry_soil_with_ideal_ph_is_irrigated() {
    let p = service(trained()).predict(&observation(15.0, 6.8), 4);
    assert!(p.error.is_none(), "{:?}", p.error);
    assert!(p.irrigation_needed);
}

#[test]
fn test_wet_soil_is_not_irrigated() {
    let p = service(trained()).predict(&observation(75.0, 6.8), 4);
    assert!(p.error.is_none());
    assert!(!p.irrigation_needed);
}

#[test]
fn test_rain_forecast_overrides_irrigation() {
    let svc = service(trained());
    let obs = observation(15.0, 6.8);
    let base = svc.predict_with_weather(&obs, None, &[]);
    assert!(base.irrigation_needed);

    let forecast = [
        ForecastPoint {
            timestamp_ms: None,
            temperature: 24.0,
            precipitation: 0.5,
        },
        ForecastPoint {
            timestamp_ms: None,
            temperature: 23.0,
            precipitation: 4.0,
        },
    ];
    let p = svc.predict_with_weather(&obs, None, &forecast);
    assert!(!p.irrigation_needed);
    assert!((p.irrigation_probability - base.irrigation_probability * 0.3).abs() < 1e-9);
    assert_eq!(p.recommendations[0], REC_RAIN_POSTPONE);
}

#[test]
fn test_drift_detected_at_sixty_percent_accuracy() {
    let entries: Vec<LoggedPrediction> = (0..100)
        .map(|i| {
            let actual = i % 3 == 0;
            let predicted = if i < 60 { actual } else { !actual };
            LoggedPrediction {
                id: i,
                sensor_id: "field-1".to_string(),
                predicted_at: START_MS,
                irrigation_needed: predicted,
                irrigation_probability: if predicted { 0.7 } else { 0.3 },
                confidence: 0.7,
                actual_irrigation: Some(actual),
            }
        })
        .collect();

    let outcome = DriftMonitor::default().evaluate_entries(&entries, 7);
    let eval = outcome.evaluation().expect("evaluated");
    assert!((eval.accuracy - 0.60).abs() < 1e-12);
    assert!(eval.drift_detected);
    assert!(eval.reasons.iter().any(|r| r.contains("accuracy")));
}

#[test]
fn test_too_few_rows_rejected_before_fitting() {
    let trainer = ModelTrainer::new(TrainerConfig::default());
    match trainer.train(&field_history(9), &[]) {
        Err(AdvisorError::InsufficientData { found: 9, required: 10 }) => {}
        other => panic!("expected InsufficientData, got {other:?}"),
    }
}

#[test]
fn test_curated_values_always_in_range() {
    let mut records = field_history(30);
    records.push(raw(40, 130.0, 6.5, false));
    records.push(raw(41, -2.0, 6.5, false));
    records.push(raw(42, 40.0, 14.5, false));
    records.push(raw(43, 40.0, -0.1, true));
    records.push(RawSensorRecord {
        moisture: None,
        ..raw(44, 0.0, 6.5, false)
    });

    let table = DataCurator::new().curate(&records).unwrap();
    assert_eq!(table.observations.len(), 30);
    for o in &table.observations {
        assert!((0.0..=100.0).contains(&o.moisture));
        assert!((0.0..=14.0).contains(&o.ph));
    }
}

#[test]
fn test_manifest_reindex_is_identical_for_train_and_inference() {
    let engineer = FeatureEngineer::new();
    let table = DataCurator::new().curate(&field_history(20)).unwrap();
    let joined = join_weather(&table.observations, &weather_history(20));
    let manifest = ColumnManifest::standard();

    let record: CuratedRecord = joined[0];
    let train_time = engineer.engineer(&joined[..1]).remove(0);
    let inference_time = engineer.engineer_one(&record);
    assert_eq!(manifest.reindex(&train_time), manifest.reindex(&inference_time));

    let artifact = trained();
    assert_eq!(
        artifact.prepare_row(&train_time).unwrap(),
        artifact.prepare_row(&inference_time).unwrap()
    );

    // Mid-series the column layout still matches; only windowed columns
    // differ, since a lone inference record has no history
    let series = engineer.engineer(&joined);
    let windowed = [
        "moisture_trend",
        "ph_trend",
        "moisture_variation",
        "temperature_trend",
        "accumulated_precipitation",
    ];
    let i = 10;
    let train_time = &series[i];
    let inference_time = engineer.engineer_one(&joined[i]);
    assert!(train_time.names().eq(inference_time.names()));

    let train_row = manifest.reindex(train_time);
    let inference_row = manifest.reindex(&inference_time);
    assert_eq!(train_row.len(), manifest.len());
    assert_eq!(inference_row.len(), manifest.len());
    for (column, (a, b)) in manifest.columns().iter().zip(train_row.iter().zip(&inference_row)) {
        if !windowed.contains(&column.as_str()) {
            assert_eq!(a, b, "column {column}");
        }
    }

    let moisture = joined[i].observation.moisture;
    assert_eq!(inference_time.get("moisture_trend"), Some(moisture));
    assert_eq!(inference_time.get("moisture_variation"), Some(0.0));
    let expected_trend = joined[i - 2..=i]
        .iter()
        .map(|r| r.observation.moisture)
        .sum::<f64>()
        / 3.0;
    let trend = train_time.get("moisture_trend").unwrap();
    assert!((trend - expected_trend).abs() < 1e-9);
    assert_ne!(trend, moisture);
}

#[test]
fn test_single_class_sets_are_balanced() {
    let trainer = ModelTrainer::new(TrainerConfig::default());
    let balancer = ImbalanceBalancer::default();

    for n in [10, 24, 75] {
        for irrigated in [false, true] {
            let records: Vec<_> = (0..n)
                .map(|i| raw(i, 20.0 + (i % 40) as f64, 6.5, irrigated))
                .collect();
            let samples = trainer.prepare(&records, &[]).unwrap();
            let outcome = balancer.balance(samples).unwrap();
            let (negative, positive) = class_counts(&outcome.samples);
            assert!(negative.min(positive) >= 10, "n={n} irrigated={irrigated}");
        }
    }
}

#[test]
fn test_confidence_interval_bounds() {
    let svc = service(trained());
    for moisture in [0.0, 12.5, 30.0, 34.9, 35.0, 50.0, 69.0, 88.0, 100.0] {
        for ph in [4.5, 6.8, 8.2] {
            let p = svc.predict(&observation(moisture, ph), 4);
            let ci = p.confidence_interval;
            assert!(0.0 <= ci.lower && ci.lower <= ci.mean, "{ci:?}");
            assert!(ci.mean <= ci.upper && ci.upper <= 1.0, "{ci:?}");
            assert!((0.5..=1.0).contains(&p.confidence));
        }
    }
}

#[tokio::test]
async fn test_lifecycle_store_serve_and_monitor() {
    let dir = TempDir::new().unwrap();
    let store = ModelStore::open(dir.path());
    assert!(store.load().unwrap().is_none());
    assert!(matches!(store.load_required(), Err(AdvisorError::ModelNotTrained)));

    let artifact = trained();
    store.save(&artifact).unwrap();
    let loaded = store.load().unwrap().expect("stored model");
    assert_eq!(loaded.version, artifact.version);

    let original = service(artifact);
    let reloaded = service(loaded);
    let observations: Vec<_> = [8.0, 22.0, 41.0, 77.0]
        .iter()
        .map(|&m| observation(m, 6.8))
        .collect();
    let a = original.predict_batch(&observations, 4);
    let b = reloaded.predict_batch(&observations, 4);
    for (x, y) in a.iter().zip(&b) {
        assert_eq!(x.irrigation_needed, y.irrigation_needed);
        assert_eq!(x.irrigation_probability, y.irrigation_probability);
        assert_eq!(x.predicted_humidity, y.predicted_humidity);
        assert_eq!(x.confidence_interval, y.confidence_interval);
    }

    // Serve, log, then observe outcomes matching the soil state
    let log = InMemoryPredictionLog::new();
    for (obs, prediction) in observations.iter().zip(&b) {
        let id = log.record("field-1", prediction).await.unwrap();
        log.record_outcome(id, obs.moisture < 35.0).await.unwrap();
    }
    let outcome = DriftMonitor::default().evaluate(&log, 7).await.unwrap();
    assert_eq!(outcome.evaluation().unwrap().sample_count, 4);
    assert_ne!(outcome.stability(), Stability::Unknown);
}
