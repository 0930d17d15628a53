//! Model training orchestration
//!
//! Pulls readings from the sensor store, curates them, engineers features,
//! balances classes, fits the classifier and the regressor, and attaches
//! validation metrics to the resulting artifact.

use super::balancer::ImbalanceBalancer;
use super::dataset::{build_samples, class_counts, TrainingSample};
use super::forest::{ForestClassifier, ForestParams, ForestRegressor};
use super::scaler::StandardScaler;
use super::validation::{
    accuracy, kfold, mean_absolute_error, mean_std, select, stratified_folds, stratified_split,
    ConfusionMatrix,
};
use crate::curation::{group_readings, join_weather, DataCurator};
use crate::error::{AdvisorError, Result};
use crate::features::{ColumnManifest, FeatureEngineer};
use crate::models::{RawSensorRecord, WeatherContext};
use crate::observability::AdvisorMetrics;
use crate::sources::{SensorStore, WeatherSource};
use crate::store::{ClassDistribution, CvScore, ModelArtifact, TrainingMetrics};
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Configuration for model training
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerConfig {
    pub forest: ForestParams,
    /// Samples required to attempt a fit
    pub min_samples: usize,
    /// Raw records required from the sensor store
    pub min_collected_samples: usize,
    pub lookback_days: i64,
    pub test_fraction: f64,
    pub max_cv_folds: usize,
    /// Majority/minority ratio above which class weights are used
    pub max_class_ratio: f64,
    pub min_synthetic_samples: usize,
    pub site_lat: f64,
    pub site_lon: f64,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            forest: ForestParams::default(),
            min_samples: 10,
            min_collected_samples: 50,
            lookback_days: 30,
            test_fraction: 0.3,
            max_cv_folds: 5,
            max_class_ratio: 5.0,
            min_synthetic_samples: 10,
            site_lat: -3.763081,
            site_lon: -38.524465,
        }
    }
}

/// Raw material for one training run
#[derive(Debug, Clone, Default)]
pub struct CollectedData {
    pub records: Vec<RawSensorRecord>,
    pub weather: Vec<WeatherContext>,
    pub sensors: usize,
}

/// Scores of an existing artifact on fresh labelled data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationSummary {
    pub samples: usize,
    pub accuracy: f64,
    pub humidity_mae: f64,
    pub confusion: ConfusionMatrix,
}

pub struct ModelTrainer {
    config: TrainerConfig,
    curator: DataCurator,
    engineer: FeatureEngineer,
    metrics: AdvisorMetrics,
}

impl ModelTrainer {
    pub fn new(config: TrainerConfig) -> Self {
        Self {
            config,
            curator: DataCurator::new(),
            engineer: FeatureEngineer::new(),
            metrics: AdvisorMetrics::new(),
        }
    }

    pub fn config(&self) -> &TrainerConfig {
        &self.config
    }

    /// Pull `lookback` worth of readings for every active sensor.
    ///
    /// Weather failures degrade to an empty series; too few records is an
    /// `InsufficientData` error.
    pub async fn collect_training_data(
        &self,
        sensors: &dyn SensorStore,
        weather: &dyn WeatherSource,
        lookback: Duration,
    ) -> Result<CollectedData> {
        let end = Utc::now();
        let start = end - lookback;

        let (records, sensor_count) = self.collect_records(sensors, start, end).await?;
        if records.len() < self.config.min_collected_samples {
            return Err(AdvisorError::InsufficientData {
                found: records.len(),
                required: self.config.min_collected_samples,
            });
        }

        let history = match weather
            .historical_weather(self.config.site_lat, self.config.site_lon, start, end)
            .await
        {
            Ok(points) => points,
            Err(e) => {
                warn!(error = %e, "Weather history unavailable, using defaults");
                Vec::new()
            }
        };

        info!(
            sensors = sensor_count,
            records = records.len(),
            weather_points = history.len(),
            "Training data collected"
        );
        Ok(CollectedData {
            records,
            weather: history,
            sensors: sensor_count,
        })
    }

    /// Grouped raw records of every active sensor in `[start, end]`, plus
    /// the number of sensors queried
    pub async fn collect_records(
        &self,
        sensors: &dyn SensorStore,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<(Vec<RawSensorRecord>, usize)> {
        let sensor_ids = sensors.active_sensors().await?;
        let mut records = Vec::new();
        for sensor_id in &sensor_ids {
            let readings = sensors.readings(sensor_id, start, end).await?;
            let grouped = group_readings(&readings);
            debug!(sensor_id = %sensor_id, readings = readings.len(), records = grouped.len(), "Collected sensor history");
            records.extend(grouped);
        }
        Ok((records, sensor_ids.len()))
    }

    /// Curate, join weather and label raw records.
    ///
    /// Each sensor is its own series: deduplication, rolling windows and
    /// the next-period humidity label never cross sensors. A sensor whose
    /// history curates to nothing is skipped; it is an error only when no
    /// sensor yields samples.
    pub fn prepare(
        &self,
        records: &[RawSensorRecord],
        weather: &[WeatherContext],
    ) -> Result<Vec<TrainingSample>> {
        let mut by_sensor: BTreeMap<Option<&str>, Vec<RawSensorRecord>> = BTreeMap::new();
        for record in records {
            by_sensor
                .entry(record.sensor_id.as_deref())
                .or_default()
                .push(record.clone());
        }

        let mut samples = Vec::with_capacity(records.len());
        let mut last_failure = None;
        for (sensor_id, rows) in &by_sensor {
            match self.curator.curate(rows) {
                Ok(table) => {
                    let joined = join_weather(&table.observations, weather);
                    samples.extend(build_samples(&self.engineer, &joined));
                }
                Err(AdvisorError::CurationFailure(reason)) => {
                    warn!(sensor_id = sensor_id.unwrap_or("unknown"), %reason, "Skipping unusable sensor history");
                    last_failure = Some(AdvisorError::CurationFailure(reason));
                }
                Err(e) => return Err(e),
            }
        }

        if samples.is_empty() {
            return Err(last_failure
                .unwrap_or_else(|| AdvisorError::CurationFailure("no sensor records".to_string())));
        }
        debug!(sensors = by_sensor.len(), samples = samples.len(), "Training samples prepared");
        Ok(samples)
    }

    /// Curate and fit in one go
    pub fn train(
        &self,
        records: &[RawSensorRecord],
        weather: &[WeatherContext],
    ) -> Result<ModelArtifact> {
        let samples = self.prepare(records, weather)?;
        self.fit(samples)
    }

    /// Fit a new artifact from labelled samples
    pub fn fit(&self, samples: Vec<TrainingSample>) -> Result<ModelArtifact> {
        if samples.len() < self.config.min_samples {
            return Err(AdvisorError::InsufficientData {
                found: samples.len(),
                required: self.config.min_samples,
            });
        }
        let started = Instant::now();
        let params = &self.config.forest;

        let balanced = ImbalanceBalancer::new(
            self.config.max_class_ratio,
            self.config.min_synthetic_samples,
            params.seed,
        )
        .balance(samples)?;
        let samples = balanced.samples;
        let (negative, positive) = class_counts(&samples);

        let manifest = ColumnManifest::from_vector(&samples[0].features);
        let raw: Vec<Vec<f64>> = samples
            .iter()
            .map(|s| manifest.reindex(&s.features))
            .collect();
        let scaler = StandardScaler::fit(&raw)?;
        let x = scaler.transform_all(&raw)?;
        let labels: Vec<bool> = samples.iter().map(|s| s.irrigation).collect();
        let humidity: Vec<f64> = samples.iter().map(|s| s.humidity).collect();
        let weights = balanced.sample_weights;

        let mut rng = StdRng::seed_from_u64(params.seed);
        let split = stratified_split(&labels, self.config.test_fraction, &mut rng);
        let x_train = select(&x, &split.train);
        let train_weights = weights.as_ref().map(|w| select(w, &split.train));

        let classifier = ForestClassifier::fit(
            &x_train,
            &select(&labels, &split.train),
            train_weights.as_deref(),
            params,
        )?;
        let regressor = ForestRegressor::fit(&x_train, &select(&humidity, &split.train), params)?;

        let x_test = select(&x, &split.test);
        let predicted = x_test
            .iter()
            .map(|row| classifier.predict(row))
            .collect::<Result<Vec<bool>>>()?;
        let forecast = x_test
            .iter()
            .map(|row| regressor.predict(row))
            .collect::<Result<Vec<f64>>>()?;
        let holdout_accuracy = accuracy(&predicted, &select(&labels, &split.test));
        let holdout_mae = mean_absolute_error(&forecast, &select(&humidity, &split.test));

        let mut predicted_classes = predicted;
        predicted_classes.sort_unstable();
        predicted_classes.dedup();
        if predicted_classes.len() < 2 {
            warn!(classes = ?predicted_classes, "Classifier predicted a single class on the validation split");
        }

        let k = self.config.max_cv_folds.min(negative.min(positive));
        let cv_accuracy = if k >= 2 {
            Some(self.cross_validate_classifier(&x, &labels, weights.as_deref(), k, &mut rng)?)
        } else {
            debug!(k, "Minority class too small for cross-validation");
            None
        };
        let reg_k = self.config.max_cv_folds.min(samples.len());
        let cv_humidity_mae = if reg_k >= 2 {
            Some(self.cross_validate_regressor(&x, &humidity, reg_k, &mut rng)?)
        } else {
            None
        };

        let importances = |values: &[f64]| -> BTreeMap<String, f64> {
            manifest
                .columns()
                .iter()
                .cloned()
                .zip(values.iter().copied())
                .collect()
        };
        let metrics = TrainingMetrics {
            accuracy: holdout_accuracy,
            humidity_mae: holdout_mae,
            cv_accuracy,
            cv_humidity_mae,
            training_samples: samples.len(),
            class_distribution: ClassDistribution {
                irrigate: positive,
                no_irrigate: negative,
            },
            predicted_classes,
            balancing: balanced.strategy,
            importance_irrigation: importances(classifier.feature_importances()),
            importance_humidity: importances(regressor.feature_importances()),
        };

        let trained_at = Utc::now();
        let duration = started.elapsed().as_secs_f64();
        self.metrics.observe_training_duration(duration);
        info!(
            samples = samples.len(),
            irrigate = positive,
            no_irrigate = negative,
            accuracy = holdout_accuracy,
            humidity_mae = holdout_mae,
            duration_secs = duration,
            "Models trained"
        );

        Ok(ModelArtifact {
            version: ModelArtifact::version_for(trained_at),
            trained_at,
            classifier,
            regressor,
            scaler,
            manifest,
            metrics,
        })
    }

    fn cross_validate_classifier(
        &self,
        x: &[Vec<f64>],
        labels: &[bool],
        weights: Option<&[f64]>,
        k: usize,
        rng: &mut StdRng,
    ) -> Result<CvScore> {
        let mut scores = Vec::with_capacity(k);
        for fold in stratified_folds(labels, k, rng) {
            let fold_weights = weights.map(|w| select(w, &fold.train));
            let model = ForestClassifier::fit(
                &select(x, &fold.train),
                &select(labels, &fold.train),
                fold_weights.as_deref(),
                &self.config.forest,
            )?;
            let predicted = fold
                .test
                .iter()
                .map(|&i| model.predict(&x[i]))
                .collect::<Result<Vec<bool>>>()?;
            scores.push(accuracy(&predicted, &select(labels, &fold.test)));
        }
        let (mean, std) = mean_std(&scores);
        Ok(CvScore {
            mean,
            std,
            folds: k,
        })
    }

    fn cross_validate_regressor(
        &self,
        x: &[Vec<f64>],
        targets: &[f64],
        k: usize,
        rng: &mut StdRng,
    ) -> Result<CvScore> {
        let mut scores = Vec::with_capacity(k);
        for fold in kfold(x.len(), k, rng) {
            let model = ForestRegressor::fit(
                &select(x, &fold.train),
                &select(targets, &fold.train),
                &self.config.forest,
            )?;
            let forecast = fold
                .test
                .iter()
                .map(|&i| model.predict(&x[i]))
                .collect::<Result<Vec<f64>>>()?;
            scores.push(mean_absolute_error(&forecast, &select(targets, &fold.test)));
        }
        let (mean, std) = mean_std(&scores);
        Ok(CvScore {
            mean,
            std,
            folds: k,
        })
    }

    /// Re-score an existing artifact against fresh labelled samples
    pub fn evaluate_existing(
        &self,
        artifact: &ModelArtifact,
        samples: &[TrainingSample],
    ) -> Result<EvaluationSummary> {
        if samples.is_empty() {
            return Err(AdvisorError::InsufficientData {
                found: 0,
                required: 1,
            });
        }
        let mut pairs = Vec::with_capacity(samples.len());
        let mut forecast = Vec::with_capacity(samples.len());
        for sample in samples {
            let row = artifact.prepare_row(&sample.features)?;
            pairs.push((artifact.classifier.predict(&row)?, sample.irrigation));
            forecast.push(artifact.regressor.predict(&row)?);
        }
        let confusion = ConfusionMatrix::from_pairs(pairs);
        let actual: Vec<f64> = samples.iter().map(|s| s.humidity).collect();

        Ok(EvaluationSummary {
            samples: samples.len(),
            accuracy: confusion.accuracy(),
            humidity_mae: mean_absolute_error(&forecast, &actual),
            confusion,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{InMemorySensorStore, NoWeather, SensorReading, WeatherSource};
    use async_trait::async_trait;

    const HOUR_MS: i64 = 3_600_000;

    fn raw(i: usize, moisture: f64, irrigation: bool) -> RawSensorRecord {
        RawSensorRecord {
            sensor_id: None,
            timestamp: Some(1_700_000_000_000 + i as i64 * HOUR_MS),
            moisture: Some(moisture),
            ph: Some(6.5),
            phosphorus: Some(1.0),
            potassium: Some(1.0),
            irrigation: Some(if irrigation { 1.0 } else { 0.0 }),
        }
    }

    fn labelled_history(n: usize) -> Vec<RawSensorRecord> {
        (0..n)
            .map(|i| {
                let moisture = 10.0 + (i * 37 % 80) as f64;
                raw(i, moisture, moisture < 35.0)
            })
            .collect()
    }

    #[test]
    fn test_fewer_than_ten_samples_rejected() {
        let trainer = ModelTrainer::new(TrainerConfig::default());
        let samples = trainer.prepare(&labelled_history(9), &[]).unwrap();
        match trainer.fit(samples) {
            Err(AdvisorError::InsufficientData { found, required }) => {
                assert_eq!(found, 9);
                assert_eq!(required, 10);
            }
            other => panic!("expected InsufficientData, got {other:?}"),
        }
    }

    #[test]
    fn test_train_produces_complete_artifact() {
        let trainer = ModelTrainer::new(TrainerConfig::default());
        let artifact = trainer.train(&labelled_history(120), &[]).unwrap();

        assert_eq!(artifact.manifest.len(), 23);
        assert_eq!(artifact.scaler.width(), 23);
        assert_eq!(artifact.classifier.n_members(), 50);
        assert_eq!(artifact.metrics.training_samples, 120);
        assert!(artifact.metrics.accuracy > 0.8);
        assert!(artifact.metrics.cv_accuracy.is_some());
        assert!(artifact.metrics.cv_humidity_mae.is_some());
        assert_eq!(artifact.metrics.importance_irrigation.len(), 23);
    }

    #[test]
    fn test_single_class_history_still_trains() {
        let trainer = ModelTrainer::new(TrainerConfig::default());
        let records: Vec<RawSensorRecord> = (0..30).map(|i| raw(i, 60.0, false)).collect();
        let artifact = trainer.train(&records, &[]).unwrap();
        assert!(artifact.metrics.class_distribution.irrigate >= 10);
        assert!(matches!(
            artifact.metrics.balancing,
            crate::training::BalanceStrategy::Synthesized { .. }
        ));
    }

    #[test]
    fn test_evaluate_existing_scores_fresh_data() {
        let trainer = ModelTrainer::new(TrainerConfig::default());
        let artifact = trainer.train(&labelled_history(120), &[]).unwrap();
        let samples = trainer.prepare(&labelled_history(40), &[]).unwrap();
        let summary = trainer.evaluate_existing(&artifact, &samples).unwrap();
        assert_eq!(summary.samples, 40);
        assert_eq!(summary.confusion.total(), 40);
        assert!(summary.accuracy >= 0.8);
    }

    #[tokio::test]
    async fn test_collect_requires_minimum_records() {
        let now = Utc::now().timestamp_millis();
        let readings: Vec<SensorReading> = (0..10)
            .map(|i| SensorReading {
                sensor_id: "s1".to_string(),
                timestamp_ms: now - i * HOUR_MS,
                value: "40".to_string(),
                unit: "%".to_string(),
            })
            .collect();
        let store = InMemorySensorStore::new(readings);
        let trainer = ModelTrainer::new(TrainerConfig::default());
        let result = trainer
            .collect_training_data(&store, &NoWeather, Duration::days(30))
            .await;
        assert!(matches!(
            result,
            Err(AdvisorError::InsufficientData { found: 10, required: 50 })
        ));
    }

    fn field_readings(sensor: &str, start_ms: i64, hours: i64, moisture: f64, irrigated: bool) -> Vec<SensorReading> {
        let reading = |ts: i64, value: &str, unit: &str| SensorReading {
            sensor_id: sensor.to_string(),
            timestamp_ms: ts,
            value: value.to_string(),
            unit: unit.to_string(),
        };
        (0..hours)
            .flat_map(|i| {
                let ts = start_ms + i * HOUR_MS;
                vec![
                    reading(ts, &format!("{}", moisture + (i % 3) as f64), "%"),
                    reading(ts, "6.5", "pH"),
                    reading(ts, if irrigated { "1" } else { "0" }, "irrigation"),
                ]
            })
            .collect()
    }

    #[tokio::test]
    async fn test_sensors_sharing_timestamps_are_kept_apart() {
        let start = Utc::now().timestamp_millis() - 40 * HOUR_MS;
        let mut readings = field_readings("field-a", start, 30, 12.0, true);
        readings.extend(field_readings("field-b", start, 30, 80.0, false));
        let store = InMemorySensorStore::new(readings);
        let trainer = ModelTrainer::new(TrainerConfig::default());

        let data = trainer
            .collect_training_data(&store, &NoWeather, Duration::days(30))
            .await
            .unwrap();
        assert_eq!(data.sensors, 2);
        assert_eq!(data.records.len(), 60);

        let samples = trainer.prepare(&data.records, &data.weather).unwrap();
        assert_eq!(samples.len(), 60);
        assert_eq!(class_counts(&samples), (30, 30));

        // Labels and rolling windows stay within one field
        for s in &samples {
            let moisture = s.features.get("moisture").unwrap();
            let trend = s.features.get("moisture_trend").unwrap();
            if s.irrigation {
                assert!(moisture < 20.0 && trend < 20.0 && s.humidity < 20.0);
            } else {
                assert!(moisture >= 80.0 && trend >= 80.0 && s.humidity >= 80.0);
            }
        }
    }

    #[test]
    fn test_unusable_sensor_skipped_when_others_remain() {
        let trainer = ModelTrainer::new(TrainerConfig::default());
        let mut records = labelled_history(20);
        records.push(RawSensorRecord {
            sensor_id: Some("broken".to_string()),
            timestamp: Some(1),
            moisture: Some(250.0),
            ph: Some(6.5),
            ..Default::default()
        });
        assert_eq!(trainer.prepare(&records, &[]).unwrap().len(), 20);

        let only_broken = &records[20..];
        assert!(matches!(
            trainer.prepare(only_broken, &[]),
            Err(AdvisorError::CurationFailure(_))
        ));
    }

    struct UnreachableWeather;

    #[async_trait]
    impl WeatherSource for UnreachableWeather {
        async fn current_weather(&self, _lat: f64, _lon: f64) -> Result<Option<WeatherContext>> {
            Err(AdvisorError::Source("weather service unreachable".to_string()))
        }

        async fn historical_weather(
            &self,
            _lat: f64,
            _lon: f64,
            _start: DateTime<Utc>,
            _end: DateTime<Utc>,
        ) -> Result<Vec<WeatherContext>> {
            Err(AdvisorError::Source("weather service unreachable".to_string()))
        }
    }

    #[tokio::test]
    async fn test_failed_weather_falls_back_to_defaults() {
        let start = Utc::now().timestamp_millis() - 80 * HOUR_MS;
        let mut readings = field_readings("field-a", start, 30, 12.0, true);
        readings.extend(field_readings("field-b", start, 30, 80.0, false));
        let store = InMemorySensorStore::new(readings);
        let trainer = ModelTrainer::new(TrainerConfig::default());

        let data = trainer
            .collect_training_data(&store, &UnreachableWeather, Duration::days(30))
            .await
            .unwrap();
        assert!(data.weather.is_empty());

        let samples = trainer.prepare(&data.records, &data.weather).unwrap();
        let defaults = WeatherContext::fallback(0);
        for s in &samples {
            assert_eq!(s.features.get("temperature"), Some(defaults.temperature));
            assert_eq!(s.features.get("air_humidity"), Some(defaults.air_humidity));
            assert_eq!(s.features.get("pressure"), Some(defaults.pressure));
        }
        assert!(trainer.fit(samples).is_ok());
    }
}
