//! Feature engineering over curated sensor and weather records
//!
//! Produces one `FeatureVector` per record. Rolling features look at the
//! current record and up to two before it (six for accumulated
//! precipitation), so the output never contains gaps or NaNs.

use super::categories::{ph_code, ph_status, NutrientNeed, PeriodOfDay, Season};
use super::vector::{FeatureVector, FEATURE_COLUMNS};
use crate::models::CuratedRecord;
use chrono::{DateTime, Datelike, Timelike, Utc};

/// Window for trend and variation features
pub const TREND_WINDOW: usize = 3;
/// Window for accumulated precipitation
pub const PRECIPITATION_WINDOW: usize = 6;
/// Air temperature (°C) above which heat stress is flagged
pub const HEAT_STRESS_ABOVE: f64 = 30.0;

/// Converts curated records into model features.
///
/// Stateless: the same records always yield the same vectors.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureEngineer;

impl FeatureEngineer {
    pub fn new() -> Self {
        Self
    }

    /// Engineer features for an ordered series of records
    pub fn engineer(&self, records: &[CuratedRecord]) -> Vec<FeatureVector> {
        let moisture: Vec<f64> = records.iter().map(|r| r.observation.moisture).collect();
        let ph: Vec<f64> = records.iter().map(|r| r.observation.ph).collect();
        let temperature: Vec<f64> = records.iter().map(|r| r.weather.temperature).collect();
        let precipitation: Vec<f64> = records.iter().map(|r| r.weather.precipitation).collect();

        records
            .iter()
            .enumerate()
            .map(|(i, record)| {
                let obs = &record.observation;
                let weather = &record.weather;
                let time = DateTime::<Utc>::from_timestamp_millis(obs.timestamp_ms)
                    .unwrap_or_default();
                let ph_status = ph_status(obs.ph);

                let values = [
                    obs.moisture,
                    obs.ph,
                    flag(obs.phosphorus),
                    flag(obs.potassium),
                    weather.temperature,
                    weather.air_humidity,
                    weather.precipitation,
                    weather.wind_speed,
                    weather.pressure,
                    time.hour() as f64,
                    time.weekday().num_days_from_monday() as f64,
                    time.month() as f64,
                    rolling_mean(window(&moisture, i, TREND_WINDOW)),
                    rolling_mean(window(&ph, i, TREND_WINDOW)),
                    sample_std(window(&moisture, i, TREND_WINDOW)),
                    flag(weather.temperature > HEAT_STRESS_ABOVE),
                    rolling_mean(window(&temperature, i, TREND_WINDOW)),
                    flag(weather.precipitation > 0.0),
                    window(&precipitation, i, PRECIPITATION_WINDOW).iter().sum(),
                    PeriodOfDay::from_hour(time.hour()).code(),
                    Season::from_month(time.month()).code(),
                    NutrientNeed::from_flags(obs.phosphorus, obs.potassium).code(),
                    ph_code(ph_status),
                ];

                FeatureVector::from_entries(FEATURE_COLUMNS.iter().copied().zip(values).collect())
            })
            .collect()
    }

    /// Engineer the single-row vector used at inference time
    pub fn engineer_one(&self, record: &CuratedRecord) -> FeatureVector {
        let mut vectors = self.engineer(std::slice::from_ref(record));
        vectors.swap_remove(0)
    }
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

/// Values ending at `index`, at most `size` long
fn window(values: &[f64], index: usize, size: usize) -> &[f64] {
    let start = (index + 1).saturating_sub(size);
    &values[start..=index]
}

fn rolling_mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation; 0 when fewer than two values
fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = rolling_mean(values);
    let sum_sq: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    (sum_sq / (values.len() - 1) as f64).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SensorObservation, WeatherContext};

    // 2024-01-15 08:00:00 UTC, a Monday
    const MONDAY_8AM: i64 = 1_705_305_600_000;
    const HOUR_MS: i64 = 3_600_000;

    fn record(offset_hours: i64, moisture: f64, ph: f64, precipitation: f64) -> CuratedRecord {
        let ts = MONDAY_8AM + offset_hours * HOUR_MS;
        CuratedRecord {
            observation: SensorObservation {
                timestamp_ms: ts,
                moisture,
                ph,
                phosphorus: true,
                potassium: false,
                irrigation: false,
            },
            weather: WeatherContext {
                precipitation,
                ..WeatherContext::fallback(ts)
            },
        }
    }

    #[test]
    fn test_columns_in_stable_order() {
        let vectors = FeatureEngineer::new().engineer(&[record(0, 40.0, 6.5, 0.0)]);
        let names: Vec<&str> = vectors[0].names().collect();
        assert_eq!(names, FEATURE_COLUMNS.to_vec());
    }

    #[test]
    fn test_temporal_fields_from_utc() {
        let v = FeatureEngineer::new().engineer_one(&record(0, 40.0, 6.5, 0.0));
        assert_eq!(v.get("hour_of_day"), Some(8.0));
        assert_eq!(v.get("day_of_week"), Some(0.0));
        assert_eq!(v.get("month"), Some(1.0));
        assert_eq!(v.get("period_of_day"), Some(1.0));
        assert_eq!(v.get("season"), Some(0.0));
    }

    #[test]
    fn test_rolling_features_with_min_periods() {
        let records = vec![
            record(0, 30.0, 6.0, 1.0),
            record(1, 40.0, 7.0, 0.0),
            record(2, 50.0, 8.0, 2.0),
            record(3, 60.0, 6.0, 0.0),
        ];
        let vectors = FeatureEngineer::new().engineer(&records);

        assert_eq!(vectors[0].get("moisture_trend"), Some(30.0));
        assert_eq!(vectors[0].get("moisture_variation"), Some(0.0));
        assert_eq!(vectors[1].get("moisture_trend"), Some(35.0));
        assert_eq!(vectors[3].get("moisture_trend"), Some(50.0));
        assert!((vectors[3].get("moisture_variation").unwrap() - 10.0).abs() < 1e-9);
        assert_eq!(vectors[3].get("accumulated_precipitation"), Some(3.0));
        assert_eq!(vectors[2].get("recent_rain"), Some(1.0));
        assert_eq!(vectors[2].get("ph_category"), Some(2.0));
    }

    #[test]
    fn test_single_row_matches_series_row() {
        let r = record(5, 42.0, 6.8, 0.0);
        let engineer = FeatureEngineer::new();
        assert_eq!(engineer.engineer_one(&r), engineer.engineer(&[r])[0]);
    }

    #[test]
    fn test_heat_stress_and_nutrients() {
        let mut r = record(0, 40.0, 6.5, 0.0);
        r.weather.temperature = 31.0;
        let v = FeatureEngineer::new().engineer_one(&r);
        assert_eq!(v.get("heat_stress"), Some(1.0));
        assert_eq!(v.get("nutrient_need"), Some(1.0));
        assert!(v.values().iter().all(|x| x.is_finite()));
    }

    #[test]
    fn test_empty_input() {
        assert!(FeatureEngineer::new().engineer(&[]).is_empty());
    }
}
