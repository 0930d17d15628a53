//! Core data models for the irrigation advisor

use serde::{Deserialize, Deserializer, Serialize};

/// Default air temperature (°C) when no weather observation is available
pub const DEFAULT_TEMPERATURE: f64 = 25.0;
/// Default air humidity (%) when no weather observation is available
pub const DEFAULT_AIR_HUMIDITY: f64 = 70.0;
/// Default precipitation (mm)
pub const DEFAULT_PRECIPITATION: f64 = 0.0;
/// Default wind speed (m/s)
pub const DEFAULT_WIND_SPEED: f64 = 0.0;
/// Default sea-level pressure (hPa)
pub const DEFAULT_PRESSURE: f64 = 1013.0;

/// Raw sensor row as handed over by the sensor store or an import file.
///
/// Every field is optional; `DataCurator` decides what survives.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSensorRecord {
    /// Reporting sensor; records of different sensors are curated apart
    #[serde(default)]
    pub sensor_id: Option<String>,
    /// Unix timestamp in milliseconds
    #[serde(default)]
    pub timestamp: Option<i64>,
    /// Soil moisture in percent
    #[serde(default)]
    pub moisture: Option<f64>,
    #[serde(default)]
    pub ph: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub phosphorus: Option<f64>,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub potassium: Option<f64>,
    /// Irrigation applied (training label)
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub irrigation: Option<f64>,
}

/// Accepts booleans, numbers or numeric strings for 0/1 style flags
fn deserialize_flag<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::Bool(b)) => Some(if b { 1.0 } else { 0.0 }),
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" => Some(1.0),
            "false" | "no" => Some(0.0),
            other => other.parse::<f64>().ok(),
        },
        Some(_) => None,
    })
}

/// A cleaned soil observation, one per timestamp
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorObservation {
    /// Unix timestamp in milliseconds
    pub timestamp_ms: i64,
    pub moisture: f64,
    pub ph: f64,
    pub phosphorus: bool,
    pub potassium: bool,
    /// Label, only meaningful for training data
    #[serde(default)]
    pub irrigation: bool,
}

/// Weather at (or near) the time of a soil observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherContext {
    #[serde(default)]
    pub timestamp_ms: i64,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_air_humidity")]
    pub air_humidity: f64,
    #[serde(default)]
    pub precipitation: f64,
    #[serde(default)]
    pub wind_speed: f64,
    #[serde(default = "default_pressure")]
    pub pressure: f64,
}

fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}

fn default_air_humidity() -> f64 {
    DEFAULT_AIR_HUMIDITY
}

fn default_pressure() -> f64 {
    DEFAULT_PRESSURE
}

impl WeatherContext {
    /// Fixed defaults used whenever no weather data can be matched
    pub fn fallback(timestamp_ms: i64) -> Self {
        Self {
            timestamp_ms,
            temperature: DEFAULT_TEMPERATURE,
            air_humidity: DEFAULT_AIR_HUMIDITY,
            precipitation: DEFAULT_PRECIPITATION,
            wind_speed: DEFAULT_WIND_SPEED,
            pressure: DEFAULT_PRESSURE,
        }
    }
}

/// One point of a weather forecast
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    #[serde(default)]
    pub timestamp_ms: Option<i64>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default)]
    pub precipitation: f64,
}

/// Soil observation joined with its weather context
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CuratedRecord {
    pub observation: SensorObservation,
    pub weather: WeatherContext,
}

impl CuratedRecord {
    pub fn without_weather(observation: SensorObservation) -> Self {
        Self {
            weather: WeatherContext::fallback(observation.timestamp_ms),
            observation,
        }
    }
}

/// Qualitative soil moisture state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoistureStatus {
    Low,
    Normal,
    High,
}

/// Qualitative soil pH state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhStatus {
    Acidic,
    Ideal,
    Alkaline,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NutrientStatus {
    Sufficient,
    Deficient,
}

/// Qualitative reading of the current soil state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendAnalysis {
    pub humidity_status: MoistureStatus,
    pub ph_status: PhStatus,
    pub nutrient_status: NutrientStatus,
}

/// 95% interval over the per-tree irrigation votes
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceInterval {
    pub lower: f64,
    pub mean: f64,
    pub upper: f64,
    pub std_dev: f64,
}

/// Irrigation decision served to the caller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub irrigation_needed: bool,
    pub irrigation_probability: f64,
    /// Maximum posterior class probability of the full ensemble
    pub confidence: f64,
    pub confidence_interval: ConfidenceInterval,
    /// Forecast soil moisture for the next period
    pub predicted_humidity: f64,
    pub current_humidity: f64,
    pub trend: Option<TrendAnalysis>,
    pub recommendations: Vec<String>,
    pub horizon_hours: u32,
    pub model_version: Option<String>,
    pub generated_at: i64,
    /// Set when the prediction is a degraded fallback
    pub error: Option<String>,
}

impl Prediction {
    /// Safe default returned when anything goes wrong while predicting
    pub fn degraded(message: impl Into<String>) -> Self {
        Self {
            irrigation_needed: false,
            irrigation_probability: 0.0,
            confidence: 0.0,
            confidence_interval: ConfidenceInterval::default(),
            predicted_humidity: 0.0,
            current_humidity: 0.0,
            trend: None,
            recommendations: Vec::new(),
            horizon_hours: 0,
            model_version: None,
            generated_at: chrono::Utc::now().timestamp(),
            error: Some(message.into()),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }
}

/// A served prediction as stored by the prediction log, optionally
/// augmented with the outcome observed later
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedPrediction {
    pub id: u64,
    pub sensor_id: String,
    /// Unix timestamp in milliseconds
    pub predicted_at: i64,
    pub irrigation_needed: bool,
    pub irrigation_probability: f64,
    pub confidence: f64,
    #[serde(default)]
    pub actual_irrigation: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_coercion_from_mixed_types() {
        let json = r#"[
            {"timestamp": 1, "moisture": 30.0, "ph": 6.5, "phosphorus": true, "potassium": "0", "irrigation": 1},
            {"timestamp": 2, "moisture": 30.0, "ph": 6.5, "phosphorus": "yes", "potassium": null}
        ]"#;
        let rows: Vec<RawSensorRecord> = serde_json::from_str(json).unwrap();
        assert_eq!(rows[0].phosphorus, Some(1.0));
        assert_eq!(rows[0].potassium, Some(0.0));
        assert_eq!(rows[0].irrigation, Some(1.0));
        assert_eq!(rows[1].phosphorus, Some(1.0));
        assert_eq!(rows[1].potassium, None);
        assert_eq!(rows[1].irrigation, None);
    }

    #[test]
    fn test_weather_fallback_defaults() {
        let w = WeatherContext::fallback(42);
        assert_eq!(w.timestamp_ms, 42);
        assert_eq!(w.temperature, 25.0);
        assert_eq!(w.air_humidity, 70.0);
        assert_eq!(w.precipitation, 0.0);
        assert_eq!(w.wind_speed, 0.0);
        assert_eq!(w.pressure, 1013.0);
    }

    #[test]
    fn test_forecast_point_defaults() {
        let p: ForecastPoint = serde_json::from_str(r#"{"precipitation": 3.5}"#).unwrap();
        assert_eq!(p.temperature, 25.0);
        assert_eq!(p.precipitation, 3.5);
    }

    #[test]
    fn test_degraded_prediction_is_safe() {
        let p = Prediction::degraded("no model loaded");
        assert!(!p.irrigation_needed);
        assert_eq!(p.irrigation_probability, 0.0);
        assert_eq!(p.confidence, 0.0);
        assert!(p.is_degraded());
    }
}
