//! Interpretation of unit-tagged sensor store rows
//!
//! The sensor store keeps one row per measured quantity. Rows of the same
//! sensor sharing a timestamp are folded into a single `RawSensorRecord`.

use crate::models::RawSensorRecord;
use crate::sources::SensorReading;
use std::collections::BTreeMap;
use tracing::debug;

/// Unit tag for soil moisture readings
pub const UNIT_MOISTURE: &str = "%";
/// Unit tag for pH readings
pub const UNIT_PH: &str = "pH";
/// Unit tag for combined nutrient readings (`{"P": x, "K": y}`)
pub const UNIT_NUTRIENTS: &str = "ppm";
pub const UNIT_PHOSPHORUS: &str = "P_ppm";
pub const UNIT_POTASSIUM: &str = "K_ppm";
/// Unit tag for the irrigation relay state (training label)
pub const UNIT_IRRIGATION: &str = "irrigation";

/// Group unit-tagged readings into raw records, ordered by sensor then time
pub fn group_readings(readings: &[SensorReading]) -> Vec<RawSensorRecord> {
    let mut grouped: BTreeMap<(&str, i64), RawSensorRecord> = BTreeMap::new();
    let mut skipped = 0usize;

    for reading in readings {
        let record = grouped
            .entry((reading.sensor_id.as_str(), reading.timestamp_ms))
            .or_insert_with(|| RawSensorRecord {
                sensor_id: Some(reading.sensor_id.clone()),
                timestamp: Some(reading.timestamp_ms),
                ..Default::default()
            });

        if !apply_reading(record, reading) {
            skipped += 1;
        }
    }

    if skipped > 0 {
        debug!(skipped, "Skipped unrecognised or unparsable sensor readings");
    }

    grouped.into_values().collect()
}

/// Fold one reading into its record; false if the reading was not usable
fn apply_reading(record: &mut RawSensorRecord, reading: &SensorReading) -> bool {
    let value = reading.value.trim();
    match reading.unit.as_str() {
        UNIT_MOISTURE => parse_number(value).map(|v| record.moisture = Some(v)).is_some(),
        UNIT_PH => parse_number(value).map(|v| record.ph = Some(v)).is_some(),
        UNIT_PHOSPHORUS => parse_number(value)
            .map(|v| record.phosphorus = Some(presence(v)))
            .is_some(),
        UNIT_POTASSIUM => parse_number(value)
            .map(|v| record.potassium = Some(presence(v)))
            .is_some(),
        UNIT_IRRIGATION => parse_number(value)
            .map(|v| record.irrigation = Some(presence(v)))
            .is_some(),
        UNIT_NUTRIENTS => {
            let Ok(parsed) = serde_json::from_str::<serde_json::Value>(value) else {
                return false;
            };
            let p = parsed.get("P").and_then(json_number);
            let k = parsed.get("K").and_then(json_number);
            if p.is_none() && k.is_none() {
                return false;
            }
            record.phosphorus = Some(presence(p.unwrap_or(0.0)));
            record.potassium = Some(presence(k.unwrap_or(0.0)));
            true
        }
        _ => false,
    }
}

fn parse_number(value: &str) -> Option<f64> {
    value.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn json_number(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        serde_json::Value::String(s) => parse_number(s.trim()),
        _ => None,
    }
}

fn presence(value: f64) -> f64 {
    if value != 0.0 {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(sensor: &str, ts: i64, value: &str, unit: &str) -> SensorReading {
        SensorReading {
            sensor_id: sensor.to_string(),
            timestamp_ms: ts,
            value: value.to_string(),
            unit: unit.to_string(),
        }
    }

    #[test]
    fn test_same_timestamp_rows_grouped() {
        let readings = vec![
            reading("s1", 1000, "35.5", "%"),
            reading("s1", 1000, "6.4", "pH"),
            reading("s1", 1000, r#"{"P": 12, "K": 0}"#, "ppm"),
            reading("s1", 2000, "33.0", "%"),
        ];
        let records = group_readings(&readings);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].moisture, Some(35.5));
        assert_eq!(records[0].ph, Some(6.4));
        assert_eq!(records[0].phosphorus, Some(1.0));
        assert_eq!(records[0].potassium, Some(0.0));
        assert_eq!(records[1].ph, None);
    }

    #[test]
    fn test_missing_ph_is_not_fabricated() {
        let records = group_readings(&[reading("s1", 1, "40", "%")]);
        assert_eq!(records[0].ph, None);
    }

    #[test]
    fn test_split_nutrient_units_and_irrigation() {
        let readings = vec![
            reading("s1", 5, "0", "P_ppm"),
            reading("s1", 5, "18.2", "K_ppm"),
            reading("s1", 5, "1", "irrigation"),
        ];
        let records = group_readings(&readings);
        assert_eq!(records[0].phosphorus, Some(0.0));
        assert_eq!(records[0].potassium, Some(1.0));
        assert_eq!(records[0].irrigation, Some(1.0));
    }

    #[test]
    fn test_sensors_kept_apart() {
        let readings = vec![reading("a", 1, "10", "%"), reading("b", 1, "90", "%")];
        let records = group_readings(&readings);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].sensor_id.as_deref(), Some("a"));
        assert_eq!(records[1].sensor_id.as_deref(), Some("b"));
    }

    #[test]
    fn test_garbage_values_skipped() {
        let readings = vec![
            reading("s1", 1, "wet", "%"),
            reading("s1", 1, "not json", "ppm"),
            reading("s1", 1, "7", "lux"),
        ];
        let records = group_readings(&readings);
        assert_eq!(records[0].moisture, None);
        assert_eq!(records[0].phosphorus, None);
    }
}
