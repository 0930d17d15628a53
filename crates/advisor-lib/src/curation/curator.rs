//! Cleaning and validation of raw sensor rows

use crate::error::{AdvisorError, Result};
use crate::models::{RawSensorRecord, SensorObservation};
use serde::Serialize;
use tracing::{debug, info};

/// Valid soil moisture range in percent
pub const MOISTURE_RANGE: std::ops::RangeInclusive<f64> = 0.0..=100.0;

/// Valid pH range
pub const PH_RANGE: std::ops::RangeInclusive<f64> = 0.0..=14.0;

/// What happened to the input during curation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CurationReport {
    pub input_rows: usize,
    pub dropped_missing: usize,
    pub dropped_out_of_range: usize,
    pub duplicates_removed: usize,
    pub output_rows: usize,
}

/// Ordered, cleaned observations plus the curation report
#[derive(Debug, Clone)]
pub struct CuratedTable {
    pub observations: Vec<SensorObservation>,
    pub report: CurationReport,
}

/// Cleans, validates and deduplicates raw sensor rows
#[derive(Debug, Clone, Default)]
pub struct DataCurator;

impl DataCurator {
    pub fn new() -> Self {
        Self
    }

    /// Curate an unordered batch of raw rows.
    ///
    /// Rows missing timestamp, moisture or pH are dropped; rows with moisture
    /// outside [0, 100] or pH outside [0, 14] are rejected. The output is
    /// sorted by timestamp with one observation per timestamp (the last one
    /// seen wins).
    pub fn curate(&self, rows: &[RawSensorRecord]) -> Result<CuratedTable> {
        if rows.is_empty() {
            return Err(AdvisorError::CurationFailure(
                "no sensor rows supplied".to_string(),
            ));
        }

        let mut report = CurationReport {
            input_rows: rows.len(),
            ..Default::default()
        };

        let mut kept: Vec<SensorObservation> = Vec::with_capacity(rows.len());
        for row in rows {
            let (Some(timestamp_ms), Some(moisture), Some(ph)) = (row.timestamp, row.moisture, row.ph)
            else {
                report.dropped_missing += 1;
                continue;
            };

            if !MOISTURE_RANGE.contains(&moisture) || !PH_RANGE.contains(&ph) {
                debug!(timestamp_ms, moisture, ph, "Rejecting out-of-range sensor row");
                report.dropped_out_of_range += 1;
                continue;
            }

            kept.push(SensorObservation {
                timestamp_ms,
                moisture,
                ph,
                phosphorus: coerce_flag(row.phosphorus),
                potassium: coerce_flag(row.potassium),
                irrigation: coerce_flag(row.irrigation),
            });
        }

        // Stable sort keeps input order within a timestamp, so the last
        // element of each run is the last write.
        kept.sort_by_key(|o| o.timestamp_ms);
        let before_dedup = kept.len();
        let mut observations: Vec<SensorObservation> = Vec::with_capacity(kept.len());
        for obs in kept {
            match observations.last_mut() {
                Some(last) if last.timestamp_ms == obs.timestamp_ms => *last = obs,
                _ => observations.push(obs),
            }
        }
        report.duplicates_removed = before_dedup - observations.len();
        report.output_rows = observations.len();

        if observations.is_empty() {
            return Err(AdvisorError::CurationFailure(format!(
                "all {} rows were filtered out ({} missing fields, {} out of range)",
                report.input_rows, report.dropped_missing, report.dropped_out_of_range
            )));
        }

        info!(
            input_rows = report.input_rows,
            output_rows = report.output_rows,
            dropped_missing = report.dropped_missing,
            dropped_out_of_range = report.dropped_out_of_range,
            duplicates_removed = report.duplicates_removed,
            "Sensor data curated"
        );

        Ok(CuratedTable {
            observations,
            report,
        })
    }
}

/// Coerce an optional numeric flag to a 0/1 boolean
fn coerce_flag(value: Option<f64>) -> bool {
    value.map(|v| v.is_finite() && v.trunc() != 0.0).unwrap_or(false)
}
