//! Labelled training samples

use crate::features::{FeatureEngineer, FeatureVector};
use crate::models::CuratedRecord;

/// Engineered features with both training labels
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingSample {
    pub features: FeatureVector,
    pub irrigation: bool,
    /// Soil moisture observed one period later
    pub humidity: f64,
}

/// Build samples from an ordered curated series.
///
/// The humidity label is the next record's moisture; the last record has
/// no successor and uses its own.
pub fn build_samples(engineer: &FeatureEngineer, records: &[CuratedRecord]) -> Vec<TrainingSample> {
    engineer
        .engineer(records)
        .into_iter()
        .enumerate()
        .map(|(i, features)| {
            let next = records.get(i + 1).unwrap_or(&records[i]);
            TrainingSample {
                features,
                irrigation: records[i].observation.irrigation,
                humidity: next.observation.moisture,
            }
        })
        .collect()
}

/// Count of (negative, positive) irrigation labels
pub fn class_counts(samples: &[TrainingSample]) -> (usize, usize) {
    let positive = samples.iter().filter(|s| s.irrigation).count();
    (samples.len() - positive, positive)
}
