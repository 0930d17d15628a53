//! Class-imbalance correction before fitting
//!
//! A single-class set gets a synthetic opposite class built by resampling
//! real rows and moving moisture (and pH) into the range typical of the
//! other decision. A two-class set skewed past the configured ratio is left
//! intact and the trainer is told to weight classes instead.

use super::dataset::{class_counts, TrainingSample};
use crate::error::{AdvisorError, Result};
use crate::features::{ph_code, ph_status};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::{info, warn};

/// Moisture range for synthetic "do not irrigate" rows
pub const SYNTHETIC_WET_MOISTURE: Range<f64> = 70.0..95.0;
/// Moisture range for synthetic "irrigate" rows
pub const SYNTHETIC_DRY_MOISTURE: Range<f64> = 10.0..25.0;
/// pH range for synthetic "irrigate" rows
pub const SYNTHETIC_IDEAL_PH: Range<f64> = 6.0..7.5;

/// What the balancer did to the training set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BalanceStrategy {
    None,
    /// Synthetic opposite-class rows were appended
    Synthesized { added: usize },
    /// Classes skewed beyond the ratio; fit with class weights
    ClassWeighted { ratio: f64 },
}

#[derive(Debug, Clone)]
pub struct BalanceOutcome {
    pub samples: Vec<TrainingSample>,
    pub strategy: BalanceStrategy,
    /// Per-sample weights when `ClassWeighted`
    pub sample_weights: Option<Vec<f64>>,
}

#[derive(Debug, Clone)]
pub struct ImbalanceBalancer {
    max_ratio: f64,
    min_synthetic: usize,
    seed: u64,
}

impl Default for ImbalanceBalancer {
    fn default() -> Self {
        Self::new(5.0, 10, 42)
    }
}

impl ImbalanceBalancer {
    pub fn new(max_ratio: f64, min_synthetic: usize, seed: u64) -> Self {
        Self {
            max_ratio,
            min_synthetic,
            seed,
        }
    }

    pub fn balance(&self, mut samples: Vec<TrainingSample>) -> Result<BalanceOutcome> {
        if samples.is_empty() {
            return Err(AdvisorError::InsufficientData {
                found: 0,
                required: 1,
            });
        }

        let mut strategy = BalanceStrategy::None;
        let (negative, positive) = class_counts(&samples);
        if negative == 0 || positive == 0 {
            let existing = positive > 0;
            let added = self.synthesize(&mut samples, existing);
            warn!(
                existing_class = existing,
                added, "Single irrigation class in training data, synthesized opposite class"
            );
            strategy = BalanceStrategy::Synthesized { added };
        }

        let (negative, positive) = class_counts(&samples);
        if negative == 0 || positive == 0 {
            return Err(AdvisorError::InsufficientClassDiversity);
        }

        let ratio = negative.max(positive) as f64 / negative.min(positive) as f64;
        let mut sample_weights = None;
        if ratio > self.max_ratio {
            warn!(ratio, negative, positive, "Skewed irrigation classes, using class weights");
            let n = samples.len() as f64;
            let weight_neg = n / (2.0 * negative as f64);
            let weight_pos = n / (2.0 * positive as f64);
            sample_weights = Some(
                samples
                    .iter()
                    .map(|s| if s.irrigation { weight_pos } else { weight_neg })
                    .collect(),
            );
            if strategy == BalanceStrategy::None {
                strategy = BalanceStrategy::ClassWeighted { ratio };
            }
        }

        info!(negative, positive, ?strategy, "Training classes balanced");
        Ok(BalanceOutcome {
            samples,
            strategy,
            sample_weights,
        })
    }

    /// Append `max(min_synthetic, n / 3)` flipped copies of random rows
    fn synthesize(&self, samples: &mut Vec<TrainingSample>, existing: bool) -> usize {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let n = samples.len();
        let count = self.min_synthetic.max(n / 3);

        for _ in 0..count {
            let mut sample = samples[rng.gen_range(0..n)].clone();
            let moisture = if existing {
                rng.gen_range(SYNTHETIC_WET_MOISTURE)
            } else {
                let ph = rng.gen_range(SYNTHETIC_IDEAL_PH);
                sample.features.set("ph", ph);
                sample.features.set("ph_category", ph_code(ph_status(ph)));
                rng.gen_range(SYNTHETIC_DRY_MOISTURE)
            };
            sample.features.set("moisture", moisture);
            sample.humidity = moisture;
            sample.irrigation = !existing;
            samples.push(sample);
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureEngineer;
    use crate::models::{CuratedRecord, SensorObservation};
    use crate::training::dataset::build_samples;

    fn samples(n: usize, irrigate: impl Fn(usize) -> bool) -> Vec<TrainingSample> {
        let records: Vec<CuratedRecord> = (0..n)
            .map(|i| {
                CuratedRecord::without_weather(SensorObservation {
                    timestamp_ms: i as i64 * 3_600_000,
                    moisture: 50.0,
                    ph: 5.5,
                    phosphorus: true,
                    potassium: true,
                    irrigation: irrigate(i),
                })
            })
            .collect();
        build_samples(&FeatureEngineer::new(), &records)
    }

    #[test]
    fn test_single_class_gets_both_classes() {
        for n in [10, 12, 30, 61] {
            let outcome = ImbalanceBalancer::default()
                .balance(samples(n, |_| false))
                .unwrap();
            let (negative, positive) = class_counts(&outcome.samples);
            assert_eq!(negative, n);
            assert!(positive >= 10, "n={n} positive={positive}");
            assert!(positive >= n / 3);
        }
    }

    #[test]
    fn test_synthetic_dry_rows_have_ideal_ph() {
        let outcome = ImbalanceBalancer::default()
            .balance(samples(12, |_| false))
            .unwrap();
        for s in outcome.samples.iter().filter(|s| s.irrigation) {
            let moisture = s.features.get("moisture").unwrap();
            let ph = s.features.get("ph").unwrap();
            assert!(SYNTHETIC_DRY_MOISTURE.contains(&moisture));
            assert!(SYNTHETIC_IDEAL_PH.contains(&ph));
            assert_eq!(s.features.get("ph_category"), Some(1.0));
        }
    }

    #[test]
    fn test_synthetic_wet_rows_for_irrigate_only_set() {
        let outcome = ImbalanceBalancer::default()
            .balance(samples(15, |_| true))
            .unwrap();
        assert!(matches!(
            outcome.strategy,
            BalanceStrategy::Synthesized { added: 10 }
        ));
        for s in outcome.samples.iter().filter(|s| !s.irrigation) {
            assert!(SYNTHETIC_WET_MOISTURE.contains(&s.features.get("moisture").unwrap()));
        }
    }

    #[test]
    fn test_skewed_classes_are_weighted_not_fabricated() {
        let outcome = ImbalanceBalancer::default()
            .balance(samples(70, |i| i < 10))
            .unwrap();
        assert_eq!(outcome.samples.len(), 70);
        assert!(matches!(
            outcome.strategy,
            BalanceStrategy::ClassWeighted { .. }
        ));
        let weights = outcome.sample_weights.unwrap();
        assert!((weights[0] - 3.5).abs() < 1e-9);
        assert!((weights[69] - 70.0 / 120.0).abs() < 1e-9);
    }

    #[test]
    fn test_mild_skew_untouched() {
        let outcome = ImbalanceBalancer::default()
            .balance(samples(30, |i| i < 10))
            .unwrap();
        assert_eq!(outcome.strategy, BalanceStrategy::None);
        assert!(outcome.sample_weights.is_none());
    }

    #[test]
    fn test_empty_set_rejected() {
        assert!(ImbalanceBalancer::default().balance(Vec::new()).is_err());
    }
}
