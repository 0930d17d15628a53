//! Trained model artifact and its metrics snapshot

use crate::error::Result;
use crate::features::{ColumnManifest, FeatureVector};
use crate::training::{BalanceStrategy, ForestClassifier, ForestRegressor, StandardScaler};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Mean and spread of a cross-validated score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CvScore {
    pub mean: f64,
    pub std: f64,
    pub folds: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassDistribution {
    pub irrigate: usize,
    pub no_irrigate: usize,
}

/// Validation results attached to every artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    /// Held-out classifier accuracy
    pub accuracy: f64,
    /// Held-out regressor mean absolute error
    pub humidity_mae: f64,
    /// Absent when the minority class is too small to fold
    pub cv_accuracy: Option<CvScore>,
    pub cv_humidity_mae: Option<CvScore>,
    pub training_samples: usize,
    pub class_distribution: ClassDistribution,
    /// Distinct classes the classifier produced on the validation split
    pub predicted_classes: Vec<bool>,
    pub balancing: BalanceStrategy,
    pub importance_irrigation: BTreeMap<String, f64>,
    pub importance_humidity: BTreeMap<String, f64>,
}

impl TrainingMetrics {
    /// Irrigation importances, highest first
    pub fn top_irrigation_features(&self, limit: usize) -> Vec<(&str, f64)> {
        let mut ranked: Vec<(&str, f64)> = self
            .importance_irrigation
            .iter()
            .map(|(k, v)| (k.as_str(), *v))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked.truncate(limit);
        ranked
    }
}

/// Everything needed to serve predictions from one training run.
///
/// Immutable once built; replaced wholesale, never patched.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelArtifact {
    pub version: String,
    pub trained_at: DateTime<Utc>,
    pub classifier: ForestClassifier,
    pub regressor: ForestRegressor,
    pub scaler: StandardScaler,
    pub manifest: ColumnManifest,
    pub metrics: TrainingMetrics,
}

impl ModelArtifact {
    pub fn version_for(trained_at: DateTime<Utc>) -> String {
        format!("v{}", trained_at.format("%Y%m%d%H%M%S%3f"))
    }

    /// Reindex a vector to the manifest and scale it
    pub fn prepare_row(&self, features: &FeatureVector) -> Result<Vec<f64>> {
        self.scaler.transform(&self.manifest.reindex(features))
    }

    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.trained_at
    }
}
