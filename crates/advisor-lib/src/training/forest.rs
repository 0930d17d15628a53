//! Bagged decision-tree ensembles
//!
//! Every member is exposed individually so callers can measure ensemble
//! disagreement, not just the averaged output.

use super::tree::{DecisionTree, Task, TreeParams};
use crate::error::{AdvisorError, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Hyperparameters shared by the classifier and the regressor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Draw a bootstrap sample per tree
    pub bootstrap: bool,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 50,
            max_depth: 5,
            min_samples_split: 10,
            min_samples_leaf: 5,
            bootstrap: true,
            seed: 42,
        }
    }
}

impl ForestParams {
    /// Features examined per split: the square root of the width
    pub fn max_features(&self, n_features: usize) -> usize {
        ((n_features as f64).sqrt() as usize).max(1)
    }

    fn tree_params(&self, n_features: usize) -> TreeParams {
        TreeParams {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
            max_features: self.max_features(n_features),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Forest {
    task: Task,
    n_features: usize,
    trees: Vec<DecisionTree>,
    importances: Vec<f64>,
}

impl Forest {
    fn fit(
        task: Task,
        x: &[Vec<f64>],
        y: &[f64],
        weights: Option<&[f64]>,
        params: &ForestParams,
    ) -> Result<Self> {
        if x.is_empty() || x.len() != y.len() {
            return Err(AdvisorError::InsufficientData {
                found: x.len().min(y.len()),
                required: 1,
            });
        }
        let n = x.len();
        let n_features = x[0].len();
        let uniform = vec![1.0; n];
        let weights = weights.unwrap_or(&uniform);
        let tree_params = params.tree_params(n_features);
        let mut rng = StdRng::seed_from_u64(params.seed);

        let mut trees = Vec::with_capacity(params.n_trees);
        let mut importances = vec![0.0; n_features];
        for _ in 0..params.n_trees.max(1) {
            let indices: Vec<usize> = if params.bootstrap {
                (0..n).map(|_| rng.gen_range(0..n)).collect()
            } else {
                (0..n).collect()
            };
            let (tree, tree_importances) =
                DecisionTree::fit(task, x, y, weights, &indices, &tree_params, &mut rng);
            for (total, v) in importances.iter_mut().zip(tree_importances) {
                *total += v;
            }
            trees.push(tree);
        }

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            importances.iter_mut().for_each(|v| *v /= total);
        }

        Ok(Self {
            task,
            n_features,
            trees,
            importances,
        })
    }

    fn check_width(&self, row: &[f64]) -> Result<()> {
        if row.len() != self.n_features {
            return Err(AdvisorError::Prediction(format!(
                "model expects {} features, got {}",
                self.n_features,
                row.len()
            )));
        }
        Ok(())
    }

    fn members(&self, row: &[f64]) -> Result<Vec<f64>> {
        self.check_width(row)?;
        Ok(self.trees.iter().map(|t| t.predict(row)).collect())
    }

    fn mean(&self, row: &[f64]) -> Result<f64> {
        let members = self.members(row)?;
        Ok(members.iter().sum::<f64>() / members.len().max(1) as f64)
    }
}

/// Irrigation-need classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ForestClassifier(Forest);

impl ForestClassifier {
    /// Fit on binary labels with optional per-sample weights
    pub fn fit(
        x: &[Vec<f64>],
        labels: &[bool],
        weights: Option<&[f64]>,
        params: &ForestParams,
    ) -> Result<Self> {
        let y: Vec<f64> = labels.iter().map(|&l| if l { 1.0 } else { 0.0 }).collect();
        Forest::fit(Task::Classification, x, &y, weights, params).map(Self)
    }

    /// Mean positive-class probability across members
    pub fn predict_proba(&self, row: &[f64]) -> Result<f64> {
        self.0.mean(row)
    }

    pub fn predict(&self, row: &[f64]) -> Result<bool> {
        Ok(self.predict_proba(row)? > 0.5)
    }

    /// Positive-class probability of every member, in member order
    pub fn member_probabilities(&self, row: &[f64]) -> Result<Vec<f64>> {
        self.0.members(row)
    }

    pub fn n_members(&self) -> usize {
        self.0.trees.len()
    }

    pub fn n_features(&self) -> usize {
        self.0.n_features
    }

    pub fn feature_importances(&self) -> &[f64] {
        &self.0.importances
    }
}

/// Next-period humidity regressor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ForestRegressor(Forest);

impl ForestRegressor {
    pub fn fit(x: &[Vec<f64>], targets: &[f64], params: &ForestParams) -> Result<Self> {
        Forest::fit(Task::Regression, x, targets, None, params).map(Self)
    }

    pub fn predict(&self, row: &[f64]) -> Result<f64> {
        self.0.mean(row)
    }

    pub fn n_features(&self) -> usize {
        self.0.n_features
    }

    pub fn feature_importances(&self) -> &[f64] {
        &self.0.importances
    }
}
