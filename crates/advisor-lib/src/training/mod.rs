//! Model training
//!
//! This module provides:
//! - CART trees and bagged forests exposing per-member outputs
//! - Feature standardisation
//! - Class-imbalance correction
//! - Stratified splitting, cross-validation and scoring
//! - The `ModelTrainer` orchestrating a full training run

mod balancer;
mod dataset;
mod forest;
mod scaler;
mod trainer;
mod tree;
mod validation;

pub use balancer::{
    BalanceOutcome, BalanceStrategy, ImbalanceBalancer, SYNTHETIC_DRY_MOISTURE,
    SYNTHETIC_IDEAL_PH, SYNTHETIC_WET_MOISTURE,
};
pub use dataset::{build_samples, class_counts, TrainingSample};
pub use forest::{ForestClassifier, ForestParams, ForestRegressor};
pub use scaler::StandardScaler;
pub use trainer::{CollectedData, EvaluationSummary, ModelTrainer, TrainerConfig};
pub use tree::{DecisionTree, Node, Task};
pub use validation::{accuracy, mean_absolute_error, ConfusionMatrix};
