//! Feature engineering for the irrigation models
//!
//! This module provides:
//! - Fixed-order feature vectors with temporal, trend and categorical fields
//! - Stable categorical codes shared by training and inference
//! - The column manifest used to reindex inference vectors

mod categories;
mod engineer;
mod vector;

pub use categories::{
    moisture_status, nutrient_status, ph_code, ph_status, NutrientNeed, PeriodOfDay, Season,
    MOISTURE_HIGH_ABOVE, MOISTURE_LOW_BELOW, PH_ACIDIC_BELOW, PH_ALKALINE_ABOVE,
};
pub use engineer::{FeatureEngineer, HEAT_STRESS_ABOVE, PRECIPITATION_WINDOW, TREND_WINDOW};
pub use vector::{ColumnManifest, FeatureVector, FEATURE_COLUMNS};
