//! Irrigation advisor library
//!
//! This crate provides the full prediction-model lifecycle:
//! - Curation of raw sensor rows and weather joins
//! - Feature engineering with a stable column manifest
//! - Class balancing, ensemble training and validation
//! - Versioned model storage and atomic artifact swaps
//! - Prediction serving with ensemble confidence and recommendations
//! - Drift monitoring and scheduled retraining
//! - Health checks and observability

pub mod curation;
pub mod drift;
pub mod error;
pub mod features;
pub mod health;
pub mod models;
pub mod observability;
pub mod predictor;
pub mod sources;
pub mod store;
pub mod training;

pub use error::{AdvisorError, Result};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{AdvisorMetrics, StructuredLogger};
