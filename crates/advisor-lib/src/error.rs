//! Error taxonomy for the model lifecycle
//!
//! Training-time errors are surfaced to the caller. Prediction-time errors
//! never leave `PredictionService`; they are folded into a degraded
//! `Prediction` instead.

use thiserror::Error;

/// Errors raised by curation, training, storage and collaborators
#[derive(Debug, Error)]
pub enum AdvisorError {
    /// Input data was empty or nothing survived cleaning
    #[error("curation failed: {0}")]
    CurationFailure(String),

    /// Fewer samples than the minimum needed to attempt training
    #[error("insufficient data: {found} samples, need at least {required}")]
    InsufficientData { found: usize, required: usize },

    /// Could not form two irrigation classes even after balancing
    #[error("insufficient class diversity: training needs both irrigation classes")]
    InsufficientClassDiversity,

    /// A model was required but none has been trained yet
    #[error("model not trained")]
    ModelNotTrained,

    /// Fault during feature build, scaling or inference
    #[error("prediction failed: {0}")]
    Prediction(String),

    /// Stored artifact failed checksum or consistency validation
    #[error("corrupt model artifact: {0}")]
    CorruptArtifact(String),

    /// A different artifact is already stored under this version name
    #[error("model version {0} already exists with different content")]
    VersionConflict(String),

    #[error("storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An external collaborator (sensor store, prediction log) failed
    #[error("collaborator error: {0}")]
    Source(String),
}

impl AdvisorError {
    /// True for the "not enough data" family, which retraining treats as a
    /// skipped run rather than a fault
    pub fn is_data_shortage(&self) -> bool {
        matches!(
            self,
            AdvisorError::InsufficientData { .. }
                | AdvisorError::InsufficientClassDiversity
                | AdvisorError::CurationFailure(_)
        )
    }
}

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, AdvisorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_data_message() {
        let err = AdvisorError::InsufficientData { found: 4, required: 10 };
        assert_eq!(
            err.to_string(),
            "insufficient data: 4 samples, need at least 10"
        );
    }

    #[test]
    fn test_data_shortage_classification() {
        assert!(AdvisorError::InsufficientClassDiversity.is_data_shortage());
        assert!(AdvisorError::CurationFailure("empty".into()).is_data_shortage());
        assert!(!AdvisorError::ModelNotTrained.is_data_shortage());
    }
}
