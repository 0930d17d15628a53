//! Model artifact persistence
//!
//! This module provides:
//! - The `ModelArtifact` bundle and its metrics snapshot
//! - A versioned, checksummed on-disk store with rollback
//! - An atomically swappable in-process handle for serving

mod artifact;
mod file_store;
mod handle;

pub use artifact::{ClassDistribution, CvScore, ModelArtifact, TrainingMetrics};
pub use file_store::{ModelStore, ModelStoreConfig, StoredVersion};
pub use handle::ArtifactHandle;
