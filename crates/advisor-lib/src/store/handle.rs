//! In-process pointer to the served artifact

use super::artifact::ModelArtifact;
use std::sync::{Arc, PoisonError, RwLock};

/// Shared, swappable reference to the loaded artifact.
///
/// Readers take a snapshot `Arc` and keep using it even if a new artifact
/// is installed meanwhile. The lock is only held to clone or replace the
/// pointer. Clones share the same slot.
#[derive(Clone, Default)]
pub struct ArtifactHandle {
    slot: Arc<RwLock<Option<Arc<ModelArtifact>>>>,
}

impl ArtifactHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_artifact(artifact: ModelArtifact) -> Self {
        let handle = Self::new();
        handle.install(artifact);
        handle
    }

    pub fn current(&self) -> Option<Arc<ModelArtifact>> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replace the served artifact, returning the previous one
    pub fn install(&self, artifact: ModelArtifact) -> Option<Arc<ModelArtifact>> {
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        slot.replace(Arc::new(artifact))
    }

    pub fn version(&self) -> Option<String> {
        self.current().map(|a| a.version.clone())
    }

    pub fn is_loaded(&self) -> bool {
        self.current().is_some()
    }
}

impl std::fmt::Debug for ArtifactHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArtifactHandle")
            .field("version", &self.version())
            .finish()
    }
}
