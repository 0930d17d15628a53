//! Versioned on-disk model store
//!
//! Layout:
//! ```text
//! <model_dir>/CURRENT                       name of the served version
//! <model_dir>/versions/<version>/classifier.json
//! <model_dir>/versions/<version>/regressor.json
//! <model_dir>/versions/<version>/scaler.json
//! <model_dir>/versions/<version>/metadata.json
//! ```
//! A version directory is staged under a temporary name and renamed into
//! place once every file is synced; `CURRENT` is replaced the same way.
//! Readers therefore see either the previous or the complete new artifact.

use super::artifact::{ModelArtifact, TrainingMetrics};
use crate::error::{AdvisorError, Result};
use crate::features::ColumnManifest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const CURRENT_FILE: &str = "CURRENT";
const VERSIONS_DIR: &str = "versions";
const CLASSIFIER_FILE: &str = "classifier.json";
const REGRESSOR_FILE: &str = "regressor.json";
const SCALER_FILE: &str = "scaler.json";
const METADATA_FILE: &str = "metadata.json";

/// Configuration for the model store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelStoreConfig {
    pub model_dir: PathBuf,
    /// Number of versions kept on disk for rollback
    pub versions_to_keep: usize,
}

impl Default for ModelStoreConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            versions_to_keep: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Checksums {
    classifier: String,
    regressor: String,
    scaler: String,
}

/// Structured metadata document stored next to the model blobs
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Metadata {
    version: String,
    trained_at: DateTime<Utc>,
    manifest: ColumnManifest,
    metrics: TrainingMetrics,
    checksums: Checksums,
}

/// Summary of a stored version, readable without loading the models
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredVersion {
    pub version: String,
    pub trained_at: DateTime<Utc>,
    pub current: bool,
    pub accuracy: f64,
    pub humidity_mae: f64,
}

pub struct ModelStore {
    config: ModelStoreConfig,
}

impl ModelStore {
    pub fn new(config: ModelStoreConfig) -> Self {
        Self { config }
    }

    pub fn open(model_dir: impl Into<PathBuf>) -> Self {
        Self::new(ModelStoreConfig {
            model_dir: model_dir.into(),
            ..Default::default()
        })
    }

    pub fn model_dir(&self) -> &Path {
        &self.config.model_dir
    }

    fn versions_dir(&self) -> PathBuf {
        self.config.model_dir.join(VERSIONS_DIR)
    }

    fn version_dir(&self, version: &str) -> PathBuf {
        self.versions_dir().join(version)
    }

    /// Persist an artifact and make it the current version.
    ///
    /// Saving the identical artifact again only repoints `CURRENT`; a
    /// different artifact under an existing version name is a
    /// `VersionConflict` and leaves the store untouched.
    pub fn save(&self, artifact: &ModelArtifact) -> Result<PathBuf> {
        let versions_dir = self.versions_dir();
        fs::create_dir_all(&versions_dir)?;
        let target = self.version_dir(&artifact.version);

        let classifier = serde_json::to_vec(&artifact.classifier)?;
        let regressor = serde_json::to_vec(&artifact.regressor)?;
        let scaler = serde_json::to_vec(&artifact.scaler)?;
        let metadata = serde_json::to_vec_pretty(&Metadata {
            version: artifact.version.clone(),
            trained_at: artifact.trained_at,
            manifest: artifact.manifest.clone(),
            metrics: artifact.metrics.clone(),
            checksums: Checksums {
                classifier: compute_checksum(&classifier),
                regressor: compute_checksum(&regressor),
                scaler: compute_checksum(&scaler),
            },
        })?;

        if target.exists() {
            if fs::read(target.join(METADATA_FILE))? != metadata {
                return Err(AdvisorError::VersionConflict(artifact.version.clone()));
            }
            debug!(version = %artifact.version, "Version already stored, repointing only");
        } else {
            let staging = versions_dir.join(format!(".{}.tmp", artifact.version));
            if staging.exists() {
                fs::remove_dir_all(&staging)?;
            }
            fs::create_dir_all(&staging)?;

            write_synced(&staging.join(CLASSIFIER_FILE), &classifier)?;
            write_synced(&staging.join(REGRESSOR_FILE), &regressor)?;
            write_synced(&staging.join(SCALER_FILE), &scaler)?;
            write_synced(&staging.join(METADATA_FILE), &metadata)?;
            fs::rename(&staging, &target)?;
        }

        self.write_current(&artifact.version)?;
        info!(
            version = %artifact.version,
            path = %target.display(),
            "Model artifact saved"
        );

        self.prune();
        Ok(target)
    }

    /// Load the current artifact; `None` when nothing was trained yet
    pub fn load(&self) -> Result<Option<ModelArtifact>> {
        match self.current_version()? {
            Some(version) => self.load_version(&version).map(Some),
            None => Ok(None),
        }
    }

    /// Load the current artifact, failing with `ModelNotTrained` if absent
    pub fn load_required(&self) -> Result<ModelArtifact> {
        self.load()?.ok_or(AdvisorError::ModelNotTrained)
    }

    pub fn load_version(&self, version: &str) -> Result<ModelArtifact> {
        let dir = self.version_dir(version);
        if !dir.is_dir() {
            return Err(AdvisorError::CorruptArtifact(format!(
                "version {version} not found under {}",
                self.versions_dir().display()
            )));
        }

        let metadata: Metadata = serde_json::from_slice(&fs::read(dir.join(METADATA_FILE))?)?;
        let classifier = read_verified(&dir.join(CLASSIFIER_FILE), &metadata.checksums.classifier)?;
        let regressor = read_verified(&dir.join(REGRESSOR_FILE), &metadata.checksums.regressor)?;
        let scaler = read_verified(&dir.join(SCALER_FILE), &metadata.checksums.scaler)?;

        let artifact = ModelArtifact {
            version: metadata.version,
            trained_at: metadata.trained_at,
            classifier: serde_json::from_slice(&classifier)?,
            regressor: serde_json::from_slice(&regressor)?,
            scaler: serde_json::from_slice(&scaler)?,
            manifest: metadata.manifest,
            metrics: metadata.metrics,
        };

        if artifact.classifier.n_features() != artifact.manifest.len()
            || artifact.scaler.width() != artifact.manifest.len()
        {
            return Err(AdvisorError::CorruptArtifact(format!(
                "version {version} models disagree with its column manifest"
            )));
        }

        debug!(version = %version, "Model artifact loaded");
        Ok(artifact)
    }

    pub fn current_version(&self) -> Result<Option<String>> {
        match fs::read_to_string(self.config.model_dir.join(CURRENT_FILE)) {
            Ok(content) => {
                let version = content.trim();
                Ok((!version.is_empty()).then(|| version.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Stored version names, oldest first
    pub fn versions(&self) -> Result<Vec<String>> {
        let entries = match fs::read_dir(self.versions_dir()) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut versions = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with('.') && entry.path().is_dir() {
                versions.push(name);
            }
        }
        versions.sort();
        Ok(versions)
    }

    /// Metadata summaries for every stored version, oldest first
    pub fn list(&self) -> Result<Vec<StoredVersion>> {
        let current = self.current_version()?;
        self.versions()?
            .into_iter()
            .map(|version| {
                let path = self.version_dir(&version).join(METADATA_FILE);
                let metadata: Metadata = serde_json::from_slice(&fs::read(path)?)?;
                Ok(StoredVersion {
                    current: current.as_deref() == Some(version.as_str()),
                    version,
                    trained_at: metadata.trained_at,
                    accuracy: metadata.metrics.accuracy,
                    humidity_mae: metadata.metrics.humidity_mae,
                })
            })
            .collect()
    }

    /// Point `CURRENT` at the version before the current one
    pub fn rollback(&self) -> Result<Option<String>> {
        let versions = self.versions()?;
        let Some(current) = self.current_version()? else {
            warn!("No current model, nothing to roll back");
            return Ok(None);
        };
        let previous = versions
            .iter()
            .take_while(|v| **v != current)
            .last()
            .cloned();

        match previous {
            Some(version) => {
                self.load_version(&version)?;
                self.write_current(&version)?;
                info!(from = %current, to = %version, "Rolled back to previous model version");
                Ok(Some(version))
            }
            None => {
                warn!(current = %current, "No previous model version available for rollback");
                Ok(None)
            }
        }
    }

    fn write_current(&self, version: &str) -> Result<()> {
        let path = self.config.model_dir.join(CURRENT_FILE);
        let temp = path.with_extension("tmp");
        write_synced(&temp, version.as_bytes())?;
        fs::rename(&temp, &path)?;
        Ok(())
    }

    /// Drop the oldest versions beyond the retention limit, never the current one
    fn prune(&self) {
        let (versions, current) = match (self.versions(), self.current_version()) {
            (Ok(v), Ok(c)) => (v, c),
            _ => return,
        };
        let keep = self.config.versions_to_keep.max(1);
        if versions.len() <= keep {
            return;
        }
        for version in &versions[..versions.len() - keep] {
            if current.as_deref() == Some(version.as_str()) {
                continue;
            }
            if let Err(e) = fs::remove_dir_all(self.version_dir(version)) {
                warn!(version = %version, error = %e, "Failed to remove old model version");
            }
        }
    }
}

fn write_synced(path: &Path, data: &[u8]) -> Result<()> {
    let mut file = File::create(path)?;
    file.write_all(data)?;
    file.sync_all()?;
    Ok(())
}

fn read_verified(path: &Path, expected: &str) -> Result<Vec<u8>> {
    let data = fs::read(path)?;
    let actual = compute_checksum(&data);
    if actual != expected {
        return Err(AdvisorError::CorruptArtifact(format!(
            "checksum mismatch for {}: expected {expected}, got {actual}",
            path.display()
        )));
    }
    Ok(data)
}

/// Compute SHA256 checksum of data
fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
