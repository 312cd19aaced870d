//! Install record persistence
//!
//! One JSON record per install target lists what skillsync put there, so a
//! later run can remove artifacts that left the lock. Records are replaced
//! atomically.

use crate::cache::write_atomic;
use crate::error::{SkillsyncError, SkillsyncResult};
use crate::lock::{Artifact, ArtifactId, ArtifactType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One installed artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledArtifact {
    pub name: String,
    pub version: String,
    #[serde(rename = "type")]
    pub artifact_type: ArtifactType,
    /// Scope identity, see [`crate::lock::Scope::key`]
    pub scope: String,
    /// Relative to the target base
    pub install_path: PathBuf,
    pub installed_at: DateTime<Utc>,
}

impl InstalledArtifact {
    pub fn new(artifact: &Artifact, install_path: PathBuf) -> Self {
        Self {
            name: artifact.name.clone(),
            version: artifact.version.clone(),
            artifact_type: artifact.artifact_type,
            scope: artifact.effective_scope().key(),
            install_path,
            installed_at: Utc::now(),
        }
    }

    pub fn id(&self) -> ArtifactId {
        ArtifactId {
            name: self.name.clone(),
            version: self.version.clone(),
        }
    }

    /// Same name, version and scope
    pub fn matches(&self, artifact: &Artifact) -> bool {
        self.name == artifact.name
            && self.version == artifact.version
            && self.scope == artifact.effective_scope().key()
    }
}

/// Everything installed into one target base
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallRecord {
    pub target: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_version: Option<String>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub artifacts: Vec<InstalledArtifact>,
}

impl InstallRecord {
    pub fn new(target: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
            lock_version: None,
            updated_at: Utc::now(),
            artifacts: Vec::new(),
        }
    }

    /// Load a record; a missing or unreadable record counts as empty
    pub async fn load(path: &Path) -> SkillsyncResult<Option<Self>> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(SkillsyncError::io(
                    format!("reading install record {}", path.display()),
                    e,
                ))
            }
        };

        match serde_json::from_str(&content) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!("Ignoring corrupt install record {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }

    /// Atomically replace the record on disk
    pub async fn save(&self, path: &Path) -> SkillsyncResult<()> {
        let content = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &content).await?;
        debug!(
            "Saved install record for {} ({} artifacts)",
            self.target.display(),
            self.artifacts.len()
        );
        Ok(())
    }
}
