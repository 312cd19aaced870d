//! Per-type install handlers
//!
//! A handler applies and reverses the filesystem effects of one artifact
//! under a target base directory. The orchestrator always calls
//! [`ArtifactHandler::validate`] before [`ArtifactHandler::install`].
//!
//! Both mutating calls receive the run's [`CancelSignal`]. A handler that
//! observes it returns [`SkillsyncError::Cancelled`] and leaves the target as
//! it was.

use super::CancelSignal;
use crate::archive;
use crate::error::{SkillsyncError, SkillsyncResult};
use crate::lock::ArtifactType;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Installs and removes one artifact
#[async_trait]
pub trait ArtifactHandler: Send + Sync {
    /// Install location relative to the target base
    fn install_path(&self) -> PathBuf;

    /// Check the bytes before anything touches the target
    fn validate(&self, data: &[u8]) -> SkillsyncResult<()>;

    /// Apply the artifact under `target_base`
    async fn install(
        &self,
        data: &[u8],
        target_base: &Path,
        cancel: &CancelSignal,
    ) -> SkillsyncResult<()>;

    /// Reverse a previous install under `target_base`
    async fn remove(&self, target_base: &Path, cancel: &CancelSignal) -> SkillsyncResult<()>;
}

/// Builds the handler for an artifact name and type
pub trait HandlerFactory: Send + Sync {
    fn handler(&self, name: &str, artifact_type: ArtifactType) -> Box<dyn ArtifactHandler>;
}

/// Default handler: unpacks the archive into `{type dir}/{name}`
#[derive(Debug, Clone)]
pub struct ArchiveHandler {
    name: String,
    artifact_type: ArtifactType,
}

impl ArchiveHandler {
    pub fn new(name: impl Into<String>, artifact_type: ArtifactType) -> Self {
        Self {
            name: name.into(),
            artifact_type,
        }
    }
}

#[async_trait]
impl ArtifactHandler for ArchiveHandler {
    fn install_path(&self) -> PathBuf {
        Path::new(self.artifact_type.install_dir()).join(&self.name)
    }

    fn validate(&self, data: &[u8]) -> SkillsyncResult<()> {
        let metadata = archive::read_metadata(data)?;
        if metadata.artifact.artifact_type != self.artifact_type {
            return Err(SkillsyncError::Archive(format!(
                "{} declares type {} but the lock says {}",
                archive::METADATA_FILE,
                metadata.artifact.artifact_type,
                self.artifact_type
            )));
        }
        Ok(())
    }

    async fn install(
        &self,
        data: &[u8],
        target_base: &Path,
        cancel: &CancelSignal,
    ) -> SkillsyncResult<()> {
        if cancel.is_cancelled() {
            return Err(SkillsyncError::Cancelled);
        }
        let dest = target_base.join(self.install_path());
        let parent = dest
            .parent()
            .ok_or_else(|| SkillsyncError::Internal(format!("{} has no parent", dest.display())))?
            .to_path_buf();
        tokio::fs::create_dir_all(&parent)
            .await
            .map_err(|e| SkillsyncError::io(format!("creating {}", parent.display()), e))?;

        // Extract beside the destination, then swap it in
        let staging = parent.join(format!(".staging-{}-{}", self.name, Uuid::new_v4()));
        let bytes = data.to_vec();
        let extract_to = staging.clone();
        let extracted = tokio::task::spawn_blocking(move || archive::extract(&bytes, &extract_to))
            .await
            .map_err(|e| SkillsyncError::Internal(format!("extract task failed: {}", e)))?;
        if let Err(e) = extracted {
            let _ = tokio::fs::remove_dir_all(&staging).await;
            return Err(e);
        }

        // Last point where the previous install is still untouched
        if cancel.is_cancelled() {
            let _ = tokio::fs::remove_dir_all(&staging).await;
            return Err(SkillsyncError::Cancelled);
        }

        let previous = parent.join(format!(".old-{}-{}", self.name, Uuid::new_v4()));
        let had_previous = match tokio::fs::rename(&dest, &previous).await {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => {
                let _ = tokio::fs::remove_dir_all(&staging).await;
                return Err(SkillsyncError::io(format!("replacing {}", dest.display()), e));
            }
        };

        if let Err(e) = tokio::fs::rename(&staging, &dest).await {
            if had_previous {
                let _ = tokio::fs::rename(&previous, &dest).await;
            }
            let _ = tokio::fs::remove_dir_all(&staging).await;
            return Err(SkillsyncError::io(format!("moving into {}", dest.display()), e));
        }

        if had_previous {
            let _ = tokio::fs::remove_dir_all(&previous).await;
        }
        debug!("Installed {} into {}", self.name, dest.display());
        Ok(())
    }

    async fn remove(&self, target_base: &Path, cancel: &CancelSignal) -> SkillsyncResult<()> {
        if cancel.is_cancelled() {
            return Err(SkillsyncError::Cancelled);
        }
        let dest = target_base.join(self.install_path());
        match tokio::fs::remove_dir_all(&dest).await {
            Ok(()) => {
                debug!("Removed {}", dest.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SkillsyncError::io(format!("removing {}", dest.display()), e)),
        }
    }
}

/// Hands out [`ArchiveHandler`]s for every artifact type
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveHandlerFactory;

impl HandlerFactory for ArchiveHandlerFactory {
    fn handler(&self, name: &str, artifact_type: ArtifactType) -> Box<dyn ArtifactHandler> {
        Box::new(ArchiveHandler::new(name, artifact_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{pack_files, METADATA_FILE};
    use tempfile::TempDir;

    fn skill_archive(body: &str) -> Vec<u8> {
        pack_files(&[
            (
                METADATA_FILE,
                b"[artifact]\nname = \"review\"\nversion = \"1.0.0\"\ntype = \"skill\"\n".as_slice(),
            ),
            ("SKILL.md", body.as_bytes()),
        ])
        .unwrap()
    }

    #[test]
    fn install_paths_by_type() {
        assert_eq!(
            ArchiveHandler::new("review", ArtifactType::Skill).install_path(),
            PathBuf::from("skills/review")
        );
        assert_eq!(
            ArchiveHandler::new("db", ArtifactType::McpRemote).install_path(),
            PathBuf::from("mcp-servers/db")
        );
    }

    #[test]
    fn validate_checks_metadata_and_type() {
        let skill = ArchiveHandler::new("review", ArtifactType::Skill);
        assert!(skill.validate(&skill_archive("x")).is_ok());

        let agent = ArchiveHandler::new("review", ArtifactType::Agent);
        assert!(agent.validate(&skill_archive("x")).is_err());

        let bare = pack_files(&[("SKILL.md", b"x".as_slice())]).unwrap();
        assert!(skill.validate(&bare).is_err());
        assert!(skill.validate(b"not a zip").is_err());
    }

    #[tokio::test]
    async fn install_replaces_then_remove_cleans() {
        let temp = TempDir::new().unwrap();
        let handler = ArchiveHandler::new("review", ArtifactType::Skill);
        let dest = temp.path().join("skills").join("review");
        let cancel = CancelSignal::new();

        handler
            .install(&skill_archive("v1"), temp.path(), &cancel)
            .await
            .unwrap();
        std::fs::write(dest.join("stale.txt"), "old").unwrap();
        handler
            .install(&skill_archive("v2"), temp.path(), &cancel)
            .await
            .unwrap();

        assert_eq!(std::fs::read_to_string(dest.join("SKILL.md")).unwrap(), "v2");
        assert!(!dest.join("stale.txt").exists());
        let siblings: Vec<_> = std::fs::read_dir(temp.path().join("skills"))
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(siblings, vec!["review"]);

        handler.remove(temp.path(), &cancel).await.unwrap();
        assert!(!dest.exists());
        handler.remove(temp.path(), &cancel).await.unwrap();
    }

    #[tokio::test]
    async fn cancelled_install_keeps_previous_content() {
        let temp = TempDir::new().unwrap();
        let handler = ArchiveHandler::new("review", ArtifactType::Skill);
        let dest = temp.path().join("skills").join("review");
        handler
            .install(&skill_archive("v1"), temp.path(), &CancelSignal::new())
            .await
            .unwrap();

        let cancel = CancelSignal::new();
        cancel.cancel();
        let err = handler
            .install(&skill_archive("v2"), temp.path(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, SkillsyncError::Cancelled));
        assert_eq!(std::fs::read_to_string(dest.join("SKILL.md")).unwrap(), "v1");

        let err = handler.remove(temp.path(), &cancel).await.unwrap_err();
        assert!(matches!(err, SkillsyncError::Cancelled));
        assert!(dest.is_dir());
        let siblings = std::fs::read_dir(temp.path().join("skills")).unwrap().count();
        assert_eq!(siblings, 1);
    }

    #[tokio::test]
    async fn failed_extract_leaves_no_staging() {
        let temp = TempDir::new().unwrap();
        let handler = ArchiveHandler::new("review", ArtifactType::Skill);

        assert!(handler
            .install(b"garbage", temp.path(), &CancelSignal::new())
            .await
            .is_err());

        let leftovers = std::fs::read_dir(temp.path().join("skills")).unwrap().count();
        assert_eq!(leftovers, 0);
    }
}
