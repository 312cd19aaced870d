//! On-disk cache for artifacts, git clones and lock files
//!
//! The cache manager owns the cache layout; no other component writes into
//! cache paths directly.
//!
//! # Layout
//!
//! | Path | Key | Contents |
//! |------|-----|----------|
//! | `artifacts/{name}/{version}.zip` | (name, version) | Verified artifact bytes |
//! | `git-repos/{url_hash}/` | repository URL | Clones reused across runs |
//! | `lockfiles/{source_hash}.json` | lock source | Last lock content and ETag |
//! | `installed-state/*.json` | install target | Install records |
//!
//! Unreadable entries are cache misses. The fetch path repopulates them.

pub mod lockfile;

pub use lockfile::CachedLock;

use crate::error::{SkillsyncError, SkillsyncResult};
use crate::lock::ArtifactId;
use crate::source::integrity::url_hash;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};
use uuid::Uuid;

const ARTIFACTS_DIR: &str = "artifacts";
const GIT_REPOS_DIR: &str = "git-repos";
const LOCKFILES_DIR: &str = "lockfiles";
const INSTALLED_STATE_DIR: &str = "installed-state";

/// Prefix of the staging dirs clones are made in before the rename
pub(crate) const CLONE_STAGING_PREFIX: &str = ".clone-";

/// Cache manager rooted at a single directory
#[derive(Debug, Clone)]
pub struct CacheManager {
    root: PathBuf,
}

impl CacheManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Default cache root (`~/.cache/skillsync` on Linux)
    pub fn default_root() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("skillsync")
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn artifacts_dir(&self) -> PathBuf {
        self.root.join(ARTIFACTS_DIR)
    }

    pub fn git_repos_dir(&self) -> PathBuf {
        self.root.join(GIT_REPOS_DIR)
    }

    pub fn lockfiles_dir(&self) -> PathBuf {
        self.root.join(LOCKFILES_DIR)
    }

    pub fn installed_state_dir(&self) -> PathBuf {
        self.root.join(INSTALLED_STATE_DIR)
    }

    /// Create every cache subdirectory and drop clone staging dirs left
    /// by an interrupted run. Idempotent.
    pub async fn ensure_dirs(&self) -> SkillsyncResult<()> {
        let dirs = [
            self.artifacts_dir(),
            self.git_repos_dir(),
            self.lockfiles_dir(),
            self.installed_state_dir(),
        ];

        for dir in &dirs {
            fs::create_dir_all(dir).await.map_err(|e| {
                SkillsyncError::io(format!("creating directory {}", dir.display()), e)
            })?;
        }
        self.remove_stale_clones().await
    }

    async fn remove_stale_clones(&self) -> SkillsyncResult<()> {
        let dir = self.git_repos_dir();
        let read_err = |e| SkillsyncError::io(format!("reading {}", dir.display()), e);
        let mut entries = fs::read_dir(&dir).await.map_err(read_err)?;

        while let Some(entry) = entries.next_entry().await.map_err(read_err)? {
            if !entry
                .file_name()
                .to_string_lossy()
                .starts_with(CLONE_STAGING_PREFIX)
            {
                continue;
            }
            let path = entry.path();
            match fs::remove_dir_all(&path).await {
                Ok(()) => debug!("Removed stale clone {}", path.display()),
                Err(e) => warn!("Could not remove stale clone {}: {}", path.display(), e),
            }
        }
        Ok(())
    }

    /// Path of the cached archive for an artifact
    pub fn artifact_path(&self, id: &ArtifactId) -> PathBuf {
        self.artifacts_dir()
            .join(&id.name)
            .join(format!("{}.zip", id.version))
    }

    /// Clone location for a repository URL
    pub fn git_repo_path(&self, url: &str) -> PathBuf {
        self.git_repos_dir().join(url_hash(url))
    }

    /// Install record location for a target base; the global target gets a fixed name
    pub fn install_state_path(&self, target_base: &Path, global: bool) -> PathBuf {
        let file = if global {
            "global.json".to_string()
        } else {
            format!("{}.json", url_hash(&target_base.to_string_lossy()))
        };
        self.installed_state_dir().join(file)
    }

    /// Cached bytes for an artifact, or `None` on miss or unreadable entry
    pub async fn get(&self, id: &ArtifactId) -> Option<Vec<u8>> {
        let path = self.artifact_path(id);
        match fs::read(&path).await {
            Ok(data) => {
                debug!("Cache hit for {}", id);
                Some(data)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                warn!("Ignoring unreadable cache entry {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Store verified bytes for an artifact
    pub async fn put(&self, id: &ArtifactId, data: &[u8]) -> SkillsyncResult<()> {
        write_atomic(&self.artifact_path(id), data).await?;
        debug!("Cached {} ({} bytes)", id, data.len());
        Ok(())
    }

    /// Drop a single artifact entry (content-address mismatch)
    pub async fn evict(&self, id: &ArtifactId) -> SkillsyncResult<()> {
        let path = self.artifact_path(id);
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Evicted {} from cache", id);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(SkillsyncError::io(
                format!("removing cache entry {}", path.display()),
                e,
            )),
        }
    }

    /// Remove cached artifacts, clones and lock files.
    ///
    /// Install records survive so the next install can still clean up.
    pub async fn clear(&self) -> SkillsyncResult<u64> {
        let mut freed = 0;
        for dir in [self.artifacts_dir(), self.git_repos_dir(), self.lockfiles_dir()] {
            freed += dir_size(&dir);
            match fs::remove_dir_all(&dir).await {
                Ok(()) => debug!("Removed {}", dir.display()),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(SkillsyncError::io(
                        format!("removing {}", dir.display()),
                        e,
                    ))
                }
            }
        }
        self.ensure_dirs().await?;
        Ok(freed)
    }

    /// Total bytes held in the cache
    pub fn size(&self) -> u64 {
        dir_size(&self.root)
    }
}

fn dir_size(dir: &Path) -> u64 {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter_map(|e| e.metadata().ok())
        .filter(|m| m.is_file())
        .map(|m| m.len())
        .sum()
}

/// Write `data` to a uniquely named sibling and rename it over `path`
pub(crate) async fn write_atomic(path: &Path, data: &[u8]) -> SkillsyncResult<()> {
    let parent = path
        .parent()
        .ok_or_else(|| SkillsyncError::Internal(format!("{} has no parent", path.display())))?;
    fs::create_dir_all(parent)
        .await
        .map_err(|e| SkillsyncError::io(format!("creating directory {}", parent.display()), e))?;

    let tmp = parent.join(format!(".tmp-{}", Uuid::new_v4()));
    fs::write(&tmp, data)
        .await
        .map_err(|e| SkillsyncError::io(format!("writing {}", tmp.display()), e))?;

    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(SkillsyncError::io(format!("replacing {}", path.display()), e));
    }
    Ok(())
}
