//! Git sources
//!
//! Git is driven through the [`GitClient`] trait. [`GitCli`] shells out to the
//! `git` binary; tests substitute an in-memory fake.

use crate::archive::{self, METADATA_FILE};
use crate::cache::{CacheManager, CLONE_STAGING_PREFIX};
use crate::error::{FetchError, SkillsyncError, SkillsyncResult};
use crate::lock::GitSource;
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};
use uuid::Uuid;

/// Git operations needed by the fetcher and context detection
#[async_trait]
pub trait GitClient: Send + Sync {
    /// Resolve a ref to a full commit SHA inside a local clone
    async fn resolve_ref(&self, repo_dir: &Path, reference: &str) -> SkillsyncResult<String>;

    /// Clone `url` into `dest` if absent, otherwise fetch from origin
    async fn clone_or_fetch(&self, url: &str, dest: &Path) -> SkillsyncResult<()>;

    /// Check out a commit in a local clone
    async fn checkout(&self, repo_dir: &Path, commit: &str) -> SkillsyncResult<()>;

    /// Root of the repository containing `dir`, if any
    async fn toplevel(&self, dir: &Path) -> SkillsyncResult<Option<PathBuf>>;

    /// URL of the `origin` remote, if configured
    async fn remote_url(&self, repo_dir: &Path) -> SkillsyncResult<Option<String>>;
}

/// [`GitClient`] backed by the `git` executable
#[derive(Debug, Clone)]
pub struct GitCli {
    program: String,
}

impl GitCli {
    pub fn new() -> Self {
        Self {
            program: "git".to_string(),
        }
    }

    /// Execute a git command and return the output
    async fn exec(&self, args: &[&str]) -> SkillsyncResult<std::process::Output> {
        debug!("Executing: git {:?}", args);

        Command::new(&self.program)
            .args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| SkillsyncError::command_failed(format!("git {:?}", args), e))
    }

    /// Execute and return trimmed stdout, failing on non-zero exit
    async fn exec_ok(&self, args: &[&str]) -> SkillsyncResult<String> {
        let output = self.exec(args).await?;
        if !output.status.success() {
            return Err(SkillsyncError::command_exec(
                format!("git {}", args.join(" ")),
                String::from_utf8_lossy(&output.stderr).trim(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

impl Default for GitCli {
    fn default() -> Self {
        Self::new()
    }
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Map git's stderr onto the fetch taxonomy
fn classify_failure(url: &str, stderr: &str) -> FetchError {
    let lower = stderr.to_lowercase();
    if lower.contains("authentication failed")
        || lower.contains("could not read username")
        || lower.contains("permission denied")
    {
        FetchError::Auth(url.to_string())
    } else if lower.contains("not found") || lower.contains("does not exist") {
        FetchError::NotFound(url.to_string())
    } else {
        FetchError::Network {
            url: url.to_string(),
            reason: stderr.trim().to_string(),
        }
    }
}

#[async_trait]
impl GitClient for GitCli {
    async fn resolve_ref(&self, repo_dir: &Path, reference: &str) -> SkillsyncResult<String> {
        let dir = path_arg(repo_dir);
        let spec = format!("{}^{{commit}}", reference);
        self.exec_ok(&["-C", &dir, "rev-parse", "--verify", "--quiet", &spec])
            .await
            .map_err(|_| FetchError::NotFound(format!("commit {}", reference)).into())
    }

    async fn clone_or_fetch(&self, url: &str, dest: &Path) -> SkillsyncResult<()> {
        if dest.join(".git").is_dir() {
            let dir = path_arg(dest);
            let output = self
                .exec(&["-C", &dir, "fetch", "--quiet", "--tags", "origin"])
                .await?;
            if !output.status.success() {
                return Err(classify_failure(url, &String::from_utf8_lossy(&output.stderr)).into());
            }
            return Ok(());
        }

        let parent = dest
            .parent()
            .ok_or_else(|| SkillsyncError::Internal(format!("{} has no parent", dest.display())))?;
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| SkillsyncError::io(format!("creating {}", parent.display()), e))?;

        // Clone beside the destination so a failed clone leaves nothing behind
        let staging = parent.join(format!("{}{}", CLONE_STAGING_PREFIX, Uuid::new_v4()));
        let staging_arg = path_arg(&staging);
        info!("Cloning {}", url);
        let output = self
            .exec(&["clone", "--quiet", "--no-checkout", url, &staging_arg])
            .await?;
        if !output.status.success() {
            let _ = tokio::fs::remove_dir_all(&staging).await;
            return Err(classify_failure(url, &String::from_utf8_lossy(&output.stderr)).into());
        }

        tokio::fs::rename(&staging, dest)
            .await
            .map_err(|e| SkillsyncError::io(format!("moving clone to {}", dest.display()), e))
    }

    async fn checkout(&self, repo_dir: &Path, commit: &str) -> SkillsyncResult<()> {
        let dir = path_arg(repo_dir);
        self.exec_ok(&["-C", &dir, "checkout", "--quiet", "--force", "--detach", commit])
            .await
            .map(|_| ())
    }

    async fn toplevel(&self, dir: &Path) -> SkillsyncResult<Option<PathBuf>> {
        let dir = path_arg(dir);
        let output = self.exec(&["-C", &dir, "rev-parse", "--show-toplevel"]).await?;
        if !output.status.success() {
            return Ok(None);
        }
        let root = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok((!root.is_empty()).then(|| PathBuf::from(root)))
    }

    async fn remote_url(&self, repo_dir: &Path) -> SkillsyncResult<Option<String>> {
        let dir = path_arg(repo_dir);
        let output = self.exec(&["-C", &dir, "remote", "get-url", "origin"]).await?;
        if !output.status.success() {
            return Ok(None);
        }
        let url = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok((!url.is_empty()).then_some(url))
    }
}

/// Fetch an artifact from a pinned commit.
///
/// Looks under the subdirectory (or the repository root) for a packaged
/// `{name}-{version}.zip`, then for an unpacked artifact directory holding
/// `metadata.toml`.
pub async fn fetch_git(
    git: &dyn GitClient,
    cache: &CacheManager,
    source: &GitSource,
    name: &str,
    version: &str,
) -> SkillsyncResult<Vec<u8>> {
    let repo_dir = cache.git_repo_path(&source.url);

    // Reuse the clone when it already holds the pinned commit
    let known = if repo_dir.join(".git").is_dir() {
        git.resolve_ref(&repo_dir, &source.reference).await.ok()
    } else {
        None
    };
    let commit = match known {
        Some(commit) => commit,
        None => {
            git.clone_or_fetch(&source.url, &repo_dir).await?;
            git.resolve_ref(&repo_dir, &source.reference).await?
        }
    };
    git.checkout(&repo_dir, &commit).await?;
    debug!("Checked out {} at {}", source.url, commit);

    let base = match &source.subdirectory {
        Some(sub) => {
            let sub = Path::new(sub);
            if sub
                .components()
                .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
            {
                return Err(FetchError::NotFound(format!(
                    "subdirectory {} escapes the repository",
                    sub.display()
                ))
                .into());
            }
            repo_dir.join(sub)
        }
        None => repo_dir.clone(),
    };

    let packaged = base.join(format!("{}-{}.zip", name, version));
    if packaged.is_file() {
        return read_file(&packaged).await;
    }
    if base.join(METADATA_FILE).is_file() {
        return tokio::task::spawn_blocking(move || archive::package_dir(&base))
            .await
            .map_err(|e| SkillsyncError::Internal(format!("packaging task failed: {}", e)))?;
    }
    if base.is_file() {
        return read_file(&base).await;
    }

    Err(FetchError::NotFound(format!(
        "no artifact for {}@{} in {} at {}",
        name,
        version,
        source.url,
        source.subdirectory.as_deref().unwrap_or(".")
    ))
    .into())
}

async fn read_file(path: &Path) -> SkillsyncResult<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .map_err(|e| SkillsyncError::io(format!("reading {}", path.display()), e))
}
