//! Execution context detection
//!
//! The context is where the tool runs: inside a repository (with its origin
//! URL and the working directory's path relative to the root) or outside
//! any repository, where only global artifacts apply.

use crate::source::GitClient;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Repository the tool runs in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoContext {
    /// Normalized origin URL
    pub url: String,
    pub root: PathBuf,
    /// Working directory relative to `root`, `/`-separated, empty at the root
    pub relative_path: String,
}

/// Current execution context
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionContext {
    pub repo: Option<RepoContext>,
}

impl ExecutionContext {
    /// Outside any repository
    pub fn global() -> Self {
        Self { repo: None }
    }

    pub fn in_repo(url: &str, root: impl Into<PathBuf>, relative_path: &str) -> Self {
        Self {
            repo: Some(RepoContext {
                url: normalize_repo_url(url),
                root: root.into(),
                relative_path: normalize_rel_path(relative_path),
            }),
        }
    }

    /// Detect the context for `cwd`. Any git failure yields the global context.
    pub async fn detect(git: &dyn GitClient, cwd: &Path) -> Self {
        let root = match git.toplevel(cwd).await {
            Ok(Some(root)) => root,
            Ok(None) => {
                debug!("{} is not inside a git repository", cwd.display());
                return Self::global();
            }
            Err(e) => {
                debug!("Repository detection failed: {}", e);
                return Self::global();
            }
        };

        let url = match git.remote_url(&root).await {
            Ok(Some(url)) => url,
            _ => {
                debug!("Repository at {} has no origin remote", root.display());
                return Self::global();
            }
        };

        let relative = relative_to(cwd, &root).await;
        debug!("Context: {} at '{}'", url, relative);
        Self::in_repo(&url, root, &relative)
    }
}

async fn relative_to(cwd: &Path, root: &Path) -> String {
    let cwd = tokio::fs::canonicalize(cwd)
        .await
        .unwrap_or_else(|_| cwd.to_path_buf());
    let root = tokio::fs::canonicalize(root)
        .await
        .unwrap_or_else(|_| root.to_path_buf());

    cwd.strip_prefix(&root)
        .map(|rel| {
            rel.components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/")
        })
        .unwrap_or_default()
}

/// Compare-ready repository URL: trimmed, no trailing `/` or `.git`
pub fn normalize_repo_url(url: &str) -> String {
    let trimmed = url.trim().trim_end_matches('/');
    trimmed
        .strip_suffix(".git")
        .unwrap_or(trimmed)
        .trim_end_matches('/')
        .to_string()
}

/// Path segments without empty or `.` parts, joined by `/`
pub fn normalize_rel_path(path: &str) -> String {
    path.split(['/', '\\'])
        .filter(|s| !s.is_empty() && *s != ".")
        .collect::<Vec<_>>()
        .join("/")
}
