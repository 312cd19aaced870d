//! Source fetching
//!
//! One entry point, [`SourceFetcher::fetch`], matched over the three source
//! kinds:
//!
//! - **HTTP**: cache first, re-verified against the declared hashes; on a
//!   miss the body is downloaded, verified, then cached by (name, version)
//! - **Git**: clone or fetch into the repo cache, check out the pinned
//!   commit, locate the artifact
//! - **Path**: read from disk relative to the lock file
//!
//! Integrity is checked for HTTP sources only. Git trusts the pinned SHA and
//! paths are local.

pub mod git;
pub mod http;
pub mod integrity;
pub mod path;

pub use git::{GitCli, GitClient};
pub use http::{HttpTransport, UreqTransport};

use crate::cache::CacheManager;
use crate::error::{FetchError, SkillsyncError, SkillsyncResult};
use crate::lock::{Artifact, HttpSource, Source};
use self::http::Fetched;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Fetches artifact bytes from any source kind
pub struct SourceFetcher {
    http: Arc<dyn HttpTransport>,
    git: Arc<dyn GitClient>,
    cache: CacheManager,
    base_dir: PathBuf,
    home_dir: Option<PathBuf>,
    repo_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl SourceFetcher {
    pub fn new(http: Arc<dyn HttpTransport>, git: Arc<dyn GitClient>, cache: CacheManager) -> Self {
        Self {
            http,
            git,
            cache,
            base_dir: PathBuf::from("."),
            home_dir: None,
            repo_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Directory relative path sources resolve against
    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    /// Directory `~` expands to in path sources
    pub fn with_home_dir(mut self, home_dir: Option<PathBuf>) -> Self {
        self.home_dir = home_dir;
        self
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    /// Retrieve the bytes for an artifact
    pub async fn fetch(&self, artifact: &Artifact) -> SkillsyncResult<Vec<u8>> {
        debug!("Fetching {} from {}", artifact.id(), artifact.source.describe());

        match &artifact.source {
            Source::Http(source) => self.fetch_http(artifact, source).await,
            Source::Git(source) => {
                // One checkout at a time per clone
                let lock = self.repo_lock(&source.url);
                let _guard = lock.lock().await;
                git::fetch_git(
                    self.git.as_ref(),
                    &self.cache,
                    source,
                    &artifact.name,
                    &artifact.version,
                )
                .await
            }
            Source::Path(source) => {
                let resolved =
                    path::resolve_path(&source.path, &self.base_dir, self.home_dir.as_deref());
                path::fetch_path(&resolved).await
            }
        }
    }

    async fn fetch_http(&self, artifact: &Artifact, source: &HttpSource) -> SkillsyncResult<Vec<u8>> {
        let id = artifact.id();

        if let Some(cached) = self.cache.get(&id).await {
            match integrity::verify(&cached, &source.hashes, source.size) {
                Ok(()) => return Ok(cached),
                Err(e) => {
                    warn!("Cached {} failed verification ({}); refetching", id, e);
                    self.cache.evict(&id).await?;
                }
            }
        }

        let data = match http::fetch(self.http.clone(), &source.url, None).await? {
            Fetched::Body { data, .. } => data,
            Fetched::NotModified => {
                return Err(FetchError::Network {
                    url: source.url.clone(),
                    reason: "unexpected 304 for unconditional request".to_string(),
                }
                .into())
            }
        };

        integrity::verify(&data, &source.hashes, source.size).map_err(|e| {
            SkillsyncError::Integrity {
                artifact: id.to_string(),
                source: e,
            }
        })?;

        if let Err(e) = self.cache.put(&id, &data).await {
            warn!("Failed to cache {}: {}", id, e);
        }
        Ok(data)
    }

    fn repo_lock(&self, url: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.repo_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(url.to_string()).or_default().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::git::fake::FakeGit;
    use super::http::fake::FakeTransport;
    use super::*;
    use crate::error::IntegrityError;
    use crate::lock::fixtures::{artifact, http_artifact};
    use crate::lock::PathSource;
    use tempfile::TempDir;

    fn fetcher(temp: &TempDir, transport: Arc<FakeTransport>) -> SourceFetcher {
        SourceFetcher::new(
            transport,
            Arc::new(FakeGit::new()),
            CacheManager::new(temp.path().join("cache")),
        )
        .with_base_dir(temp.path())
    }

    fn url_of(a: &Artifact) -> String {
        match &a.source {
            Source::Http(h) => h.url.clone(),
            _ => panic!("not an HTTP artifact"),
        }
    }

    #[tokio::test]
    async fn http_verifies_and_caches() {
        let temp = TempDir::new().unwrap();
        let transport = Arc::new(FakeTransport::new());
        let review = http_artifact("review", "1.0.0", b"archive");
        transport.serve(&url_of(&review), 200, None, b"archive");
        let fetcher = fetcher(&temp, transport.clone());

        assert_eq!(fetcher.fetch(&review).await.unwrap(), b"archive");
        assert_eq!(fetcher.fetch(&review).await.unwrap(), b"archive");

        assert_eq!(transport.request_count(&url_of(&review)), 1);
        assert!(fetcher.cache().get(&review.id()).await.is_some());
    }

    #[tokio::test]
    async fn http_hash_mismatch_is_integrity_error() {
        let temp = TempDir::new().unwrap();
        let transport = Arc::new(FakeTransport::new());
        let review = http_artifact("review", "1.0.0", b"expected");
        transport.serve(&url_of(&review), 200, None, b"tampered");
        let fetcher = fetcher(&temp, transport);

        let err = fetcher.fetch(&review).await.unwrap_err();

        assert!(matches!(
            err,
            SkillsyncError::Integrity {
                source: IntegrityError::SizeMismatch { .. } | IntegrityError::HashMismatch { .. },
                ..
            }
        ));
        assert!(fetcher.cache().get(&review.id()).await.is_none());
    }

    #[tokio::test]
    async fn corrupt_cache_entry_is_refetched() {
        let temp = TempDir::new().unwrap();
        let transport = Arc::new(FakeTransport::new());
        let review = http_artifact("review", "1.0.0", b"archive");
        transport.serve(&url_of(&review), 200, None, b"archive");
        let fetcher = fetcher(&temp, transport.clone());
        fetcher.cache().put(&review.id(), b"garbage").await.unwrap();

        assert_eq!(fetcher.fetch(&review).await.unwrap(), b"archive");
        assert_eq!(transport.request_count(&url_of(&review)), 1);
        assert_eq!(fetcher.cache().get(&review.id()).await.unwrap(), b"archive");
    }

    #[tokio::test]
    async fn path_resolves_against_base_dir() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("local.zip"), b"local").unwrap();
        let mut local = artifact("local", "1.0.0");
        local.source = Source::Path(PathSource {
            path: "./local.zip".to_string(),
        });
        let fetcher = fetcher(&temp, Arc::new(FakeTransport::new()));

        assert_eq!(fetcher.fetch(&local).await.unwrap(), b"local");
    }
}
