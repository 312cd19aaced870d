//! Lock file loading
//!
//! A lock comes from a local file or from a URL. URL sources are fetched
//! conditionally: the cached ETag is sent as `If-None-Match` and a `304`
//! answer reuses the cached content without fetching a fresh body.

use crate::cache::{CacheManager, CachedLock};
use crate::error::{FetchError, SkillsyncError, SkillsyncResult};
use crate::lock::model::LockFile;
use crate::source::http::{self, Fetched, HttpTransport};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Lock file looked for in the working directory
pub const DEFAULT_LOCK_FILE: &str = "skills.lock";

/// Where a lock file comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockSource {
    Path(PathBuf),
    Url(String),
}

impl LockSource {
    /// Interpret a `--lock` argument
    pub fn parse(arg: &str) -> Self {
        if arg.starts_with("https://") || arg.starts_with("http://") {
            Self::Url(arg.to_string())
        } else {
            Self::Path(PathBuf::from(arg))
        }
    }

    /// Pick the lock source when none was given: a local `skills.lock`,
    /// else the server's lock endpoint
    pub fn discover(cwd: &Path, server_url: Option<&str>) -> SkillsyncResult<Self> {
        let local = cwd.join(DEFAULT_LOCK_FILE);
        if local.is_file() {
            return Ok(Self::Path(local));
        }
        match server_url {
            Some(server) => Ok(Self::Url(format!(
                "{}/api/skills/lock",
                server.trim_end_matches('/')
            ))),
            None => Err(SkillsyncError::LockNotFound),
        }
    }
}

impl fmt::Display for LockSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(p) => write!(f, "{}", p.display()),
            Self::Url(u) => write!(f, "{}", u),
        }
    }
}

/// A parsed lock plus where relative path sources resolve from
#[derive(Debug, Clone)]
pub struct LoadedLock {
    pub lock: LockFile,
    pub base_dir: PathBuf,
    /// Content came from the lock cache rather than a fresh body
    pub from_cache: bool,
}

/// Load and validate a lock file
pub async fn load_lock(
    source: &LockSource,
    transport: Arc<dyn HttpTransport>,
    cache: &CacheManager,
    cwd: &Path,
) -> SkillsyncResult<LoadedLock> {
    match source {
        LockSource::Path(path) => {
            let path = if path.is_absolute() {
                path.clone()
            } else {
                cwd.join(path)
            };
            if !path.is_file() {
                return Err(SkillsyncError::User(format!(
                    "lock file not found: {}",
                    path.display()
                )));
            }
            let lock = LockFile::from_file(&path).await?;
            let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_else(|| cwd.to_path_buf());
            debug!("Loaded lock {} from {}", lock.version, path.display());
            Ok(LoadedLock {
                lock,
                base_dir,
                from_cache: false,
            })
        }
        LockSource::Url(url) => {
            let lock = load_remote(url, transport, cache).await?;
            Ok(LoadedLock {
                base_dir: cwd.to_path_buf(),
                ..lock
            })
        }
    }
}

async fn load_remote(
    url: &str,
    transport: Arc<dyn HttpTransport>,
    cache: &CacheManager,
) -> SkillsyncResult<LoadedLock> {
    let cached = cache.cached_lock(url).await;
    let etag = cached.as_ref().and_then(|c| c.etag.clone());

    let fetched = match http::fetch(transport, url, etag).await {
        Ok(fetched) => fetched,
        Err(SkillsyncError::Fetch(FetchError::Network { reason, .. })) if cached.is_some() => {
            warn!("Could not reach {} ({}); using cached lock", url, reason);
            Fetched::NotModified
        }
        Err(e) => return Err(e),
    };

    match (fetched, cached) {
        (Fetched::NotModified, Some(entry)) => {
            info!("Lock at {} unchanged; using cached copy", url);
            Ok(LoadedLock {
                lock: LockFile::parse(&entry.content)?,
                base_dir: PathBuf::new(),
                from_cache: true,
            })
        }
        (Fetched::NotModified, None) => Err(SkillsyncError::Internal(format!(
            "{} answered 304 without a cached lock",
            url
        ))),
        (Fetched::Body { data, etag }, _) => {
            let content = String::from_utf8(data)
                .map_err(|_| SkillsyncError::Parse(format!("lock from {} is not UTF-8", url)))?;
            let lock = LockFile::parse(&content)?;

            let entry = CachedLock {
                source: url.to_string(),
                etag,
                content,
            };
            if let Err(e) = cache.store_lock(&entry).await {
                warn!("Failed to cache lock from {}: {}", url, e);
            }

            Ok(LoadedLock {
                lock,
                base_dir: PathBuf::new(),
                from_cache: false,
            })
        }
    }
}
