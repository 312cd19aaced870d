//! Lock file instance cache
//!
//! Remembers the last lock content fetched from each source together with
//! the server's ETag, so an unchanged lock is answered with `304` and the
//! cached copy is reused.

use super::{write_atomic, CacheManager};
use crate::error::SkillsyncResult;
use crate::source::integrity::url_hash;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, warn};

/// Last-seen lock content for one source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedLock {
    pub source: String,
    pub etag: Option<String>,
    pub content: String,
}

impl CacheManager {
    fn lock_entry_path(&self, source: &str) -> PathBuf {
        self.lockfiles_dir().join(format!("{}.json", url_hash(source)))
    }

    /// Cached lock for a source identity; corrupt entries read as misses
    pub async fn cached_lock(&self, source: &str) -> Option<CachedLock> {
        let path = self.lock_entry_path(source);
        let raw = tokio::fs::read(&path).await.ok()?;

        match serde_json::from_slice::<CachedLock>(&raw) {
            Ok(entry) if entry.source == source => Some(entry),
            Ok(_) => {
                debug!("Lock cache entry {} belongs to another source", path.display());
                None
            }
            Err(e) => {
                warn!("Ignoring corrupt lock cache {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Remember lock content and its ETag
    pub async fn store_lock(&self, entry: &CachedLock) -> SkillsyncResult<()> {
        let data = serde_json::to_vec_pretty(entry)?;
        write_atomic(&self.lock_entry_path(&entry.source), &data).await?;
        debug!("Cached lock from {} (etag {:?})", entry.source, entry.etag);
        Ok(())
    }
}
