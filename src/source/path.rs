//! Local path sources

use crate::archive;
use crate::error::{FetchError, SkillsyncError, SkillsyncResult};
use std::path::{Path, PathBuf};

/// Resolve a lock path: `~` expands to `home`, relative paths join `base_dir`
pub fn resolve_path(raw: &str, base_dir: &Path, home: Option<&Path>) -> PathBuf {
    if let Some(home) = home {
        if raw == "~" {
            return home.to_path_buf();
        }
        if let Some(rest) = raw.strip_prefix("~/") {
            return home.join(rest);
        }
    }

    let path = Path::new(raw);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

/// Read an artifact from disk; directories are packaged into an archive
pub async fn fetch_path(path: &Path) -> SkillsyncResult<Vec<u8>> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|_| FetchError::NotFound(path.display().to_string()))?;

    if meta.is_dir() {
        let dir = path.to_path_buf();
        return tokio::task::spawn_blocking(move || archive::package_dir(&dir))
            .await
            .map_err(|e| SkillsyncError::Internal(format!("packaging task failed: {}", e)))?;
    }

    tokio::fs::read(path)
        .await
        .map_err(|e| SkillsyncError::io(format!("reading {}", path.display()), e))
}
