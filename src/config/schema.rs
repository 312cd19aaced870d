//! Configuration schema for skillsync
//!
//! Configuration is stored at `~/.config/skillsync/config.toml`

use crate::installer::DEFAULT_CONCURRENCY;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_CACHE_DIR: &str = "SKILLSYNC_CACHE_DIR";
pub const ENV_SERVER_URL: &str = "SKILLSYNC_SERVER_URL";
pub const ENV_SILENT: &str = "SKILLSYNC_SILENT";

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Artifact cache settings
    pub cache: CacheConfig,

    /// Install targets and fetch concurrency
    pub install: InstallConfig,

    /// Lock server
    pub server: ServerConfig,

    /// HTTP transport limits
    pub http: HttpConfig,
}

impl Config {
    /// Apply environment overrides through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_CACHE_DIR).filter(|v| !v.is_empty()) {
            self.cache.dir = Some(PathBuf::from(dir));
        }
        if let Some(url) = lookup(ENV_SERVER_URL).filter(|v| !v.is_empty()) {
            self.server.url = Some(url);
        }
        if let Some(flag) = lookup(ENV_SILENT) {
            self.general.silent = matches!(
                flag.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
    }
}

/// General application settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Only errors reach the log
    pub silent: bool,

    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            silent: false,
            log_format: "text".to_string(),
        }
    }
}

/// Cache location
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache root; platform cache dir when unset
    pub dir: Option<PathBuf>,
}

/// Install settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallConfig {
    /// Concurrent fetches
    pub concurrency: usize,

    /// Base for global artifacts; `~` expands to the home directory
    pub global_dir: String,

    /// Directory under the repository root for repo and path scoped artifacts
    pub repo_dir: String,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            global_dir: "~/.claude".to_string(),
            repo_dir: ".claude".to_string(),
        }
    }
}

impl InstallConfig {
    /// `global_dir` with `~` expanded
    pub fn global_dir_path(&self, home: Option<&Path>) -> PathBuf {
        match (self.global_dir.strip_prefix('~'), home) {
            (Some(rest), Some(home)) => home.join(rest.trim_start_matches('/')),
            _ => PathBuf::from(&self.global_dir),
        }
    }
}

/// Lock server settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Base URL serving `/api/skills/lock` and artifacts
    pub url: Option<String>,

    /// Bearer token sent with every request
    pub auth_token: Option<String>,
}

/// HTTP transport settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Largest response body accepted
    pub max_artifact_bytes: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            max_artifact_bytes: 100 * 1024 * 1024,
        }
    }
}
