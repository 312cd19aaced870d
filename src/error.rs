//! Error types for skillsync
//!
//! All modules use `SkillsyncResult<T>` as their return type. Parse,
//! validation and resolution errors abort a run before any I/O; fetch,
//! integrity and install errors are collected per artifact.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for skillsync operations
pub type SkillsyncResult<T> = Result<T, SkillsyncError>;

/// All errors that can occur in skillsync
#[derive(Error, Debug)]
pub enum SkillsyncError {
    // Manifest errors
    #[error("Failed to parse lock file: {0}")]
    Parse(String),

    #[error("Invalid lock file: {0}")]
    Validation(String),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    // Per-artifact errors
    #[error("Integrity check failed for {artifact}: {source}")]
    Integrity {
        artifact: String,
        #[source]
        source: IntegrityError,
    },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Failed to install {artifact}: {reason}")]
    Install { artifact: String, reason: String },

    #[error("Operation cancelled")]
    Cancelled,

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No lock file found. Pass --lock or configure a server URL")]
    LockNotFound,

    // Archive errors
    #[error("Invalid artifact archive: {0}")]
    Archive(String),

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command execution error: {command}, stderr: {stderr}")]
    CommandExecution { command: String, stderr: String },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

/// Dependency lookup and graph failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("Dependency not found: {name}{}", version.as_deref().map(|v| format!("@{}", v)).unwrap_or_default())]
    NotFound {
        name: String,
        version: Option<String>,
    },

    #[error("Ambiguous dependency '{name}': candidates {}; specify a version", candidates.join(", "))]
    AmbiguousName {
        name: String,
        candidates: Vec<String>,
    },

    #[error("Circular dependency: {}", format_cycle(path))]
    Cycle { path: Vec<String> },

    /// No single version satisfies every requester, or two resolved versions
    /// would occupy the same install location
    #[error("Conflicting versions of '{name}' from {}", requesters.join(", "))]
    Conflict {
        name: String,
        requesters: Vec<String>,
    },
}

fn format_cycle(path: &[String]) -> String {
    match path.first() {
        Some(first) => format!("{} -> {}", path.join(" -> "), first),
        None => String::new(),
    }
}

/// Declared-vs-fetched integrity mismatches
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntegrityError {
    #[error("{algorithm} mismatch: expected {expected}, got {actual}")]
    HashMismatch {
        algorithm: String,
        expected: String,
        actual: String,
    },

    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("unsupported hash algorithm: {0}")]
    UnsupportedAlgorithm(String),
}

/// Source retrieval failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Network error fetching {url}: {reason}")]
    Network { url: String, reason: String },

    #[error("Authentication required for {0}")]
    Auth(String),
}

impl SkillsyncError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a command execution error
    pub fn command_exec(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandExecution {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    /// Create an install error for an artifact
    pub fn install(artifact: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Install {
            artifact: artifact.into(),
            reason: reason.into(),
        }
    }

    /// Errors that abort the whole run before anything is applied
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Parse(_) | Self::Validation(_) | Self::Resolution(_) | Self::LockNotFound
        )
    }

    /// Errors that are collected per artifact while the run continues
    pub fn is_per_artifact(&self) -> bool {
        matches!(
            self,
            Self::Integrity { .. } | Self::Fetch(_) | Self::Install { .. } | Self::Archive(_)
        )
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::LockNotFound => Some("Create skills.lock or run with --lock <path-or-url>"),
            Self::Fetch(FetchError::Auth(_)) => {
                Some("Check your credentials for the artifact server or git host")
            }
            Self::Integrity { .. } => {
                Some("The published artifact differs from the lock file; regenerate the lock")
            }
            Self::Resolution(ResolutionError::AmbiguousName { .. }) => {
                Some("Add a version to the dependency reference")
            }
            Self::CommandFailed { .. } => Some("Is git installed and on your PATH?"),
            _ => None,
        }
    }
}
