//! Lock file data model
//!
//! A lock instance is a closed-world snapshot: every artifact carries exactly
//! one source, and dependency references resolve only against artifacts of
//! the same instance. The on-disk form is TOML:
//!
//! ```toml
//! lock-version = "1.0"
//! version = "3f2a9c"
//! created-by = "skillsync-server/2.4.0"
//!
//! [[artifacts]]
//! name = "code-review"
//! version = "1.2.0"
//! type = "skill"
//! scope = "repo"
//! repo = "https://github.com/acme/app"
//!
//! [artifacts.source-http]
//! url = "https://skills.example.com/code-review-1.2.0.zip"
//! hashes = { sha256 = "..." }
//!
//! [[artifacts.dependencies]]
//! name = "helper"
//! version = "1.0.0"
//! ```

use crate::error::{ResolutionError, SkillsyncError, SkillsyncResult};
use crate::source::integrity::HashAlgorithm;
use chrono::{DateTime, Utc};
use semver::{Version, VersionReq};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;

/// Major lock format version this build understands
pub const SUPPORTED_LOCK_MAJOR: u64 = 1;

/// Lock format version written by this build
pub const CURRENT_LOCK_VERSION: &str = "1.0";

/// Kind of installable artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactType {
    Skill,
    Agent,
    Command,
    Hook,
    Mcp,
    McpRemote,
}

impl ArtifactType {
    /// Directory under the target base that holds artifacts of this type
    pub fn install_dir(&self) -> &'static str {
        match self {
            Self::Skill => "skills",
            Self::Agent => "agents",
            Self::Command => "commands",
            Self::Hook => "hooks",
            Self::Mcp | Self::McpRemote => "mcp-servers",
        }
    }
}

impl fmt::Display for ArtifactType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Skill => "skill",
            Self::Agent => "agent",
            Self::Command => "command",
            Self::Hook => "hook",
            Self::Mcp => "mcp",
            Self::McpRemote => "mcp-remote",
        };
        write!(f, "{}", name)
    }
}

/// Artifact served over HTTP(S); hashes are mandatory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct HttpSource {
    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<DateTime<Utc>>,

    /// Algorithm name to lowercase hex digest
    #[serde(default)]
    pub hashes: BTreeMap<String, String>,
}

/// Artifact stored in a git repository, pinned to a commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitSource {
    pub url: String,

    /// Full commit SHA
    #[serde(rename = "ref")]
    pub reference: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subdirectory: Option<String>,
}

/// Artifact on the local filesystem
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathSource {
    pub path: String,
}

/// Where an artifact's bytes come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Http(HttpSource),
    Git(GitSource),
    Path(PathSource),
}

impl Source {
    /// Short description used in logs
    pub fn describe(&self) -> String {
        match self {
            Self::Http(s) => s.url.clone(),
            Self::Git(s) => format!("{}@{}", s.url, short_sha(&s.reference)),
            Self::Path(s) => s.path.clone(),
        }
    }
}

fn short_sha(sha: &str) -> &str {
    sha.get(..12).unwrap_or(sha)
}

/// Install-context boundary of an artifact
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    Global,
    Repo { url: String },
    Path { repo: String, path: String },
}

impl Scope {
    /// Higher wins: path > repo > global
    pub fn precedence(&self) -> u8 {
        match self {
            Self::Global => 0,
            Self::Repo { .. } => 1,
            Self::Path { .. } => 2,
        }
    }

    /// Stable string identity used in install records
    pub fn key(&self) -> String {
        match self {
            Self::Global => "global".to_string(),
            Self::Repo { url } => format!("repo:{}", url),
            Self::Path { repo, path } => format!("path:{}#{}", repo, path),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum ScopeKind {
    Global,
    Repo,
    Path,
}

/// Reference from one artifact to another in the same lock instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencyRef {
    pub name: String,

    /// Exact version or a semver range
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl DependencyRef {
    pub fn new(name: impl Into<String>, version: Option<&str>) -> Self {
        Self {
            name: name.into(),
            version: version.map(str::to_string),
        }
    }
}

impl fmt::Display for DependencyRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.version {
            Some(v) => write!(f, "{}@{}", self.name, v),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Identity of an artifact within a lock instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArtifactId {
    pub name: String,
    pub version: String,
}

impl fmt::Display for ArtifactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// A named, versioned, typed unit of installable behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub name: String,
    pub version: String,
    pub artifact_type: ArtifactType,
    /// Compatible clients; empty means all
    pub clients: Vec<String>,
    pub source: Source,
    pub scope: Option<Scope>,
    pub dependencies: Vec<DependencyRef>,
}

impl Artifact {
    pub fn id(&self) -> ArtifactId {
        ArtifactId {
            name: self.name.clone(),
            version: self.version.clone(),
        }
    }

    /// Scope with unscoped artifacts treated as global
    pub fn effective_scope(&self) -> Scope {
        self.scope.clone().unwrap_or(Scope::Global)
    }

    /// Whether this artifact applies to the given client tag
    pub fn supports_client(&self, client: &str) -> bool {
        self.clients.is_empty() || self.clients.iter().any(|c| c == client)
    }
}

/// Fully-resolved, reproducible snapshot of artifacts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockFile {
    pub lock_version: String,
    /// Instance hash / ETag
    pub version: String,
    pub created_by: String,
    pub artifacts: Vec<Artifact>,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawLockFile {
    lock_version: String,
    version: String,
    #[serde(default)]
    created_by: String,
    #[serde(default)]
    artifacts: Vec<RawArtifact>,
}

// Field order matters: toml emits plain values before tables.
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawArtifact {
    name: String,
    version: String,
    #[serde(rename = "type")]
    artifact_type: ArtifactType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    clients: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    scope: Option<ScopeKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    repo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source_http: Option<HttpSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source_git: Option<GitSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    source_path: Option<PathSource>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    dependencies: Vec<DependencyRef>,
}

impl LockFile {
    /// Create an empty lock instance
    pub fn new(version: impl Into<String>, created_by: impl Into<String>) -> Self {
        Self {
            lock_version: CURRENT_LOCK_VERSION.to_string(),
            version: version.into(),
            created_by: created_by.into(),
            artifacts: Vec::new(),
        }
    }

    /// Read and parse a lock file from disk
    pub async fn from_file(path: &Path) -> SkillsyncResult<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            SkillsyncError::io(format!("reading lock file {}", path.display()), e)
        })?;
        Self::parse(&content)
    }

    /// Parse and validate lock file content
    pub fn parse(content: &str) -> SkillsyncResult<Self> {
        let raw: RawLockFile =
            toml::from_str(content).map_err(|e| SkillsyncError::Parse(e.to_string()))?;
        Self::from_raw(raw)
    }

    /// Serialize to TOML; the exact inverse of [`LockFile::parse`]
    pub fn to_toml(&self) -> SkillsyncResult<String> {
        let raw = RawLockFile {
            lock_version: self.lock_version.clone(),
            version: self.version.clone(),
            created_by: self.created_by.clone(),
            artifacts: self.artifacts.iter().map(RawArtifact::from).collect(),
        };
        Ok(toml::to_string_pretty(&raw)?)
    }

    /// Look up a dependency reference within this instance
    pub fn resolve(&self, dep: &DependencyRef) -> Result<&Artifact, ResolutionError> {
        resolve_ref(&self.artifacts, dep)
    }

    /// Find an artifact by identity
    pub fn find(&self, id: &ArtifactId) -> Option<&Artifact> {
        self.artifacts
            .iter()
            .find(|a| a.name == id.name && a.version == id.version)
    }

    fn from_raw(raw: RawLockFile) -> SkillsyncResult<Self> {
        validate_lock_version(&raw.lock_version)?;

        let mut seen = HashSet::new();
        let mut artifacts = Vec::with_capacity(raw.artifacts.len());
        for raw_artifact in raw.artifacts {
            let artifact = Artifact::try_from(raw_artifact)?;
            if !seen.insert(artifact.id()) {
                return Err(SkillsyncError::Validation(format!(
                    "duplicate artifact {}",
                    artifact.id()
                )));
            }
            artifacts.push(artifact);
        }

        Ok(Self {
            lock_version: raw.lock_version,
            version: raw.version,
            created_by: raw.created_by,
            artifacts,
        })
    }
}

/// Resolve a dependency reference against a candidate set.
///
/// Unversioned references must match exactly one artifact by name. Versioned
/// references prefer an exact version match, then the highest version
/// satisfying the reference as a semver range.
pub fn resolve_ref<'a, I>(candidates: I, dep: &DependencyRef) -> Result<&'a Artifact, ResolutionError>
where
    I: IntoIterator<Item = &'a Artifact>,
{
    let named: Vec<&'a Artifact> = candidates
        .into_iter()
        .filter(|a| a.name == dep.name)
        .collect();
    let not_found = || ResolutionError::NotFound {
        name: dep.name.clone(),
        version: dep.version.clone(),
    };

    let Some(wanted) = dep.version.as_deref() else {
        return match named.as_slice() {
            [] => Err(not_found()),
            [only] => Ok(*only),
            many => Err(ResolutionError::AmbiguousName {
                name: dep.name.clone(),
                candidates: many.iter().map(|a| a.id().to_string()).collect(),
            }),
        };
    };

    if let Some(exact) = named.iter().find(|a| a.version == wanted) {
        return Ok(*exact);
    }

    named
        .into_iter()
        .filter_map(|a| {
            let version = Version::parse(&a.version).ok()?;
            version_matches(&version, wanted).then_some((version, a))
        })
        .max_by(|x, y| x.0.cmp(&y.0))
        .map(|(_, a)| a)
        .ok_or_else(not_found)
}

/// Whether a concrete version satisfies a constraint (exact string or semver range)
pub fn version_matches(version: &Version, constraint: &str) -> bool {
    if version.to_string() == constraint {
        return true;
    }
    VersionReq::parse(constraint)
        .map(|req| req.matches(version))
        .unwrap_or(false)
}

fn validate_lock_version(lock_version: &str) -> SkillsyncResult<()> {
    let major = lock_version
        .split('.')
        .next()
        .and_then(|m| m.trim().parse::<u64>().ok())
        .ok_or_else(|| {
            SkillsyncError::Validation(format!("malformed lock-version '{}'", lock_version))
        })?;

    if major != SUPPORTED_LOCK_MAJOR {
        return Err(SkillsyncError::Validation(format!(
            "unsupported lock-version {} (this build reads {}.x)",
            lock_version, SUPPORTED_LOCK_MAJOR
        )));
    }
    Ok(())
}

/// Reject names that could escape an install directory
fn validate_artifact_name(name: &str) -> SkillsyncResult<()> {
    if name.is_empty() {
        return Err(SkillsyncError::Validation(
            "artifact name cannot be empty".to_string(),
        ));
    }
    if name.contains("..")
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(SkillsyncError::Validation(format!(
            "invalid artifact name '{}': use alphanumerics, '-', '_' or '.'",
            name
        )));
    }
    Ok(())
}

fn is_full_sha(reference: &str) -> bool {
    matches!(reference.len(), 40 | 64) && reference.chars().all(|c| c.is_ascii_hexdigit())
}

fn invalid(artifact: &str, reason: impl fmt::Display) -> SkillsyncError {
    SkillsyncError::Validation(format!("{}: {}", artifact, reason))
}

impl TryFrom<RawArtifact> for Artifact {
    type Error = SkillsyncError;

    fn try_from(raw: RawArtifact) -> SkillsyncResult<Self> {
        validate_artifact_name(&raw.name)?;
        let label = format!("{}@{}", raw.name, raw.version);

        Version::parse(&raw.version)
            .map_err(|e| invalid(&label, format!("version is not semver: {}", e)))?;

        let scope = parse_scope(&label, raw.scope, raw.repo, raw.path)?;
        let source = parse_source(&label, raw.source_http, raw.source_git, raw.source_path)?;

        if let Some(dep) = raw.dependencies.iter().find(|d| d.name.is_empty()) {
            return Err(invalid(&label, format!("dependency with empty name ({})", dep)));
        }

        Ok(Self {
            name: raw.name,
            version: raw.version,
            artifact_type: raw.artifact_type,
            clients: raw.clients,
            source,
            scope,
            dependencies: raw.dependencies,
        })
    }
}

fn parse_scope(
    label: &str,
    kind: Option<ScopeKind>,
    repo: Option<String>,
    path: Option<String>,
) -> SkillsyncResult<Option<Scope>> {
    let kind = match (kind, &repo, &path) {
        (Some(kind), _, _) => kind,
        (None, None, None) => return Ok(None),
        (None, Some(_), None) => ScopeKind::Repo,
        (None, Some(_), Some(_)) => ScopeKind::Path,
        (None, None, Some(_)) => return Err(invalid(label, "path scope requires a repo")),
    };

    match (kind, repo, path) {
        (ScopeKind::Global, None, None) => Ok(Some(Scope::Global)),
        (ScopeKind::Global, _, _) => Err(invalid(label, "global scope cannot set repo or path")),
        (ScopeKind::Repo, Some(url), None) if !url.is_empty() => Ok(Some(Scope::Repo { url })),
        (ScopeKind::Repo, _, Some(_)) => Err(invalid(label, "repo scope cannot set a path")),
        (ScopeKind::Repo, _, None) => Err(invalid(label, "repo scope requires a repo URL")),
        (ScopeKind::Path, Some(repo), Some(path)) if !repo.is_empty() && !path.is_empty() => {
            Ok(Some(Scope::Path { repo, path }))
        }
        (ScopeKind::Path, _, _) => Err(invalid(label, "path scope requires a repo and a path")),
    }
}

fn parse_source(
    label: &str,
    http: Option<HttpSource>,
    git: Option<GitSource>,
    path: Option<PathSource>,
) -> SkillsyncResult<Source> {
    let source = match (http, git, path) {
        (Some(http), None, None) => Source::Http(http),
        (None, Some(git), None) => Source::Git(git),
        (None, None, Some(path)) => Source::Path(path),
        (None, None, None) => return Err(invalid(label, "missing source")),
        _ => return Err(invalid(label, "multiple sources; exactly one is allowed")),
    };

    match &source {
        Source::Http(http) => {
            if !(http.url.starts_with("https://") || http.url.starts_with("http://")) {
                return Err(invalid(label, format!("source URL '{}' is not http(s)", http.url)));
            }
            if http.hashes.is_empty() {
                return Err(invalid(label, "HTTP source requires at least one hash"));
            }
            for (algorithm, digest) in &http.hashes {
                let algo = HashAlgorithm::parse(algorithm)
                    .ok_or_else(|| invalid(label, format!("unsupported hash '{}'", algorithm)))?;
                if digest.len() != algo.hex_len() || !digest.chars().all(|c| c.is_ascii_hexdigit())
                {
                    return Err(invalid(label, format!("malformed {} digest", algorithm)));
                }
            }
        }
        Source::Git(git) => {
            if git.url.is_empty() {
                return Err(invalid(label, "git source requires a URL"));
            }
            if !is_full_sha(&git.reference) {
                return Err(invalid(
                    label,
                    format!("git ref '{}' must be a full commit SHA", git.reference),
                ));
            }
        }
        Source::Path(path) => {
            if path.path.is_empty() {
                return Err(invalid(label, "path source requires a path"));
            }
        }
    }

    Ok(source)
}

impl From<&Artifact> for RawArtifact {
    fn from(artifact: &Artifact) -> Self {
        let (scope, repo, path) = match &artifact.scope {
            None => (None, None, None),
            Some(Scope::Global) => (Some(ScopeKind::Global), None, None),
            Some(Scope::Repo { url }) => (Some(ScopeKind::Repo), Some(url.clone()), None),
            Some(Scope::Path { repo, path }) => {
                (Some(ScopeKind::Path), Some(repo.clone()), Some(path.clone()))
            }
        };
        let (source_http, source_git, source_path) = match &artifact.source {
            Source::Http(s) => (Some(s.clone()), None, None),
            Source::Git(s) => (None, Some(s.clone()), None),
            Source::Path(s) => (None, None, Some(s.clone())),
        };

        Self {
            name: artifact.name.clone(),
            version: artifact.version.clone(),
            artifact_type: artifact.artifact_type,
            clients: artifact.clients.clone(),
            scope,
            repo,
            path,
            source_http,
            source_git,
            source_path,
            dependencies: artifact.dependencies.clone(),
        }
    }
}
