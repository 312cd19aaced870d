//! Requirements file parsing
//!
//! The requirements file is the unlocked, hand-written input a lock file is
//! generated from. One requirement per line:
//!
//! ```text
//! # registry artifacts with optional version specifiers
//! code-review>=1.2,<2
//! helper==1.0.0
//! git+https://github.com/acme/skills.git@v1.4#name=deploy&path=skills/deploy
//! ./local/skills/formatter
//! https://skills.example.com/linter-1.0.0.zip
//! ```

use crate::error::{SkillsyncError, SkillsyncResult};
use crate::lock::model::{LockFile, Source};
use semver::{Version, VersionReq};
use std::fmt;
use std::path::Path;

/// One line of a requirements file
#[derive(Debug, Clone, PartialEq)]
pub enum Requirement {
    /// Artifact from the configured registry
    Registry {
        name: String,
        spec: Option<VersionReq>,
    },
    /// Artifact in a git repository
    Git {
        url: String,
        reference: Option<String>,
        name: Option<String>,
        path: Option<String>,
    },
    /// Artifact on the local filesystem
    Path(String),
    /// Artifact archive at a URL
    Http(String),
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Registry { name, spec: None } => write!(f, "{}", name),
            Self::Registry {
                name,
                spec: Some(spec),
            } => write!(f, "{} ({})", name, spec),
            Self::Git {
                url,
                reference,
                name,
                ..
            } => {
                write!(f, "git+{}", url)?;
                if let Some(r) = reference {
                    write!(f, "@{}", r)?;
                }
                if let Some(n) = name {
                    write!(f, " ({})", n)?;
                }
                Ok(())
            }
            Self::Path(p) => write!(f, "{}", p),
            Self::Http(u) => write!(f, "{}", u),
        }
    }
}

impl Requirement {
    /// Whether some artifact in the lock fulfils this requirement
    pub fn satisfied_by(&self, lock: &LockFile) -> bool {
        lock.artifacts.iter().any(|artifact| match (self, &artifact.source) {
            (Self::Registry { name, spec }, _) => {
                artifact.name == *name
                    && spec.as_ref().map_or(true, |req| {
                        Version::parse(&artifact.version)
                            .map(|v| req.matches(&v))
                            .unwrap_or(false)
                    })
            }
            (
                Self::Git {
                    url,
                    reference,
                    name,
                    path,
                },
                Source::Git(git),
            ) => {
                same_repo(url, &git.url)
                    && name.as_ref().map_or(true, |n| *n == artifact.name)
                    && path.as_deref().map(trim_rel) == git.subdirectory.as_deref().map(trim_rel)
                    && reference
                        .as_deref()
                        .filter(|r| looks_like_sha(r))
                        .map_or(true, |r| git.reference.starts_with(r))
            }
            (Self::Path(p), Source::Path(source)) => trim_rel(p) == trim_rel(&source.path),
            (Self::Http(u), Source::Http(source)) => *u == source.url,
            _ => false,
        })
    }
}

fn trim_rel(path: &str) -> &str {
    path.trim_start_matches("./").trim_end_matches('/')
}

fn same_repo(a: &str, b: &str) -> bool {
    let norm = |u: &str| u.trim_end_matches('/').trim_end_matches(".git").to_string();
    norm(a) == norm(b)
}

fn looks_like_sha(reference: &str) -> bool {
    reference.len() >= 7 && reference.chars().all(|c| c.is_ascii_hexdigit())
}

/// Read and parse a requirements file
pub async fn read_requirements(path: &Path) -> SkillsyncResult<Vec<Requirement>> {
    let content = tokio::fs::read_to_string(path).await.map_err(|e| {
        SkillsyncError::io(format!("reading requirements {}", path.display()), e)
    })?;
    parse_requirements(&content)
}

/// Parse requirements file content
pub fn parse_requirements(content: &str) -> SkillsyncResult<Vec<Requirement>> {
    content
        .lines()
        .enumerate()
        .map(|(i, line)| (i + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with('#'))
        .map(|(number, line)| {
            parse_line(line).map_err(|reason| {
                SkillsyncError::Parse(format!("requirements line {}: {}", number, reason))
            })
        })
        .collect()
}

fn parse_line(line: &str) -> Result<Requirement, String> {
    if let Some(rest) = line.strip_prefix("git+") {
        return parse_git(rest);
    }
    if line.starts_with("https://") || line.starts_with("http://") {
        return Ok(Requirement::Http(line.to_string()));
    }
    if is_local_path(line) {
        return Ok(Requirement::Path(line.to_string()));
    }
    parse_registry(line)
}

fn is_local_path(line: &str) -> bool {
    line.starts_with('.')
        || line.starts_with('/')
        || line.starts_with('~')
        || line.contains('/')
        || line.contains('\\')
        || line.ends_with(".zip")
}

fn parse_git(rest: &str) -> Result<Requirement, String> {
    let (location, fragment) = match rest.split_once('#') {
        Some((loc, frag)) => (loc, Some(frag)),
        None => (rest, None),
    };

    // The ref follows the last '@' unless that '@' belongs to user info.
    let (url, reference) = match location.rsplit_once('@') {
        Some((url, r)) if !r.is_empty() && !r.contains('/') && !r.contains(':') => {
            (url.to_string(), Some(r.to_string()))
        }
        _ => (location.to_string(), None),
    };
    if url.is_empty() {
        return Err("git requirement is missing a URL".to_string());
    }

    let mut name = None;
    let mut path = None;
    for pair in fragment.into_iter().flat_map(|f| f.split('&')) {
        match pair.split_once('=') {
            Some(("name", v)) if !v.is_empty() => name = Some(v.to_string()),
            Some(("path", v)) if !v.is_empty() => path = Some(v.to_string()),
            _ => return Err(format!("unrecognised git fragment '{}'", pair)),
        }
    }

    Ok(Requirement::Git {
        url,
        reference,
        name,
        path,
    })
}

fn parse_registry(line: &str) -> Result<Requirement, String> {
    let split = line
        .find(|c: char| matches!(c, '=' | '<' | '>' | '~' | '!'))
        .unwrap_or(line.len());
    let (name, spec) = line.split_at(split);
    let name = name.trim();

    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(format!("invalid artifact name '{}'", name));
    }

    let spec = spec.trim();
    let spec = if spec.is_empty() {
        None
    } else {
        Some(parse_specifier(spec)?)
    };

    Ok(Requirement::Registry {
        name: name.to_string(),
        spec,
    })
}

/// Translate `==, >=, >, <=, <, ~=` clauses into a semver requirement
fn parse_specifier(spec: &str) -> Result<VersionReq, String> {
    const OPERATORS: [&str; 6] = ["==", ">=", "<=", "~=", ">", "<"];

    let mut clauses = Vec::new();
    for clause in spec.split(',').map(str::trim) {
        let op = OPERATORS
            .iter()
            .find(|op| clause.starts_with(**op))
            .ok_or_else(|| format!("unsupported version specifier '{}'", clause))?;
        let version = clause[op.len()..].trim();
        if version.is_empty() {
            return Err(format!("missing version in '{}'", clause));
        }

        match *op {
            "==" => clauses.push(format!("={}", version)),
            "~=" => clauses.extend(compatible_release(version)?),
            other => clauses.push(format!("{}{}", other, version)),
        }
    }

    VersionReq::parse(&clauses.join(", "))
        .map_err(|e| format!("invalid version specifier '{}': {}", spec, e))
}

/// `~=X.Y` means `>=X.Y, <X+1`; `~=X.Y.Z` means `>=X.Y.Z, <X.Y+1`
fn compatible_release(version: &str) -> Result<Vec<String>, String> {
    let parts: Vec<u64> = version
        .split('.')
        .map(|p| p.parse::<u64>())
        .collect::<Result<_, _>>()
        .map_err(|_| format!("invalid version '{}' for ~=", version))?;

    let upper = match parts.as_slice() {
        [major, _] => format!("<{}", major + 1),
        [major, minor, _] => format!("<{}.{}", major, minor + 1),
        _ => return Err(format!("~= needs two or three version components, got '{}'", version)),
    };

    Ok(vec![format!(">={}", version), upper])
}
