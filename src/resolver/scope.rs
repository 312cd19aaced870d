//! Scope filtering and precedence
//!
//! An artifact applies when its scope is global (or absent), or when its
//! repository matches the current origin and, for path scopes, the working
//! directory lies at or below the scoped path. Among applicable artifacts
//! sharing a name, only those of the most specific scope survive
//! (path over repo over global, and the deepest of several matching path
//! scopes). The winning scope replaces the others whole; nothing is merged
//! field by field.

use super::context::{normalize_rel_path, normalize_repo_url, ExecutionContext};
use crate::lock::{Artifact, Scope};
use std::collections::HashMap;
use tracing::debug;

/// Whether a scope matches the execution context
pub fn applies(scope: &Scope, ctx: &ExecutionContext) -> bool {
    match (scope, &ctx.repo) {
        (Scope::Global, _) => true,
        (_, None) => false,
        (Scope::Repo { url }, Some(repo)) => normalize_repo_url(url) == repo.url,
        (Scope::Path { repo: url, path }, Some(repo)) => {
            normalize_repo_url(url) == repo.url && path_contains(path, &repo.relative_path)
        }
    }
}

/// `scoped` contains `current` when its segments are a prefix of current's
fn path_contains(scoped: &str, current: &str) -> bool {
    let scoped = normalize_rel_path(scoped);
    let current = normalize_rel_path(current);
    let mut current_parts = current.split('/').filter(|s| !s.is_empty());
    scoped
        .split('/')
        .filter(|s| !s.is_empty())
        .all(|part| current_parts.next() == Some(part))
}

/// Rank for precedence: scope kind first, then path depth
fn specificity(scope: &Scope) -> (u8, usize) {
    let depth = match scope {
        Scope::Path { path, .. } => normalize_rel_path(path)
            .split('/')
            .filter(|s| !s.is_empty())
            .count(),
        _ => 0,
    };
    (scope.precedence(), depth)
}

/// Filter the lock's artifacts for this context and client.
///
/// Client filtering runs first, then scope applicability, then precedence.
/// Declaration order is preserved.
pub fn filter_artifacts<'a>(
    artifacts: &'a [Artifact],
    ctx: &ExecutionContext,
    client: Option<&str>,
) -> Vec<&'a Artifact> {
    let applicable: Vec<&Artifact> = artifacts
        .iter()
        .filter(|a| client.map_or(true, |c| a.supports_client(c)))
        .filter(|a| applies(&a.effective_scope(), ctx))
        .collect();

    let mut best: HashMap<&str, (u8, usize)> = HashMap::new();
    for artifact in &applicable {
        let rank = specificity(&artifact.effective_scope());
        best.entry(artifact.name.as_str())
            .and_modify(|r| *r = (*r).max(rank))
            .or_insert(rank);
    }

    applicable
        .into_iter()
        .filter(|a| {
            let keep = best.get(a.name.as_str()) == Some(&specificity(&a.effective_scope()));
            if !keep {
                debug!("{} overridden by a more specific scope", a.id());
            }
            keep
        })
        .collect()
}
