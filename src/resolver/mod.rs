//! Resolution of a lock into an ordered install set
//!
//! Resolution is a pure function of the lock, the execution context and the
//! client tag: scope filtering, then dependency graph construction, then
//! topological ordering. Nothing here touches the network or the disk.

pub mod context;
pub mod graph;
pub mod scope;

pub use context::{ExecutionContext, RepoContext};
pub use graph::DependencyGraph;

use crate::error::ResolutionError;
use crate::lock::{Artifact, ArtifactId, LockFile};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

/// Artifacts to install, dependencies first
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub order: Vec<Artifact>,
    /// Direct dependencies of each artifact in `order`
    pub dependencies: HashMap<ArtifactId, Vec<ArtifactId>>,
}

impl Resolution {
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn dependencies_of(&self, id: &ArtifactId) -> &[ArtifactId] {
        self.dependencies.get(id).map(Vec::as_slice).unwrap_or_default()
    }
}

/// Resolve the lock for a context and optional client tag
pub fn resolve(
    lock: &LockFile,
    ctx: &ExecutionContext,
    client: Option<&str>,
) -> Result<Resolution, ResolutionError> {
    let applicable = scope::filter_artifacts(&lock.artifacts, ctx, client);
    debug!(
        "{} of {} artifacts apply to this context",
        applicable.len(),
        lock.artifacts.len()
    );

    let graph = DependencyGraph::build(&applicable)?;
    check_install_collisions(&applicable)?;
    let order = graph.install_order()?;

    let mut dependencies = HashMap::with_capacity(order.len());
    for &index in &order {
        let deps = graph
            .dependencies(index)
            .iter()
            .map(|&d| graph.artifact(d).id())
            .collect();
        dependencies.insert(graph.artifact(index).id(), deps);
    }

    Ok(Resolution {
        order: order.iter().map(|&i| graph.artifact(i).clone()).collect(),
        dependencies,
    })
}

/// Surviving artifacts share a target base, and the install location depends
/// only on type and name, so one (type, name) may resolve to one version
fn check_install_collisions(artifacts: &[&Artifact]) -> Result<(), ResolutionError> {
    let mut slots: BTreeMap<(&str, &str), Vec<String>> = BTreeMap::new();
    for artifact in artifacts {
        slots
            .entry((artifact.artifact_type.install_dir(), artifact.name.as_str()))
            .or_default()
            .push(artifact.id().to_string());
    }

    match slots.into_iter().find(|(_, ids)| ids.len() > 1) {
        Some(((_, name), requesters)) => Err(ResolutionError::Conflict {
            name: name.to_string(),
            requesters,
        }),
        None => Ok(()),
    }
}
