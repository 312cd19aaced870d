//! Dependency graph and install ordering
//!
//! Edge `A -> B` means A depends on B. The install order is a topological
//! order with dependencies first.
//!
//! ## Algorithm
//!
//! Kahn's algorithm with a min-heap keyed on declaration index: among all
//! artifacts whose dependencies are already placed, the earliest declared is
//! placed next. That makes the order a pure function of the lock content.
//!
//! When nodes remain unplaced they sit on or behind a cycle. A three-colour
//! DFS over the remainder, in declaration order, finds the first back edge
//! and reports the cycle members in the order they were encountered.

use crate::error::ResolutionError;
use crate::lock::{resolve_ref, version_matches, Artifact, ArtifactId};
use semver::Version;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

/// Artifacts plus resolved dependency edges, indexed by declaration order
#[derive(Debug)]
pub struct DependencyGraph<'a> {
    nodes: Vec<&'a Artifact>,
    edges: Vec<Vec<usize>>,
}

impl<'a> DependencyGraph<'a> {
    /// Resolve every dependency reference against `artifacts` and check that
    /// requesters of the same name can agree on one version
    pub fn build(artifacts: &[&'a Artifact]) -> Result<Self, ResolutionError> {
        let nodes = artifacts.to_vec();
        let mut edges = Vec::with_capacity(nodes.len());

        for artifact in &nodes {
            let mut targets = Vec::with_capacity(artifact.dependencies.len());
            for dep in &artifact.dependencies {
                let target = resolve_ref(nodes.iter().copied(), dep)?;
                let index = nodes
                    .iter()
                    .position(|n| std::ptr::eq(*n, target))
                    .ok_or_else(|| ResolutionError::NotFound {
                        name: dep.name.clone(),
                        version: dep.version.clone(),
                    })?;
                if !targets.contains(&index) {
                    targets.push(index);
                }
            }
            edges.push(targets);
        }

        let graph = Self { nodes, edges };
        graph.check_conflicts()?;
        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn artifact(&self, index: usize) -> &'a Artifact {
        self.nodes[index]
    }

    /// Direct dependencies of a node
    pub fn dependencies(&self, index: usize) -> &[usize] {
        &self.edges[index]
    }

    /// Fail when requesters of one name carry constraints no single
    /// candidate satisfies
    fn check_conflicts(&self) -> Result<(), ResolutionError> {
        // name -> [(requester, constraint)]
        let mut requests: BTreeMap<&str, Vec<(ArtifactId, Option<&str>)>> = BTreeMap::new();
        for node in &self.nodes {
            for dep in &node.dependencies {
                requests
                    .entry(dep.name.as_str())
                    .or_default()
                    .push((node.id(), dep.version.as_deref()));
            }
        }

        for (name, requesters) in requests {
            if requesters.len() < 2 {
                continue;
            }

            let satisfiable = self
                .nodes
                .iter()
                .filter(|n| n.name == name)
                .any(|candidate| {
                    requesters
                        .iter()
                        .all(|(_, constraint)| satisfies(candidate, *constraint))
                });

            if !satisfiable {
                let mut ids: Vec<String> = requesters.iter().map(|(id, _)| id.to_string()).collect();
                ids.sort();
                ids.dedup();
                return Err(ResolutionError::Conflict {
                    name: name.to_string(),
                    requesters: ids,
                });
            }
        }
        Ok(())
    }

    /// Node indices in install order, dependencies first
    pub fn install_order(&self) -> Result<Vec<usize>, ResolutionError> {
        let n = self.nodes.len();
        let mut pending: Vec<usize> = self.edges.iter().map(Vec::len).collect();
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        for (node, deps) in self.edges.iter().enumerate() {
            for &dep in deps {
                dependents[dep].push(node);
            }
        }

        let mut ready: BinaryHeap<Reverse<usize>> = (0..n)
            .filter(|&i| pending[i] == 0)
            .map(Reverse)
            .collect();
        let mut order = Vec::with_capacity(n);

        while let Some(Reverse(next)) = ready.pop() {
            order.push(next);
            for &dependent in &dependents[next] {
                pending[dependent] -= 1;
                if pending[dependent] == 0 {
                    ready.push(Reverse(dependent));
                }
            }
        }

        if order.len() < n {
            let placed: BTreeSet<usize> = order.iter().copied().collect();
            return Err(ResolutionError::Cycle {
                path: self.find_cycle(&placed),
            });
        }
        Ok(order)
    }

    /// Walk unplaced nodes and return the first cycle found, as names
    fn find_cycle(&self, placed: &BTreeSet<usize>) -> Vec<String> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            White,
            Gray,
            Black,
        }

        fn visit(
            graph: &DependencyGraph<'_>,
            node: usize,
            marks: &mut [Mark],
            stack: &mut Vec<usize>,
        ) -> Option<Vec<usize>> {
            marks[node] = Mark::Gray;
            stack.push(node);
            for &dep in &graph.edges[node] {
                match marks[dep] {
                    Mark::Gray => {
                        let start = stack.iter().position(|&s| s == dep).unwrap_or(0);
                        return Some(stack[start..].to_vec());
                    }
                    Mark::White => {
                        if let Some(cycle) = visit(graph, dep, marks, stack) {
                            return Some(cycle);
                        }
                    }
                    Mark::Black => {}
                }
            }
            stack.pop();
            marks[node] = Mark::Black;
            None
        }

        let mut marks: Vec<Mark> = (0..self.nodes.len())
            .map(|i| if placed.contains(&i) { Mark::Black } else { Mark::White })
            .collect();
        let mut stack = Vec::new();

        for start in 0..self.nodes.len() {
            if marks[start] != Mark::White {
                continue;
            }
            if let Some(cycle) = visit(self, start, &mut marks, &mut stack) {
                return cycle
                    .into_iter()
                    .map(|i| self.nodes[i].name.clone())
                    .collect();
            }
        }
        Vec::new()
    }
}

fn satisfies(candidate: &Artifact, constraint: Option<&str>) -> bool {
    match constraint {
        None => true,
        Some(wanted) if candidate.version == wanted => true,
        Some(wanted) => Version::parse(&candidate.version)
            .map(|v| version_matches(&v, wanted))
            .unwrap_or(false),
    }
}
