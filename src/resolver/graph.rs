// src/resolver/graph.rs

//! Dependency graph data structures and algorithms
//!
//! Provides graph construction, topological ordering, cycle detection,
//! and dependent queries over a set of package identities. Within one
//! graph each id maps to exactly one identity, so an id-level cycle is an
//! identity-level cycle and therefore a genuine conflict.

use crate::error::{Error, Result};
use crate::identity::{id_key, PackageIdentity};
use crate::source::PackageDependency;
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

/// A node: one identity plus its outgoing dependency edges.
#[derive(Debug, Clone)]
pub struct DependencyNode {
    pub identity: PackageIdentity,
    pub dependencies: Vec<PackageDependency>,
}

/// Dependency graph over one consistent set of identities.
///
/// Nodes and edges are kept in sorted maps so every traversal is
/// deterministic for the same input set.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: BTreeMap<String, DependencyNode>,
    /// Reverse edges: dependency id → ids that depend on it.
    dependents: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an identity with its dependency edges. Edges pointing outside
    /// the graph are tolerated; they simply never order anything.
    pub fn add_node(&mut self, identity: PackageIdentity, dependencies: Vec<PackageDependency>) {
        let key = id_key(&identity.id);
        for dep in &dependencies {
            self.dependents
                .entry(id_key(&dep.id))
                .or_default()
                .insert(key.clone());
        }
        self.nodes.insert(
            key,
            DependencyNode {
                identity,
                dependencies,
            },
        );
    }

    pub fn get(&self, id: &str) -> Option<&DependencyNode> {
        self.nodes.get(&id_key(id))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(&id_key(id))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn identities(&self) -> impl Iterator<Item = &PackageIdentity> {
        self.nodes.values().map(|n| &n.identity)
    }

    /// Ids that directly depend on `id`, sorted.
    pub fn direct_dependents(&self, id: &str) -> Vec<&PackageIdentity> {
        self.dependents
            .get(&id_key(id))
            .map(|keys| {
                keys.iter()
                    .filter_map(|k| self.nodes.get(k).map(|n| &n.identity))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every identity that depends on `id` directly or transitively.
    pub fn transitive_dependents(&self, id: &str) -> Vec<&PackageIdentity> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(id_key(id));

        while let Some(key) = queue.pop_front() {
            if let Some(parents) = self.dependents.get(&key) {
                for parent in parents {
                    if seen.insert(parent.clone()) {
                        queue.push_back(parent.clone());
                    }
                }
            }
        }

        let mut result: Vec<&PackageIdentity> = seen
            .iter()
            .filter_map(|k| self.nodes.get(k).map(|n| &n.identity))
            .collect();
        result.sort();
        result
    }

    /// Topological order with dependencies before dependents, via Kahn's
    /// algorithm. Ties break on id so the order is deterministic. An
    /// unsortable graph means an identity-level cycle.
    pub fn dependency_order(&self) -> Result<Vec<PackageIdentity>> {
        // Peel dependency-free nodes first: a node's degree is the number
        // of its dependencies that resolve inside the graph.
        let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
        for (key, node) in &self.nodes {
            let degree = node
                .dependencies
                .iter()
                .filter(|d| self.nodes.contains_key(&id_key(&d.id)))
                .count();
            in_degree.insert(key, degree);
        }

        let mut ready: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(k, _)| *k)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(key) = ready.pop_front() {
            let node = &self.nodes[key];
            order.push(node.identity.clone());

            // Peeling this node unblocks its dependents.
            if let Some(parents) = self.dependents.get(key) {
                for parent in parents {
                    if let Some(degree) = in_degree.get_mut(parent.as_str()) {
                        *degree -= 1;
                        if *degree == 0 {
                            ready.push_back(parent.as_str());
                        }
                    }
                }
            }
        }

        if order.len() != self.nodes.len() {
            let cycle = self.find_cycle().unwrap_or_default();
            let rendered: Vec<String> = cycle.iter().map(|i| i.to_string()).collect();
            return Err(Error::DependencyConflict {
                id: cycle
                    .first()
                    .map(|i| i.id.clone())
                    .unwrap_or_else(|| "<unknown>".to_string()),
                detail: format!("dependency cycle: {}", rendered.join(" -> ")),
            });
        }

        Ok(order)
    }

    /// Reverse topological order: dependents before their dependencies.
    pub fn dependent_order(&self) -> Result<Vec<PackageIdentity>> {
        let mut order = self.dependency_order()?;
        order.reverse();
        Ok(order)
    }

    /// Find one cycle, if any, for diagnostics.
    pub fn find_cycle(&self) -> Option<Vec<PackageIdentity>> {
        let mut visited = HashSet::new();
        let mut on_stack = HashSet::new();
        let mut trail = Vec::new();

        for key in self.nodes.keys() {
            if !visited.contains(key.as_str())
                && self.dfs_cycle(key, &mut visited, &mut on_stack, &mut trail)
            {
                trail.reverse();
                return Some(
                    trail
                        .iter()
                        .filter_map(|k: &String| self.nodes.get(k).map(|n| n.identity.clone()))
                        .collect(),
                );
            }
        }
        None
    }

    fn dfs_cycle(
        &self,
        key: &str,
        visited: &mut HashSet<String>,
        on_stack: &mut HashSet<String>,
        trail: &mut Vec<String>,
    ) -> bool {
        visited.insert(key.to_string());
        on_stack.insert(key.to_string());

        if let Some(node) = self.nodes.get(key) {
            for dep in &node.dependencies {
                let dep_key = id_key(&dep.id);
                if !self.nodes.contains_key(&dep_key) {
                    continue;
                }
                if !visited.contains(&dep_key) {
                    if self.dfs_cycle(&dep_key, visited, on_stack, trail) {
                        trail.push(key.to_string());
                        return true;
                    }
                } else if on_stack.contains(&dep_key) {
                    trail.push(dep_key);
                    trail.push(key.to_string());
                    return true;
                }
            }
        }

        on_stack.remove(key);
        false
    }
}
