//! Topological ordering
//!
//! Orders the nodes of a [`DependencyGraph`] with Kahn's algorithm:
//!
//! 1. Count the in-degree of every node (edges pointing at it)
//! 2. Queue every node with in-degree zero, in insertion order
//! 3. Pop a node, emit it, decrement the in-degree of its targets
//! 4. Queue any target whose in-degree drops to zero
//!
//! If fewer nodes are emitted than exist, the leftovers sit on (or behind) a
//! cycle and the sort fails.
//!
//! The order is deterministic: ties are broken by insertion order.

use std::collections::VecDeque;
use std::fmt::Display;
use std::hash::Hash;

use indexmap::{IndexMap, IndexSet};

use crate::error::{Error, Result};

/// A directed graph of ids with ordered out-edges.
#[derive(Debug, Clone)]
pub struct DependencyGraph<K> {
    edges: IndexMap<K, IndexSet<K>>,
}

impl<K> DependencyGraph<K>
where
    K: Clone + Eq + Hash + Display,
{
    /// Create an empty graph.
    pub fn new() -> Self {
        Self {
            edges: IndexMap::new(),
        }
    }

    /// Add a node with no edges. Adding an existing node is a no-op.
    pub fn add_node(&mut self, node: K) {
        self.edges.entry(node).or_default();
    }

    /// Add an edge `from -> to`, creating either node if needed.
    pub fn add_edge(&mut self, from: K, to: K) {
        self.edges.entry(from).or_default().insert(to.clone());
        self.edges.entry(to).or_default();
    }

    /// Out-edge targets of a node.
    pub fn targets(&self, node: &K) -> Option<&IndexSet<K>> {
        self.edges.get(node)
    }

    pub fn node_count(&self) -> usize {
        self.edges.len()
    }

    /// Order nodes so that every node precedes the targets of its out-edges.
    ///
    /// `name` only labels the error when a cycle is found.
    pub fn topological_sort(&self, name: &str) -> Result<Vec<K>> {
        let mut in_degree: IndexMap<&K, usize> =
            self.edges.keys().map(|node| (node, 0)).collect();
        for targets in self.edges.values() {
            for target in targets {
                if let Some(degree) = in_degree.get_mut(target) {
                    *degree += 1;
                }
            }
        }

        let mut queue: VecDeque<&K> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(node, _)| *node)
            .collect();
        let mut result = Vec::with_capacity(self.edges.len());

        while let Some(node) = queue.pop_front() {
            result.push(node.clone());
            if let Some(targets) = self.edges.get(node) {
                for target in targets {
                    if let Some(degree) = in_degree.get_mut(target) {
                        *degree = degree.saturating_sub(1);
                        if *degree == 0 {
                            queue.push_back(target);
                        }
                    }
                }
            }
        }

        if result.len() < self.edges.len() {
            let nodes = in_degree
                .iter()
                .filter(|(_, degree)| **degree > 0)
                .map(|(node, _)| node.to_string())
                .collect();
            return Err(Error::CycleDetected {
                graph: name.to_string(),
                nodes,
            });
        }

        Ok(result)
    }
}

impl<K> Default for DependencyGraph<K>
where
    K: Clone + Eq + Hash + Display,
{
    fn default() -> Self {
        Self::new()
    }
}
