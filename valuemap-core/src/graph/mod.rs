//! Dependency Graph
//!
//! Generic graph utilities used in two places:
//!
//! - ordering property evaluation, so that a property's declared
//!   dependencies are computed before it reads them as results
//! - checking that the authored node/edge graph is acyclic before a map is
//!   constructed
//!
//! # Overview
//!
//! The graph maps an id to an ordered set of out-edge targets. Both uses
//! point edges from what is needed to what needs it (dependency to
//! property, parent to child), so a topological sort emits everything
//! after the things it reads.
//!
//! # Design Decisions
//!
//! 1. Nodes and targets live in `IndexMap`/`IndexSet` so sorting is
//!    deterministic for a given insertion order.
//!
//! 2. The sort reports a cycle as an error instead of returning a partial
//!    order; neither caller can proceed with one.

mod topo;

pub use topo::DependencyGraph;
