//! Valuemap Core
//!
//! This crate computes numeric "values" for the nodes of a directed acyclic
//! graph. Each node's values are derived from its edges through a small
//! declarative expression language, reduced per property type, and layered
//! with library defaults and scenario overrides.
//!
//! It implements:
//!
//! - A typed expression language with static validation and evaluation
//! - Library merging and normalization of author-facing definitions
//! - A dependency-ordered, lazily cached computation engine
//! - Render-ready edge and node attributes
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `expr`: Expression syntax tree, validator and evaluator
//! - `definition`: Raw and canonical map definitions, libraries, processing
//! - `graph`: Dependency graph and topological ordering
//! - `engine`: The [`AdjacencyMap`] engine and its [`Node`] views
//! - `combine`, `color`, `value`: Numeric building blocks
//!
//! # Example
//!
//! ```rust,ignore
//! use valuemap_core::{AdjacencyMap, LibrarySet};
//! use serde_json::json;
//!
//! let map = AdjacencyMap::from_json(
//!     &json!({
//!         "version": 1,
//!         "properties": {
//!             "cost": {"value": {"operator": "+", "a": {"parent": "self"}, "b": {"edge": "step"}},
//!                      "constants": {"step": 1}}
//!         },
//!         "nodes": {
//!             "a": {"edges": [{"type": "cost"}]},
//!             "b": {"edges": [{"ref": "a", "type": "cost", "step": 2}]}
//!         }
//!     }),
//!     &LibrarySet::builtin(),
//! )?;
//!
//! // a = root(0) + 1, b = a + 2
//! assert_eq!(map.node("b")?.value("cost")?, 3.0);
//! ```

pub mod color;
pub mod combine;
pub mod config;
pub mod definition;
pub mod engine;
pub mod error;
pub mod expr;
pub mod graph;
pub mod value;

pub use combine::Combiner;
pub use config::EngineConfig;
pub use definition::{LibrarySet, MapDefinition};
pub use engine::{AdjacencyMap, Node, NodeStyle, RenderEdge};
pub use error::{Error, Result};
pub use expr::Expression;
