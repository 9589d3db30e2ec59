//! Map Definitions
//!
//! The canonical, fully resolved description of a map. A [`MapDefinition`]
//! is produced once by [`process`] (library merge plus normalization of the
//! author-facing syntax) and is never mutated afterwards; any number of
//! engines may share one behind an `Arc`.
//!
//! # Overview
//!
//! - [`PropertyDefinition`]: a named numeric attribute, with the expression
//!   that computes it, its combiner, declared dependencies, implied types,
//!   default edge constants and edge display expressions.
//! - [`NodeDefinition`]: a node with explicit override values, outgoing
//!   [`EdgeValue`]s, tags and display overrides.
//! - [`Scenario`]: per-node value overrides layered on the base definition.
//! - The root: a synthetic node with id [`ROOT`] that edges without an
//!   explicit `ref` point at. Its values are the defaults in
//!   [`MapDefinition::root`].

mod library;
mod process;
mod raw;

pub use library::{Library, LibrarySet};
pub use process::process;
pub use raw::{
    OneOrMany, RawEdge, RawEdgeCombiners, RawEdgeConstants, RawEdgeDisplay, RawEdges,
    RawImplies, RawMapDefinition, RawMapDisplay, RawNodeDefinition, RawNodeStyle,
    RawPropertyDefinition, RawScalars, RawScenario, RawTagDefinition,
};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::combine::Combiner;
use crate::error::Result;
use crate::expr::Expression;

/// Id of the synthetic root node. No authored node may use it.
pub const ROOT: &str = "";

/// Name of the scenario that applies no overlay. Always legal, never declared.
pub const DEFAULT_SCENARIO: &str = "";

/// Edge constant every edge carries: `TRUE` when the edge was synthesized by
/// implication.
pub const IMPLIED: &str = "implied";

/// Constant names authors may not declare.
pub const RESERVED_CONSTANTS: &[&str] = &[IMPLIED];

/// Separator used in render-edge keys; node ids may not contain it.
pub const ID_DELIMITER: char = ':';

/// Highest definition version this crate understands.
pub const SUPPORTED_VERSION: u32 = 1;

/// A named numeric attribute every node has a value for.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDefinition {
    pub description: Option<String>,
    /// Evaluated over a node's edges of this type.
    pub value: Expression,
    pub combine: Combiner,
    /// Properties whose results `value` may read.
    pub dependencies: Vec<String>,
    pub implies: Implies,
    /// Defaults for edge constants; an edge's own constants win.
    pub constants: IndexMap<String, f64>,
    pub hide: bool,
    pub display: EdgeDisplay,
}

impl PropertyDefinition {
    /// A visible property computed by `value`, averaged, with no
    /// dependencies, constants or display expressions.
    pub fn new(value: Expression) -> Self {
        Self {
            description: None,
            dependencies: value.result_references(),
            value,
            combine: Combiner::default(),
            implies: Implies::None,
            constants: IndexMap::new(),
            hide: false,
            display: EdgeDisplay::default(),
        }
    }
}

/// Which other property types an edge of this type brings along.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Implies {
    #[default]
    None,
    Types(Vec<String>),
    /// Every other property.
    All,
    /// Every other property except these.
    AllExcept(Vec<String>),
}

impl Implies {
    /// Names of the implied types for a property called `owner`.
    pub fn resolve<'a>(
        &'a self,
        owner: &str,
        properties: &'a IndexMap<String, PropertyDefinition>,
    ) -> Vec<&'a str> {
        match self {
            Implies::None => Vec::new(),
            Implies::Types(types) => types
                .iter()
                .map(String::as_str)
                .filter(|name| *name != owner)
                .collect(),
            Implies::All => properties
                .keys()
                .map(String::as_str)
                .filter(|name| *name != owner)
                .collect(),
            Implies::AllExcept(excluded) => properties
                .keys()
                .map(String::as_str)
                .filter(|name| *name != owner && !excluded.iter().any(|e| e == name))
                .collect(),
        }
    }

    /// Names listed explicitly (for validation).
    pub fn named(&self) -> &[String] {
        match self {
            Implies::Types(types) | Implies::AllExcept(types) => types,
            Implies::None | Implies::All => &[],
        }
    }
}

/// Per-type edge display expressions of a property.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EdgeDisplay {
    pub color: Option<Expression>,
    pub width: Option<Expression>,
    pub opacity: Option<Expression>,
    /// When truthy, edges of this type are drawn on their own instead of
    /// being merged with other types sharing the same target.
    pub distinct: Option<Expression>,
}

/// Map-wide display defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct MapDisplay {
    /// Combine per-type edge styles (passed as `input`) into one edge.
    pub edges: EdgeCombiners,
    /// Default node styles.
    pub nodes: NodeStyleExpressions,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EdgeCombiners {
    pub color: Expression,
    pub width: Expression,
    pub opacity: Expression,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeStyleExpressions {
    pub radius: Expression,
    pub color: Expression,
    pub opacity: Expression,
}

impl Default for MapDisplay {
    fn default() -> Self {
        let reduce = |combine| Expression::Reduce {
            value: Box::new(Expression::Input),
            combine,
        };
        Self {
            edges: EdgeCombiners {
                color: reduce(Combiner::ColorMean),
                width: reduce(Combiner::Max),
                opacity: reduce(Combiner::Max),
            },
            nodes: NodeStyleExpressions {
                radius: Expression::Literal(1.0),
                color: Expression::Color(crate::color::pack(0x88, 0x88, 0x88)),
                opacity: Expression::Literal(1.0),
            },
        }
    }
}

/// A declared tag and the constants it contributes to `tagConstant`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TagDefinition {
    pub description: Option<String>,
    pub constants: IndexMap<String, f64>,
}

impl TagDefinition {
    pub fn with_constants<I, K>(constants: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        Self {
            description: None,
            constants: constants.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// An authored edge from a node to a parent (or the root).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeValue {
    #[serde(rename = "ref", skip_serializing_if = "Option::is_none")]
    pub ref_id: Option<String>,
    #[serde(rename = "type")]
    pub property_type: String,
    pub constants: IndexMap<String, f64>,
}

impl EdgeValue {
    /// Target id, [`ROOT`] when the edge has no explicit ref.
    pub fn target(&self) -> &str {
        self.ref_id.as_deref().unwrap_or(ROOT)
    }
}

/// An edge as the engine sees it: resolved ref, merged constants, and
/// whether it was synthesized.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpandedEdgeValue {
    pub source: String,
    #[serde(rename = "ref")]
    pub ref_id: String,
    #[serde(rename = "type")]
    pub property_type: String,
    pub constants: IndexMap<String, f64>,
    pub implied: bool,
}

/// Node display overrides; unset fields fall back to the map defaults.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodeDisplay {
    pub radius: Option<Expression>,
    pub color: Option<Expression>,
    pub opacity: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodeDefinition {
    pub description: String,
    pub name: Option<String>,
    /// Explicit values that bypass computation entirely.
    pub values: IndexMap<String, f64>,
    pub edges: Vec<EdgeValue>,
    pub tags: Vec<String>,
    pub display: NodeDisplay,
}

/// Value overrides keyed by node id ([`ROOT`] for the root), then property.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Scenario {
    pub description: Option<String>,
    pub values: IndexMap<String, IndexMap<String, f64>>,
}

impl Scenario {
    pub fn get(&self, node: &str, property: &str) -> Option<f64> {
        self.values.get(node)?.get(property).copied()
    }

    pub fn touches_root(&self) -> bool {
        self.values.contains_key(ROOT)
    }

    pub fn set_override(&mut self, node: &str, property: &str, value: f64) {
        self.values
            .entry(node.to_string())
            .or_default()
            .insert(property.to_string(), value);
    }

    /// Remove one override. When it was the node's last, the node's entry is
    /// removed too. Returns the removed value.
    pub fn remove_override(&mut self, node: &str, property: &str) -> Option<f64> {
        let overrides = self.values.get_mut(node)?;
        let removed = overrides.shift_remove(property);
        if overrides.is_empty() {
            self.values.shift_remove(node);
        }
        removed
    }
}

/// The fully resolved map.
#[derive(Debug, Clone, PartialEq)]
pub struct MapDefinition {
    pub version: u32,
    pub properties: IndexMap<String, PropertyDefinition>,
    /// Root defaults; properties not listed default to 0.
    pub root: IndexMap<String, f64>,
    pub display: MapDisplay,
    pub tags: IndexMap<String, TagDefinition>,
    pub nodes: IndexMap<String, NodeDefinition>,
    pub scenarios: IndexMap<String, Scenario>,
}

impl MapDefinition {
    /// Process a raw JSON definition against a library set.
    pub fn from_json(json: &serde_json::Value, libraries: &LibrarySet) -> Result<Self> {
        let raw = RawMapDefinition::deserialize(json)?;
        process(raw, libraries)
    }

    /// Parse and process JSON text.
    pub fn parse(text: &str, libraries: &LibrarySet) -> Result<Self> {
        let raw: RawMapDefinition = serde_json::from_str(text)?;
        process(raw, libraries)
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDefinition> {
        self.properties.get(name)
    }

    pub fn node(&self, id: &str) -> Option<&NodeDefinition> {
        self.nodes.get(id)
    }

    pub fn scenario(&self, name: &str) -> Option<&Scenario> {
        self.scenarios.get(name)
    }
}
