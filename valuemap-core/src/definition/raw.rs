//! Author-facing JSON forms.
//!
//! These mirror what people write by hand: booleans and `null` where numbers
//! go, edges grouped several ways, `implies` as a wildcard or a list. The
//! processor folds all of it into the canonical types in the parent module.

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

use crate::expr::Expression;

/// Numbers, booleans and nulls keyed by name, folded later.
pub type RawScalars = IndexMap<String, Value>;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawMapDefinition {
    pub version: u32,
    #[serde(default)]
    pub library: OneOrMany,
    #[serde(default)]
    pub properties: IndexMap<String, RawPropertyDefinition>,
    #[serde(default)]
    pub root: RawScalars,
    #[serde(default)]
    pub display: RawMapDisplay,
    #[serde(default)]
    pub tags: IndexMap<String, RawTagDefinition>,
    #[serde(default)]
    pub nodes: IndexMap<String, RawNodeDefinition>,
    #[serde(default)]
    pub scenarios: IndexMap<String, RawScenario>,
}

/// `"name"` or `["a", "b"]`.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(untagged)]
pub enum OneOrMany {
    #[default]
    None,
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::None => Vec::new(),
            OneOrMany::One(name) => vec![name],
            OneOrMany::Many(names) => names,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawPropertyDefinition {
    #[serde(default)]
    pub description: Option<String>,
    pub value: Expression,
    #[serde(default)]
    pub combine: Option<String>,
    /// When absent, extracted from the `result` lookups in `value`.
    #[serde(default)]
    pub dependencies: Option<Vec<String>>,
    #[serde(default)]
    pub implies: Option<RawImplies>,
    #[serde(default)]
    pub constants: RawScalars,
    #[serde(default)]
    pub hide: bool,
    #[serde(default)]
    pub display: RawEdgeDisplay,
}

/// `"*"`, a single type name, a list of names, or `{"except": [...]}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawImplies {
    Name(String),
    List(Vec<String>),
    Except { except: Vec<String> },
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawEdgeDisplay {
    #[serde(default)]
    pub color: Option<Expression>,
    #[serde(default)]
    pub width: Option<Expression>,
    #[serde(default)]
    pub opacity: Option<Expression>,
    #[serde(default)]
    pub distinct: Option<Expression>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawMapDisplay {
    #[serde(default)]
    pub edges: RawEdgeCombiners,
    #[serde(default)]
    pub nodes: RawNodeStyle,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawEdgeCombiners {
    #[serde(default)]
    pub color: Option<Expression>,
    #[serde(default)]
    pub width: Option<Expression>,
    #[serde(default)]
    pub opacity: Option<Expression>,
}

/// Node style expressions, used both for map defaults and per-node overrides.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawNodeStyle {
    #[serde(default)]
    pub radius: Option<Expression>,
    #[serde(default)]
    pub color: Option<Expression>,
    #[serde(default)]
    pub opacity: Option<Expression>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawTagDefinition {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub constants: RawScalars,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawNodeDefinition {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub values: RawScalars,
    #[serde(default)]
    pub edges: Option<RawEdges>,
    /// `{type: {target: constants}}`.
    #[serde(default)]
    pub edges_by_type: IndexMap<String, IndexMap<String, RawEdgeConstants>>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub display: RawNodeStyle,
}

/// A flat list of edges, or `{target: {type: constants}}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawEdges {
    List(Vec<RawEdge>),
    ByTarget(IndexMap<String, IndexMap<String, RawEdgeConstants>>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawEdge {
    #[serde(rename = "ref", default)]
    pub ref_id: Option<String>,
    #[serde(rename = "type")]
    pub property_type: String,
    #[serde(flatten)]
    pub constants: RawScalars,
}

/// Constants of one edge, or of several parallel edges.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawEdgeConstants {
    One(RawScalars),
    Many(Vec<RawScalars>),
}

impl RawEdgeConstants {
    pub fn into_vec(self) -> Vec<RawScalars> {
        match self {
            RawEdgeConstants::One(constants) => vec![constants],
            RawEdgeConstants::Many(list) => list,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawScenario {
    #[serde(default)]
    pub description: Option<String>,
    /// `{node id: {property: value}}`; `""` addresses the root.
    #[serde(default)]
    pub values: IndexMap<String, RawScalars>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn edges_accept_list_and_target_map() {
        let list: RawEdges = serde_json::from_value(json!([
            {"ref": "a", "type": "cost", "weight": 2},
            {"type": "risk"}
        ]))
        .unwrap();
        match list {
            RawEdges::List(edges) => {
                assert_eq!(edges.len(), 2);
                assert_eq!(edges[0].ref_id.as_deref(), Some("a"));
                assert_eq!(edges[0].constants["weight"], json!(2));
                assert_eq!(edges[1].ref_id, None);
            }
            other => panic!("expected list, got {:?}", other),
        }

        let map: RawEdges = serde_json::from_value(json!({
            "a": {"cost": {"weight": 1}, "risk": [{}, {"weight": 3}]}
        }))
        .unwrap();
        match map {
            RawEdges::ByTarget(targets) => {
                assert!(matches!(targets["a"]["cost"], RawEdgeConstants::One(_)));
                assert!(matches!(&targets["a"]["risk"], RawEdgeConstants::Many(v) if v.len() == 2));
            }
            other => panic!("expected target map, got {:?}", other),
        }
    }

    #[test]
    fn implies_forms() {
        let parse = |v| serde_json::from_value::<RawImplies>(v).unwrap();
        assert!(matches!(parse(json!("*")), RawImplies::Name(n) if n == "*"));
        assert!(matches!(parse(json!(["a", "b"])), RawImplies::List(v) if v.len() == 2));
        assert!(matches!(parse(json!({"except": ["a"]})), RawImplies::Except { .. }));
    }

    #[test]
    fn library_accepts_one_or_many() {
        let one: RawMapDefinition =
            serde_json::from_value(json!({"version": 1, "library": "risk"})).unwrap();
        assert_eq!(one.library.into_vec(), vec!["risk"]);
        let none: RawMapDefinition = serde_json::from_value(json!({"version": 1})).unwrap();
        assert!(none.library.into_vec().is_empty());
    }

    #[test]
    fn unknown_top_level_fields_are_rejected() {
        assert!(serde_json::from_value::<RawMapDefinition>(json!({"version": 1, "extra": 0})).is_err());
    }
}
