//! Edge completion.
//!
//! Turns a node's authored edges into the full edge list: every edge gets a
//! resolved ref and its property's default constants, and edge types that
//! imply other types bring synthesized edges of those types along.

use indexmap::{IndexMap, IndexSet};

use crate::definition::{EdgeValue, ExpandedEdgeValue, MapDefinition, NodeDefinition};

/// Authored edges first, in authored order, then synthesized edges grouped
/// by target in first-seen target order.
///
/// Within one target, a type is synthesized at most once and never when an
/// edge of that type was authored to the same target. Synthesized edges do
/// not imply further types.
pub(crate) fn expand_edges(
    definition: &MapDefinition,
    source: &str,
    node: &NodeDefinition,
) -> Vec<ExpandedEdgeValue> {
    let mut expanded: Vec<ExpandedEdgeValue> = node
        .edges
        .iter()
        .map(|edge| authored(definition, source, edge))
        .collect();

    let mut by_target: IndexMap<&str, IndexSet<&str>> = IndexMap::new();
    for edge in &node.edges {
        by_target
            .entry(edge.target())
            .or_default()
            .insert(edge.property_type.as_str());
    }

    for (target, authored_types) in &by_target {
        let mut synthesized: IndexSet<&str> = IndexSet::new();
        for property_type in authored_types {
            let Some(property) = definition.properties.get(*property_type) else {
                continue;
            };
            for implied in property.implies.resolve(property_type, &definition.properties) {
                if authored_types.contains(implied) || !synthesized.insert(implied) {
                    continue;
                }
                let constants = definition
                    .properties
                    .get(implied)
                    .map(|p| p.constants.clone())
                    .unwrap_or_default();
                expanded.push(ExpandedEdgeValue {
                    source: source.to_string(),
                    ref_id: target.to_string(),
                    property_type: implied.to_string(),
                    constants,
                    implied: true,
                });
            }
        }
    }

    expanded
}

fn authored(definition: &MapDefinition, source: &str, edge: &EdgeValue) -> ExpandedEdgeValue {
    let mut constants = definition
        .properties
        .get(&edge.property_type)
        .map(|p| p.constants.clone())
        .unwrap_or_default();
    constants.extend(edge.constants.iter().map(|(k, v)| (k.clone(), *v)));

    ExpandedEdgeValue {
        source: source.to_string(),
        ref_id: edge.target().to_string(),
        property_type: edge.property_type.clone(),
        constants,
        implied: false,
    }
}
