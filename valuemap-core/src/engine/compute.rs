//! Value computation.
//!
//! A node's values are computed property by property in dependency order.
//! For each property the first of these that applies wins:
//!
//! 1. the node's own explicit value
//! 2. the active scenario's override for the node
//! 3. the root's value, when the node has no edges of that type
//! 4. the property expression over the node's edges of that type, reduced
//!    by the property's combiner
//!
//! Values accumulate as they are computed, so a `result` lookup sees every
//! property ordered before it.

use std::sync::Arc;

use serde::Serialize;
use tracing::trace;

use super::AdjacencyMap;
use crate::definition::{ExpandedEdgeValue, PropertyDefinition, ROOT};
use crate::error::{Error, Result};
use crate::expr::{
    evaluate, evaluate_scalar, Capabilities, Capability, EvalContext, Expression, TagContext,
};
use crate::value::{Values, FALSE};

/// Evaluated display attributes of a node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NodeStyle {
    pub radius: f64,
    /// Packed color.
    pub color: f64,
    pub opacity: f64,
}

/// Zero for every property, then the map's root defaults, then the active
/// scenario's root overrides.
pub(super) fn root_values(map: &AdjacencyMap) -> Values {
    let definition = map.definition();
    let mut values: Values = map
        .property_order()
        .iter()
        .map(|name| (name.clone(), FALSE))
        .collect();

    let overlay = map.scenario().and_then(|scenario| scenario.values.get(ROOT));
    for (name, value) in definition.root.iter().chain(overlay.into_iter().flatten()) {
        if let Some(slot) = values.get_mut(name) {
            *slot = *value;
        }
    }
    values
}

pub(super) fn node_values(map: &AdjacencyMap, id: &str) -> Result<Values> {
    let definition = map.definition();
    let node = definition
        .node(id)
        .ok_or_else(|| Error::unknown_node("values", id))?;
    let edges = map.expanded_edges(id)?;
    let root = map.root_values()?;
    let scenario = map.scenario();
    let tags = map.tag_context(id);

    let mut results = Values::with_capacity(map.property_order().len());
    for name in map.property_order() {
        let Some(property) = definition.property(name) else {
            continue;
        };

        let value = if let Some(value) = node.values.get(name) {
            *value
        } else if let Some(value) = scenario.and_then(|s| s.get(id, name)) {
            value
        } else {
            let matching: Vec<ExpandedEdgeValue> = edges
                .iter()
                .filter(|edge| edge.property_type == *name)
                .cloned()
                .collect();
            if matching.is_empty() {
                root.get(name).copied().unwrap_or(FALSE)
            } else {
                let label = format!("{}.{}", id, name);
                evaluate_property(map, &label, property, &matching, &root, &results, tags)?
            }
        };

        trace!(node = id, property = %name, value, "computed value");
        results.insert(name.clone(), value);
    }
    Ok(results)
}

fn evaluate_property(
    map: &AdjacencyMap,
    label: &str,
    property: &PropertyDefinition,
    edges: &[ExpandedEdgeValue],
    root: &Values,
    results: &Values,
    tags: Option<TagContext<'_>>,
) -> Result<f64> {
    let parents = parent_values(map, [&property.value], edges)?;
    let ctx = EvalContext {
        edges,
        parents: &parents,
        results,
        tags,
        ..EvalContext::empty(label, Capabilities::property(), root)
    };
    let numbers = evaluate(&property.value, &ctx)?;
    Ok(property.combine.apply(&numbers))
}

/// Values of each edge's ref, parallel to `edges`, but only when one of
/// `exprs` reads parent values. Computing them may compute the parents.
pub(super) fn parent_values<'e>(
    map: &AdjacencyMap,
    exprs: impl IntoIterator<Item = &'e Expression>,
    edges: &[ExpandedEdgeValue],
) -> Result<Vec<Arc<Values>>> {
    if !exprs
        .into_iter()
        .any(|expr| expr.uses(Capability::ParentValue))
    {
        return Ok(Vec::new());
    }
    edges.iter().map(|edge| map.values_of(&edge.ref_id)).collect()
}

pub(super) fn node_style(map: &AdjacencyMap, id: &str) -> Result<NodeStyle> {
    let definition = map.definition();
    let node = definition
        .node(id)
        .ok_or_else(|| Error::unknown_node("style", id))?;
    let values = map.values_of(id)?;
    let root = map.root_values()?;
    let defaults = &definition.display.nodes;

    let label = format!("{} style", id);
    let ctx = EvalContext {
        results: &values,
        tags: map.tag_context(id),
        ..EvalContext::empty(&label, Capabilities::node_display(), &root)
    };
    let eval = |own: &Option<Expression>, default: &Expression| {
        evaluate_scalar(own.as_ref().unwrap_or(default), &ctx)
    };

    Ok(NodeStyle {
        radius: eval(&node.display.radius, &defaults.radius)?,
        color: eval(&node.display.color, &defaults.color)?,
        opacity: eval(&node.display.opacity, &defaults.opacity)?,
    })
}

/// Each property reduced across every node with the property's combiner.
pub(super) fn aggregate(map: &AdjacencyMap) -> Result<Values> {
    let definition = map.definition();
    let all = definition
        .nodes
        .keys()
        .map(|id| map.values_of(id))
        .collect::<Result<Vec<_>>>()?;

    let mut out = Values::with_capacity(map.property_order().len());
    for name in map.property_order() {
        let Some(property) = definition.property(name) else {
            continue;
        };
        let column: Vec<f64> = all
            .iter()
            .filter_map(|values| values.get(name).copied())
            .collect();
        out.insert(name.clone(), property.combine.apply(&column));
    }
    Ok(out)
}
