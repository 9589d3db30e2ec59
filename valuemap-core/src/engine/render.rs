//! Render-edge derivation.
//!
//! A node's expanded edges are grouped by target and then by type. Each
//! type's display expressions run over that type's edges. Types marked
//! distinct become their own render edge; the rest of a target's types are
//! merged through the map-wide edge combiners, which see the per-type values
//! as `input`. Zero-width edges are dropped and the survivors sharing a
//! target are fanned out by a bump offset.

use indexmap::IndexMap;
use serde::Serialize;
use tracing::trace;

use super::compute::parent_values;
use super::AdjacencyMap;
use crate::color;
use crate::combine::Combiner;
use crate::config::EngineConfig;
use crate::definition::{ExpandedEdgeValue, PropertyDefinition, ID_DELIMITER};
use crate::error::Result;
use crate::expr::{evaluate, evaluate_scalar, Capabilities, EvalContext, Expression};
use crate::value::truthy;

/// One drawable edge.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderEdge {
    /// `source:ref` for merged edges, `source:ref:type` for distinct ones.
    pub key: String,
    pub source: String,
    #[serde(rename = "ref")]
    pub ref_id: String,
    /// Property types drawn by this edge.
    pub types: Vec<String>,
    /// Packed color.
    pub color: f64,
    pub width: f64,
    pub opacity: f64,
    /// Offset from the straight line, centered on zero across the edges
    /// sharing a target.
    pub bump: f64,
    pub distinct: bool,
}

#[derive(Debug, Clone, Copy)]
struct TypeStyle {
    color: f64,
    width: f64,
    opacity: f64,
}

struct TypeGroup<'a> {
    property: &'a PropertyDefinition,
    edges: Vec<ExpandedEdgeValue>,
}

pub(super) fn render_edges(map: &AdjacencyMap, id: &str) -> Result<Vec<RenderEdge>> {
    let definition = map.definition();
    let edges = map.expanded_edges(id)?;
    let values = map.values_of(id)?;
    let root = map.root_values()?;
    let tags = map.tag_context(id);

    let mut grouped: IndexMap<&str, IndexMap<&str, TypeGroup<'_>>> = IndexMap::new();
    for edge in edges.iter() {
        let Some(property) = definition.property(&edge.property_type) else {
            continue;
        };
        if property.hide {
            continue;
        }
        grouped
            .entry(edge.ref_id.as_str())
            .or_default()
            .entry(edge.property_type.as_str())
            .or_insert_with(|| TypeGroup {
                property,
                edges: Vec::new(),
            })
            .edges
            .push(edge.clone());
    }

    let mut rendered = Vec::new();
    for (target, types) in &grouped {
        let mut out = Vec::new();
        let mut merged: Vec<(&str, TypeStyle)> = Vec::new();

        for (property_type, group) in types {
            let key = format!("{}{d}{}{d}{}", id, target, property_type, d = ID_DELIMITER);
            let display = &group.property.display;
            let parents = parent_values(
                map,
                [&display.color, &display.width, &display.opacity, &display.distinct]
                    .into_iter()
                    .flatten(),
                &group.edges,
            )?;
            let ctx = EvalContext {
                edges: &group.edges,
                parents: &parents,
                results: &values,
                tags,
                ..EvalContext::empty(&key, Capabilities::edge_display(), &root)
            };

            let style = TypeStyle {
                color: reduce(&display.color, &ctx, Combiner::ColorMean, default_color())?,
                width: reduce(&display.width, &ctx, Combiner::Mean, 1.0)?,
                opacity: reduce(&display.opacity, &ctx, Combiner::Mean, 1.0)?,
            };
            let distinct = match &display.distinct {
                Some(expr) => truthy(Combiner::Or.apply(&evaluate(expr, &ctx)?)),
                None => false,
            };

            if distinct {
                out.push(RenderEdge {
                    key,
                    source: id.to_string(),
                    ref_id: target.to_string(),
                    types: vec![property_type.to_string()],
                    color: style.color,
                    width: style.width,
                    opacity: style.opacity,
                    bump: 0.0,
                    distinct: true,
                });
            } else {
                merged.push((*property_type, style));
            }
        }

        if !merged.is_empty() {
            let key = format!("{}{}{}", id, ID_DELIMITER, target);
            let combiners = &definition.display.edges;
            let combine = |expr: &Expression, pick: fn(&TypeStyle) -> f64| {
                let input: Vec<f64> = merged.iter().map(|(_, style)| pick(style)).collect();
                let ctx = EvalContext {
                    input: &input,
                    results: &values,
                    tags,
                    ..EvalContext::empty(&key, Capabilities::edge_combiner(), &root)
                };
                evaluate_scalar(expr, &ctx)
            };
            let edge = RenderEdge {
                color: combine(&combiners.color, |s: &TypeStyle| s.color)?,
                width: combine(&combiners.width, |s: &TypeStyle| s.width)?,
                opacity: combine(&combiners.opacity, |s: &TypeStyle| s.opacity)?,
                key: key.clone(),
                source: id.to_string(),
                ref_id: target.to_string(),
                types: merged.iter().map(|(name, _)| name.to_string()).collect(),
                bump: 0.0,
                distinct: false,
            };
            out.insert(0, edge);
        }

        if map.config().drop_zero_width {
            out.retain(|edge| edge.width > 0.0);
        }
        spread(&mut out, map.config());
        rendered.extend(out);
    }

    trace!(node = id, edges = rendered.len(), "derived render edges");
    Ok(rendered)
}

fn default_color() -> f64 {
    color::pack(0x88, 0x88, 0x88)
}

fn reduce(
    expr: &Option<Expression>,
    ctx: &EvalContext<'_>,
    combine: Combiner,
    default: f64,
) -> Result<f64> {
    match expr {
        Some(expr) => Ok(combine.apply(&evaluate(expr, ctx)?)),
        None => Ok(default),
    }
}

/// Center the edges on zero, `bump_spacing` apart, compressed to fit in
/// `bump_spread` when they would overflow it.
fn spread(edges: &mut [RenderEdge], config: &EngineConfig) {
    if edges.len() < 2 {
        return;
    }
    let gaps = (edges.len() - 1) as f64;
    let spacing = if config.bump_spacing * gaps > config.bump_spread {
        config.bump_spread / gaps
    } else {
        config.bump_spacing
    };
    for (i, edge) in edges.iter_mut().enumerate() {
        edge.bump = (i as f64 - gaps / 2.0) * spacing;
    }
}
