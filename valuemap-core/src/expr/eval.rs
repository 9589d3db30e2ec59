//! Expression evaluator.
//!
//! `evaluate` maps an expression and a context to a non-empty array of
//! numbers. Arrays carry one value per edge (or input slot) being processed
//! in parallel; scalar contexts produce length-1 arrays.
//!
//! Whenever two arrays are combined position by position, the result has the
//! length of the longer one and each operand is read at `i % len`, so a
//! length-1 operand acts as a scalar. Every multi-operand form (`if`
//! included) broadcasts its operands this same way.

use indexmap::IndexSet;
use smallvec::smallvec;
use tracing::debug;

use super::ast::{Expression, LengthMode, TagScope};
use super::context::{Binding, Capability, EvalContext, TagContext};
use crate::color;
use crate::definition::IMPLIED;
use crate::error::{Error, Result};
use crate::value::{from_bool, truthy, Numbers, FALSE, NULL};

/// Evaluate `expr` against `ctx`.
///
/// Never mutates `ctx`. Fails if the expression uses a capability the
/// context does not allow, reads data the context does not have, or would
/// produce no values.
pub fn evaluate(expr: &Expression, ctx: &EvalContext<'_>) -> Result<Numbers> {
    let values = eval_node(expr, ctx)?;
    if values.is_empty() {
        return Err(Error::EmptyResult {
            context: format!("{} ({})", ctx.label, expr.marker()),
        });
    }
    Ok(values)
}

/// Evaluate and reduce to the first value; for expressions that are scalar
/// by construction.
pub fn evaluate_scalar(expr: &Expression, ctx: &EvalContext<'_>) -> Result<f64> {
    Ok(evaluate(expr, ctx)?[0])
}

#[inline]
fn at(values: &[f64], i: usize) -> f64 {
    values[i % values.len()]
}

fn zip_with(a: &[f64], b: &[f64], f: impl Fn(f64, f64) -> f64) -> Numbers {
    let n = a.len().max(b.len());
    (0..n).map(|i| f(at(a, i), at(b, i))).collect()
}

fn require(ctx: &EvalContext<'_>, capability: Capability) -> Result<()> {
    if ctx.capabilities.allows(capability) {
        Ok(())
    } else {
        Err(Error::CapabilityDenied {
            context: ctx.label.to_string(),
            capability,
        })
    }
}

fn optional(
    expr: Option<&Expression>,
    ctx: &EvalContext<'_>,
    fallback: f64,
) -> Result<Numbers> {
    match expr {
        Some(expr) => evaluate(expr, ctx),
        None => Ok(smallvec![fallback]),
    }
}

fn eval_node(expr: &Expression, ctx: &EvalContext<'_>) -> Result<Numbers> {
    match expr {
        Expression::Literal(value) | Expression::Color(value) => Ok(smallvec![*value]),

        Expression::Array(values) => Ok(values.iter().copied().collect()),

        Expression::Input => {
            require(ctx, Capability::Input)?;
            Ok(ctx.input.iter().copied().collect())
        }

        Expression::EdgeConstant(name) => {
            require(ctx, Capability::EdgeConstant)?;
            ctx.edges
                .iter()
                .map(|edge| {
                    if name == IMPLIED {
                        return Ok(from_bool(edge.implied));
                    }
                    edge.constants
                        .get(name)
                        .copied()
                        .ok_or_else(|| Error::UnknownConstant {
                            context: format!("{} (edge to '{}')", ctx.label, edge.ref_id),
                            name: name.clone(),
                        })
                })
                .collect()
        }

        Expression::Parent(name) => {
            require(ctx, Capability::ParentValue)?;
            if ctx.parents.len() != ctx.edges.len() {
                return Err(Error::Evaluation(format!(
                    "{}: parent values were not provided",
                    ctx.label
                )));
            }
            ctx.parents
                .iter()
                .map(|values| {
                    values
                        .get(name)
                        .copied()
                        .ok_or_else(|| Error::unknown_property(ctx.label, name.as_str()))
                })
                .collect()
        }

        Expression::Root(name) => {
            require(ctx, Capability::RootValue)?;
            ctx.root
                .get(name)
                .map(|value| smallvec![*value])
                .ok_or_else(|| Error::unknown_property(ctx.label, name.as_str()))
        }

        Expression::Result(name) => {
            require(ctx, Capability::ResultValue)?;
            ctx.results
                .get(name)
                .map(|value| smallvec![*value])
                .ok_or_else(|| {
                    Error::Evaluation(format!(
                        "{}: result '{}' has not been computed yet",
                        ctx.label, name
                    ))
                })
        }

        Expression::Reduce { value, combine } => {
            let values = evaluate(value, ctx)?;
            Ok(smallvec![combine.apply(&values)])
        }

        Expression::Rgb { r, g, b } => {
            let (r, g, b) = (evaluate(r, ctx)?, evaluate(g, ctx)?, evaluate(b, ctx)?);
            let n = r.len().max(g.len()).max(b.len());
            Ok((0..n)
                .map(|i| {
                    color::pack(
                        color::channel(at(&r, i)),
                        color::channel(at(&g, i)),
                        color::channel(at(&b, i)),
                    )
                })
                .collect())
        }

        Expression::Gradient { value, from, to } => {
            let (t, from, to) = (
                evaluate(value, ctx)?,
                evaluate(from, ctx)?,
                evaluate(to, ctx)?,
            );
            let n = t.len().max(from.len()).max(to.len());
            Ok((0..n)
                .map(|i| color::lerp(at(&from, i), at(&to, i), at(&t, i)))
                .collect())
        }

        Expression::Unary { op, a } => {
            Ok(evaluate(a, ctx)?.iter().map(|v| op.apply(*v)).collect())
        }

        Expression::Binary { op, a, b } => {
            let (a, b) = (evaluate(a, ctx)?, evaluate(b, ctx)?);
            Ok(zip_with(&a, &b, |x, y| op.apply(x, y)))
        }

        Expression::Compare { op, a, b } => {
            let (a, b) = (evaluate(a, ctx)?, evaluate(b, ctx)?);
            Ok(zip_with(&a, &b, |x, y| op.apply(x, y)))
        }

        Expression::If {
            condition,
            then,
            otherwise,
        } => {
            let condition = evaluate(condition, ctx)?;
            let then = evaluate(then, ctx)?;
            let otherwise = optional(otherwise.as_deref(), ctx, FALSE)?;
            let n = condition.len().max(then.len()).max(otherwise.len());
            Ok((0..n)
                .map(|i| {
                    if truthy(at(&condition, i)) {
                        at(&then, i)
                    } else {
                        at(&otherwise, i)
                    }
                })
                .collect())
        }

        Expression::Filter {
            filter,
            value,
            default,
        } => {
            let keep = evaluate(filter, ctx)?;
            let values = evaluate(value, ctx)?;
            let n = keep.len().max(values.len());
            let kept: Numbers = (0..n)
                .filter(|i| truthy(at(&keep, *i)))
                .map(|i| at(&values, i))
                .collect();
            if kept.is_empty() {
                optional(default.as_deref(), ctx, NULL)
            } else {
                Ok(kept)
            }
        }

        Expression::Clip { value, low, high } => {
            let values = evaluate(value, ctx)?;
            let low = optional(low.as_deref(), ctx, f64::NEG_INFINITY)?;
            let high = optional(high.as_deref(), ctx, f64::INFINITY)?;
            let n = values.len().max(low.len()).max(high.len());
            Ok((0..n)
                .map(|i| {
                    let (x, lo, hi) = (at(&values, i), at(&low, i), at(&high, i));
                    if x < lo {
                        lo
                    } else if x > hi {
                        hi
                    } else {
                        x
                    }
                })
                .collect())
        }

        Expression::Range { value, low, high } => {
            let values = evaluate(value, ctx)?;
            let low = optional(low.as_deref(), ctx, f64::NEG_INFINITY)?;
            let high = optional(high.as_deref(), ctx, f64::INFINITY)?;
            let n = values.len().max(low.len()).max(high.len());
            Ok((0..n)
                .map(|i| {
                    let (lo, hi) = ordered(at(&low, i), at(&high, i));
                    normalize(at(&values, i), lo, hi)
                })
                .collect())
        }

        Expression::Percent { value, low, high } => {
            let values = evaluate(value, ctx)?;
            let low = optional(low.as_deref(), ctx, 0.0)?;
            let high = optional(high.as_deref(), ctx, 1.0)?;
            let n = values.len().max(low.len()).max(high.len());
            Ok((0..n)
                .map(|i| {
                    let (lo, hi) = ordered(at(&low, i), at(&high, i));
                    let fraction = (at(&values, i) / 100.0).clamp(0.0, 1.0);
                    lo + fraction * (hi - lo)
                })
                .collect())
        }

        Expression::Collect(items) => {
            let mut out = Numbers::new();
            for item in items {
                out.extend(evaluate(item, ctx)?);
            }
            Ok(out)
        }

        Expression::LengthOf { mode, value } => {
            let n = match mode {
                // One slot per edge, parallel to parent lookups.
                LengthMode::Refs => {
                    require(ctx, Capability::ParentValue)?;
                    if ctx.parents.is_empty() {
                        ctx.edges.len()
                    } else {
                        ctx.parents.len()
                    }
                }
                LengthMode::Edges => {
                    require(ctx, Capability::EdgeConstant)?;
                    ctx.edges.len()
                }
                LengthMode::Input => {
                    require(ctx, Capability::Input)?;
                    ctx.input.len()
                }
            };
            let values = evaluate(value, ctx)?;
            Ok((0..n).map(|i| at(&values, i)).collect())
        }

        Expression::HasTag { tag, scope } => {
            require(ctx, Capability::TagHas)?;
            let tags = tag_context(ctx)?;
            if !tags.definitions.contains_key(tag) {
                return Err(Error::UnknownTag {
                    context: ctx.label.to_string(),
                    name: tag.clone(),
                });
            }
            Ok(smallvec![from_bool(scoped(&tags, *scope).contains(tag))])
        }

        Expression::TagConstant {
            name,
            scope,
            default,
        } => {
            require(ctx, Capability::TagConstant)?;
            let tags = tag_context(ctx)?;
            if !tags
                .definitions
                .values()
                .any(|definition| definition.constants.contains_key(name))
            {
                return Err(Error::UnknownConstant {
                    context: format!("{} (tag constant)", ctx.label),
                    name: name.clone(),
                });
            }
            let found: Numbers = scoped(&tags, *scope)
                .iter()
                .filter_map(|tag| tags.definitions.get(tag))
                .filter_map(|definition| definition.constants.get(name).copied())
                .collect();
            if found.is_empty() {
                optional(default.as_deref(), ctx, NULL)
            } else {
                Ok(found)
            }
        }

        Expression::Let { name, value, block } => {
            let bound = evaluate(value, ctx)?;
            let binding = Binding {
                name: name.as_str(),
                value: bound,
                parent: ctx.bindings,
            };
            let inner = EvalContext {
                bindings: Some(&binding),
                ..*ctx
            };
            evaluate(block, &inner)
        }

        Expression::Variable(name) => {
            ctx.variable(name)
                .cloned()
                .ok_or_else(|| Error::UnboundVariable {
                    context: ctx.label.to_string(),
                    name: name.clone(),
                })
        }

        Expression::Log { value, label } => {
            let values = evaluate(value, ctx)?;
            debug!(
                context = ctx.label,
                label = label.as_deref().unwrap_or(""),
                values = ?values.as_slice(),
                "expression log"
            );
            Ok(values)
        }
    }
}

fn ordered(low: f64, high: f64) -> (f64, f64) {
    if high < low {
        (high, low)
    } else {
        (low, high)
    }
}

/// Position of `x` in `[low, high]`, clamped to 0..1. Infinite bounds use
/// the limit of the ratio.
fn normalize(x: f64, low: f64, high: f64) -> f64 {
    let t = match (low == f64::NEG_INFINITY, high == f64::INFINITY) {
        (true, true) => 0.5,
        (true, false) => 1.0,
        (false, true) => 0.0,
        (false, false) if high == low => {
            if x >= high {
                1.0
            } else {
                0.0
            }
        }
        (false, false) => (x - low) / (high - low),
    };
    if x <= low {
        0.0
    } else if x >= high {
        1.0
    } else {
        t.clamp(0.0, 1.0)
    }
}

fn tag_context<'a>(ctx: &EvalContext<'a>) -> Result<TagContext<'a>> {
    ctx.tags.ok_or_else(|| {
        Error::Evaluation(format!("{}: tag membership is not available", ctx.label))
    })
}

fn scoped<'a>(tags: &TagContext<'a>, scope: TagScope) -> &'a IndexSet<String> {
    match scope {
        TagScope::All => &tags.scopes.all,
        TagScope::SelfOnly => &tags.scopes.own,
        TagScope::Extended => &tags.scopes.extended,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color;
    use crate::definition::{ExpandedEdgeValue, TagDefinition};
    use crate::expr::{Capabilities, TagScopes};
    use crate::value::{Values, TRUE};
    use indexmap::IndexMap;
    use serde_json::json;
    use std::sync::Arc;

    fn parse(json: serde_json::Value) -> Expression {
        Expression::from_json(&json).unwrap()
    }

    fn eval(json: serde_json::Value) -> Vec<f64> {
        let root = Values::new();
        let ctx = EvalContext::empty("test", Capabilities::ALL, &root);
        evaluate(&parse(json), &ctx).unwrap().to_vec()
    }

    fn edge(ref_id: &str, weight: f64, implied: bool) -> ExpandedEdgeValue {
        ExpandedEdgeValue {
            source: "n".to_string(),
            ref_id: ref_id.to_string(),
            property_type: "cost".to_string(),
            constants: [("weight".to_string(), weight)].into_iter().collect(),
            implied,
        }
    }

    #[test]
    fn binary_broadcasts_scalar() {
        assert_eq!(
            eval(json!({"operator": "+", "a": [1, 2, 3], "b": [10]})),
            vec![11.0, 12.0, 13.0]
        );
        assert_eq!(
            eval(json!({"operator": "*", "a": [1, 2], "b": [1, 2, 3, 4]})),
            vec![1.0, 4.0, 3.0, 8.0]
        );
    }

    #[test]
    fn clip_bounds() {
        assert_eq!(eval(json!({"clip": 5, "low": 0, "high": 1})), vec![1.0]);
        assert_eq!(eval(json!({"clip": -5, "low": 0})), vec![0.0]);
        assert_eq!(eval(json!({"clip": [-1, 0.5, 9], "high": 2})), vec![-1.0, 0.5, 2.0]);
    }

    #[test]
    fn range_and_percent_swap_bounds() {
        assert_eq!(eval(json!({"range": [5, 0, 20], "low": 0, "high": 10})), vec![0.5, 0.0, 1.0]);
        assert_eq!(eval(json!({"range": 5, "low": 10, "high": 0})), vec![0.5]);
        assert_eq!(eval(json!({"range": 5, "low": 0})), vec![0.0]);
        assert_eq!(eval(json!({"range": 5, "high": 10})), vec![1.0]);
        assert_eq!(eval(json!({"percent": 50, "low": 10, "high": 20})), vec![15.0]);
        assert_eq!(eval(json!({"percent": 25, "low": 20, "high": 10})), vec![12.5]);
        assert_eq!(eval(json!({"percent": 40})), vec![0.4]);
    }

    #[test]
    fn conditional_broadcasts_both_branches_alike() {
        assert_eq!(
            eval(json!({"if": [1, 0, 1, 0, 1], "then": [10, 20], "else": [1, 2, 3]})),
            vec![10.0, 2.0, 10.0, 1.0, 10.0]
        );
        assert_eq!(eval(json!({"if": false, "then": 5})), vec![FALSE]);
    }

    #[test]
    fn comparison_yields_sentinels() {
        assert_eq!(
            eval(json!({"compare": ">", "a": [1, 5, 9], "b": 4})),
            vec![FALSE, TRUE, TRUE]
        );
    }

    #[test]
    fn filter_and_fallbacks() {
        assert_eq!(
            eval(json!({"filter": [1, 0, 1], "value": [7, 8, 9]})),
            vec![7.0, 9.0]
        );
        assert_eq!(
            eval(json!({"filter": 0, "value": [7, 8], "default": 3})),
            vec![3.0]
        );
        assert_eq!(eval(json!({"filter": 0, "value": 1})), vec![NULL]);
    }

    #[test]
    fn collect_concatenates() {
        assert_eq!(
            eval(json!({"collect": [[1, 2], 3, {"reduce": [4, 6]}]})),
            vec![1.0, 2.0, 3.0, 5.0]
        );
    }

    #[test]
    fn let_binds_for_block() {
        assert_eq!(
            eval(json!({
                "let": "x", "value": [2, 3],
                "block": {"let": "y", "value": 10,
                          "block": {"operator": "*", "a": {"variable": "x"}, "b": {"variable": "y"}}}
            })),
            vec![20.0, 30.0]
        );
    }

    #[test]
    fn colors_and_gradients() {
        assert_eq!(eval(json!({"rgb": [255, 0, 300]})), vec![color::pack(255, 0, 255)]);
        assert_eq!(
            eval(json!({"gradient": 0.5, "from": {"color": "#000000"}, "to": {"color": "#ffffff"}})),
            vec![color::pack(128, 128, 128)]
        );
    }

    #[test]
    fn unary_and_logic() {
        assert_eq!(eval(json!({"unary": "-", "a": [1, -2]})), vec![-1.0, 2.0]);
        assert_eq!(eval(json!({"unary": "not", "a": [0, 3]})), vec![TRUE, FALSE]);
        assert_eq!(eval(json!({"operator": "and", "a": [1, 1], "b": [1, 0]})), vec![TRUE, FALSE]);
        assert_eq!(eval(json!({"log": 4, "label": "four"})), vec![4.0]);
    }

    #[test]
    fn edge_reads_follow_each_edge() {
        let root = Values::new();
        let edges = vec![edge("a", 2.0, false), edge("a", 3.0, true), edge("b", 4.0, false)];
        let parents: Vec<Arc<Values>> = ["a", "a", "b"]
            .iter()
            .map(|id| Arc::new([("cost".to_string(), if *id == "a" { 1.0 } else { 5.0 })].into_iter().collect()))
            .collect();
        let ctx = EvalContext {
            edges: &edges,
            parents: &parents,
            ..EvalContext::empty("test", Capabilities::property(), &root)
        };

        let weights = evaluate(&parse(json!({"edge": "weight"})), &ctx).unwrap();
        assert_eq!(weights.as_slice(), &[2.0, 3.0, 4.0]);

        let implied = evaluate(&parse(json!({"edge": "implied"})), &ctx).unwrap();
        assert_eq!(implied.as_slice(), &[FALSE, TRUE, FALSE]);

        let parent = evaluate(&parse(json!({"parent": "cost"})), &ctx).unwrap();
        assert_eq!(parent.as_slice(), &[1.0, 1.0, 5.0]);

        let refs = evaluate(&parse(json!({"lengthOf": "refs", "value": 7})), &ctx).unwrap();
        assert_eq!(refs.as_slice(), &[7.0, 7.0, 7.0]);

        let per_slot = parse(json!({"operator": "*", "a": {"parent": "cost"}, "b": {"lengthOf": "refs", "value": [1, 2]}}));
        assert_eq!(evaluate(&per_slot, &ctx).unwrap().as_slice(), &[1.0, 2.0, 5.0]);

        let spread = evaluate(&parse(json!({"lengthOf": "edges", "value": [1, 2]})), &ctx).unwrap();
        assert_eq!(spread.as_slice(), &[1.0, 2.0, 1.0]);
    }

    #[test]
    fn input_requires_capability() {
        let root = Values::new();
        let input = [1.0, 2.0, 3.0];
        let ctx = EvalContext {
            input: &input,
            ..EvalContext::empty("test", Capabilities::edge_combiner(), &root)
        };
        let sum = evaluate(&parse(json!({"reduce": "input", "combine": "sum"})), &ctx).unwrap();
        assert_eq!(sum.as_slice(), &[6.0]);
        assert!(matches!(
            evaluate(&parse(json!({"edge": "weight"})), &ctx),
            Err(Error::CapabilityDenied { .. })
        ));

        let denied = EvalContext::empty("test", Capabilities::property(), &root);
        assert!(evaluate(&Expression::Input, &denied).is_err());
    }

    #[test]
    fn empty_input_is_a_runtime_error() {
        let root = Values::new();
        let ctx = EvalContext::empty("test", Capabilities::ALL, &root);
        assert!(matches!(
            evaluate(&Expression::Input, &ctx),
            Err(Error::EmptyResult { .. })
        ));
    }

    #[test]
    fn tag_lookups_use_scopes() {
        let root = Values::new();
        let definitions: IndexMap<String, TagDefinition> = [
            ("red".to_string(), TagDefinition::with_constants([("heat", 3.0)])),
            ("blue".to_string(), TagDefinition::with_constants([("heat", 1.0)])),
            ("plain".to_string(), TagDefinition::default()),
        ]
        .into_iter()
        .collect();
        let scopes = TagScopes {
            own: ["red".to_string()].into_iter().collect(),
            all: ["red".to_string(), "blue".to_string()].into_iter().collect(),
            extended: ["blue".to_string()].into_iter().collect(),
        };
        let ctx = EvalContext {
            tags: Some(TagContext {
                definitions: &definitions,
                scopes: &scopes,
            }),
            ..EvalContext::empty("test", Capabilities::ALL, &root)
        };
        let run = |json| evaluate(&parse(json), &ctx).map(|v| v.to_vec());

        assert_eq!(run(json!({"hasTag": "blue", "scope": "self"})).unwrap(), vec![FALSE]);
        assert_eq!(run(json!({"hasTag": "blue", "scope": "extended"})).unwrap(), vec![TRUE]);
        assert_eq!(run(json!({"tagConstant": "heat"})).unwrap(), vec![3.0, 1.0]);
        assert_eq!(
            run(json!({"tagConstant": "heat", "scope": "extended"})).unwrap(),
            vec![1.0]
        );
        assert!(matches!(
            run(json!({"hasTag": "green"})),
            Err(Error::UnknownTag { .. })
        ));
        assert!(run(json!({"tagConstant": "cold"})).is_err());
    }
}
