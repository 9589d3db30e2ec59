//! Integration Tests for the Graph Engine
//!
//! These tests build whole maps from JSON and check that processing,
//! validation, computation and scenario switching work together.

use serde_json::{json, Value};

use valuemap_core::expr::{evaluate, Capabilities, EvalContext};
use valuemap_core::value::{Values, FALSE, TRUE};
use valuemap_core::{AdjacencyMap, Combiner, Error, Expression, LibrarySet};

fn build(json: Value) -> valuemap_core::Result<AdjacencyMap> {
    AdjacencyMap::from_json(&json, &LibrarySet::builtin())
}

fn eval(json: Value) -> Vec<f64> {
    let root = Values::new();
    let ctx = EvalContext::empty("test", Capabilities::ALL, &root);
    evaluate(&Expression::from_json(&json).unwrap(), &ctx)
        .unwrap()
        .to_vec()
}

/// Snapshot of every node's values, for comparing across scenario switches.
fn all_values(map: &AdjacencyMap) -> Vec<(String, Values)> {
    map.nodes()
        .map(|node| (node.id().to_string(), (*node.values().unwrap()).clone()))
        .collect()
}

fn chain() -> Value {
    json!({
        "version": 1,
        "properties": {
            "cost": {
                "value": {"operator": "+", "a": {"parent": "self"}, "b": {"edge": "step"}},
                "constants": {"step": 1}
            },
            "risk": {
                "value": {"operator": "*", "a": {"result": "cost"}, "b": 2}
            },
            "total": {
                "value": {"operator": "+", "a": {"result": "cost"}, "b": {"result": "risk"}},
                "combine": "max"
            }
        },
        "root": {"cost": 0, "risk": 5, "total": -1},
        "nodes": {
            "a": {"edges": [{"type": "cost"}]},
            "b": {"name": "Bravo", "edges": [{"ref": "a", "type": "cost", "step": 2}, {"ref": "a", "type": "risk"}]},
            "c": {"edges": [{"ref": "b", "type": "cost"}, {"ref": "b", "type": "total"}], "values": {"risk": 7}}
        },
        "scenarios": {
            "pricey": {"values": {"a": {"cost": 10}}},
            "baseline": {"values": {"": {"risk": 1}}}
        }
    })
}

/// Test that properties are ordered after the properties they depend on.
#[test]
fn property_order_respects_dependencies() {
    let map = build(chain()).unwrap();
    let order = map.property_order();
    assert_eq!(order.len(), 3);

    for (name, property) in &map.definition().properties {
        let position = order.iter().position(|p| p == name).unwrap();
        for dependency in &property.dependencies {
            let before = order.iter().position(|p| p == dependency).unwrap();
            assert!(before < position, "{} must come before {}", dependency, name);
        }
    }
}

/// Test that dependency cycles abort construction.
#[test]
fn dependency_cycles_are_rejected() {
    let result = build(json!({
        "version": 1,
        "properties": {
            "a": {"value": {"result": "c"}},
            "b": {"value": {"result": "a"}},
            "c": {"value": {"result": "b"}}
        }
    }));
    assert!(matches!(result, Err(Error::CycleDetected { .. })));
}

/// Test that values flow down through parent lookups and partial results.
#[test]
fn values_are_computed_through_the_graph() {
    let map = build(chain()).unwrap();

    let a = map.node("a").unwrap().values().unwrap();
    // a: root cost 0 + step 1; no risk edges, so risk comes from the root
    assert_eq!(a["cost"], 1.0);
    assert_eq!(a["risk"], 5.0);

    let b = map.node("b").unwrap().values().unwrap();
    assert_eq!(b["cost"], 3.0);
    assert_eq!(b["risk"], 6.0);
    assert_eq!(b["total"], -1.0);

    let c = map.node("c").unwrap().values().unwrap();
    assert_eq!(c["cost"], 4.0);
    assert_eq!(c["total"], 11.0);
}

/// Test that an explicit node value wins over edges and the root.
#[test]
fn explicit_values_are_used_verbatim() {
    let map = build(chain()).unwrap();
    let c = map.node("c").unwrap();
    assert_eq!(c.value("risk").unwrap(), 7.0);
}

/// Test that nodes without edges of a type inherit the root's value.
#[test]
fn missing_edges_inherit_root_values() {
    let mut map = build(chain()).unwrap();
    assert_eq!(map.node("a").unwrap().value("total").unwrap(), -1.0);

    map.set_scenario("baseline").unwrap();
    assert_eq!(map.root_values().unwrap()["risk"], 1.0);
    assert_eq!(map.node("a").unwrap().value("risk").unwrap(), 1.0);
}

/// Test the combiners' empty-input results and a few reductions.
#[test]
fn combiners_reduce_arrays() {
    for combiner in Combiner::ALL {
        assert_eq!(combiner.apply(&[]), 0.0, "{} of nothing", combiner);
    }
    assert_eq!(Combiner::Mean.apply(&[4.0, 6.0]), 5.0);
    assert_eq!(Combiner::Sum.apply(&[1.0, 2.0, 3.0]), 6.0);
    assert_eq!(Combiner::And.apply(&[1.0, 1.0]), TRUE);
    assert_eq!(Combiner::And.apply(&[1.0, 0.0]), FALSE);
    assert_eq!("mean".parse::<Combiner>().unwrap(), Combiner::default());
}

/// Test that a single-element operand broadcasts against a longer one.
#[test]
fn arithmetic_broadcasts_scalars() {
    assert_eq!(
        eval(json!({"operator": "+", "a": [1, 2, 3], "b": [10]})),
        vec![11.0, 12.0, 13.0]
    );
    assert_eq!(
        eval(json!({"if": [1, 0, 1], "then": [5], "else": [7, 8]})),
        vec![5.0, 8.0, 5.0]
    );
}

/// Test clipping with one and two bounds.
#[test]
fn clip_bounds_values() {
    assert_eq!(eval(json!({"clip": 5, "low": 0, "high": 1})), vec![1.0]);
    assert_eq!(eval(json!({"clip": -5, "low": 0})), vec![0.0]);
}

/// Test that an implying type synthesizes exactly one flagged edge.
#[test]
fn implied_edges_carry_their_type_constants() {
    let map = build(json!({
        "version": 1,
        "properties": {
            "a": {"value": 0, "implies": ["b"]},
            "b": {"value": {"reduce": {"edge": "k"}}, "constants": {"k": 4}}
        },
        "nodes": {
            "r": {},
            "n": {"edges": [{"ref": "r", "type": "a"}]}
        }
    }))
    .unwrap();

    let node = map.node("n").unwrap();
    let edges = node.edges().unwrap();
    let implied: Vec<_> = edges.iter().filter(|e| e.property_type == "b").collect();
    assert_eq!(implied.len(), 1);
    assert_eq!(implied[0].ref_id, "r");
    assert!(implied[0].implied);
    assert_eq!(implied[0].constants["k"], 4.0);

    // The implied edge takes part in computation.
    assert_eq!(node.value("b").unwrap(), 4.0);
}

/// Test that switching away from a scenario and back restores its values.
#[test]
fn scenario_round_trip_is_idempotent() {
    let mut map = build(chain()).unwrap();
    map.set_scenario("pricey").unwrap();
    let before = all_values(&map);
    assert_eq!(map.node("b").unwrap().value("cost").unwrap(), 12.0);

    map.set_scenario("baseline").unwrap();
    assert_ne!(all_values(&map), before);

    map.set_scenario("pricey").unwrap();
    assert_eq!(all_values(&map), before);

    map.set_scenario("").unwrap();
    assert_eq!(map.node("b").unwrap().value("cost").unwrap(), 3.0);
}

/// Test that the root cache survives switches that leave the root alone.
#[test]
fn root_cache_is_kept_when_untouched() {
    let mut map = build(chain()).unwrap();
    map.node("c").unwrap().values().unwrap();
    assert!(map.is_root_cached());
    assert!(map.node("a").unwrap().is_cached());

    map.set_scenario("pricey").unwrap();
    assert!(map.is_root_cached());
    assert!(!map.node("a").unwrap().is_cached());
    assert!(!map.is_aggregate_cached());

    map.set_scenario("baseline").unwrap();
    assert!(!map.is_root_cached());
}

/// Test that a result lookup must be a declared dependency.
#[test]
fn undeclared_result_dependency_is_rejected() {
    let result = build(json!({
        "version": 1,
        "properties": {
            "x": {"value": 1},
            "y": {"value": {"result": "x"}, "dependencies": []}
        }
    }));
    assert!(matches!(result, Err(Error::UndeclaredDependency { .. })));
}

/// Test that edges forming a cycle are rejected.
#[test]
fn edge_cycles_are_rejected() {
    let result = build(json!({
        "version": 1,
        "properties": {"cost": {"value": 0}},
        "nodes": {
            "a": {"edges": [{"ref": "c", "type": "cost"}]},
            "b": {"edges": [{"ref": "a", "type": "cost"}]},
            "c": {"edges": [{"ref": "b", "type": "cost"}]}
        }
    }));
    assert!(matches!(result, Err(Error::CycleDetected { .. })));
}

/// Test that scenarios may only override known properties.
#[test]
fn scenario_with_unknown_property_is_rejected() {
    let mut map = chain();
    map["scenarios"]["broken"] = json!({"values": {"a": {"speed": 3}}});
    assert!(matches!(build(map), Err(Error::UnknownProperty { .. })));
}

/// Test that unknown scenarios cannot be activated.
#[test]
fn unknown_scenario_cannot_be_selected() {
    let mut map = build(chain()).unwrap();
    assert!(matches!(map.set_scenario("missing"), Err(Error::UnknownScenario(_))));
}

/// Test merged, distinct and dropped render edges.
#[test]
fn render_edges_merge_split_and_drop() {
    let map = build(json!({
        "version": 1,
        "properties": {
            "cost": {
                "value": {"reduce": {"edge": "w"}},
                "constants": {"w": 1},
                "display": {"width": {"edge": "w"}, "color": {"color": "#ff0000"}}
            },
            "risk": {"value": 0, "display": {"width": 0.5, "color": {"color": "#0000ff"}}},
            "flow": {"value": 0, "display": {"width": 2, "distinct": true}},
            "ghost": {"value": 0, "display": {"width": 0}},
            "secret": {"value": 0, "hide": true}
        },
        "nodes": {
            "t": {},
            "s": {"edges": [
                {"ref": "t", "type": "cost", "w": 3},
                {"ref": "t", "type": "risk"},
                {"ref": "t", "type": "flow"},
                {"ref": "t", "type": "secret"}
            ]},
            "z": {"edges": [{"ref": "t", "type": "ghost"}]}
        }
    }))
    .unwrap();

    let edges = map.node("s").unwrap().render_edges().unwrap();
    assert_eq!(edges.len(), 2);

    assert_eq!(edges[0].key, "s:t");
    assert_eq!(edges[0].types, vec!["cost", "risk"]);
    assert_eq!(edges[0].width, 3.0);
    assert!(!edges[0].distinct);

    assert_eq!(edges[1].key, "s:t:flow");
    assert_eq!(edges[1].width, 2.0);
    assert!(edges[1].distinct);

    assert_eq!(edges[0].bump, -0.125);
    assert_eq!(edges[1].bump, 0.125);

    assert!(map.node("z").unwrap().render_edges().unwrap().is_empty());
}

/// Test tag membership scopes and tag constants.
#[test]
fn tags_are_scoped_through_ancestors() {
    let map = build(json!({
        "version": 1,
        "properties": {
            "inherited": {"value": {"hasTag": "fire", "scope": "extended"}},
            "own": {"value": {"hasTag": "fire", "scope": "self"}},
            "heat": {"value": {"tagConstant": "heat", "default": -1}}
        },
        "tags": {"fire": {"constants": {"heat": 3}}, "ice": {}},
        "nodes": {
            "p": {"tags": ["fire"]},
            "c": {"tags": ["ice"], "edges": [
                {"ref": "p", "type": "inherited"},
                {"ref": "p", "type": "own"},
                {"ref": "p", "type": "heat"}
            ]}
        }
    }))
    .unwrap();

    let c = map.node("c").unwrap();
    assert_eq!(c.value("inherited").unwrap(), TRUE);
    assert_eq!(c.value("own").unwrap(), FALSE);
    assert_eq!(c.value("heat").unwrap(), 3.0);
    assert!(c.tags().all.contains("ice"));
}

/// Test the aggregate and the text dumps.
#[test]
fn aggregate_and_dumps() {
    let map = build(json!({
        "version": 1,
        "properties": {
            "cost": {"value": {"reduce": {"edge": "w"}}, "constants": {"w": 1}, "combine": "sum"},
            "note": {"value": 0, "hide": true}
        },
        "nodes": {
            "a": {"name": "Alpha", "edges": [{"type": "cost", "w": 2}]},
            "b": {"edges": [{"type": "cost", "w": 0.5}]}
        }
    }))
    .unwrap();

    assert_eq!(map.aggregate().unwrap()["cost"], 2.5);
    assert!(map.is_aggregate_cached());
    assert_eq!(map.dump_aggregate(false).unwrap(), "aggregate\n  cost = 2.5");

    let a = map.node("a").unwrap();
    assert_eq!(a.name(), "Alpha");
    assert_eq!(a.dump(false).unwrap(), "Alpha (a)\n  cost = 2");
    assert_eq!(a.dump(true).unwrap(), "Alpha (a)\n  cost = 2\n  note = 0 (hidden)");
}

/// Test that node styles fall back to the map defaults.
#[test]
fn node_styles_use_overrides_then_defaults() {
    let map = build(json!({
        "version": 1,
        "properties": {"size": {"value": 0}},
        "display": {"nodes": {"radius": {"operator": "+", "a": {"result": "size"}, "b": 1}}},
        "nodes": {
            "a": {"values": {"size": 4}},
            "b": {"display": {"opacity": 0.5}}
        }
    }))
    .unwrap();

    let a = map.node("a").unwrap().style().unwrap();
    assert_eq!(a.radius, 5.0);
    assert_eq!(a.opacity, 1.0);

    let b = map.node("b").unwrap().style().unwrap();
    assert_eq!(b.radius, 1.0);
    assert_eq!(b.opacity, 0.5);
}

/// Test that several engines can share one definition.
#[test]
fn engines_share_a_definition() {
    let mut first = build(chain()).unwrap();
    let second = AdjacencyMap::new(first.shared_definition()).unwrap();

    first.set_scenario("pricey").unwrap();
    assert_eq!(first.node("a").unwrap().value("cost").unwrap(), 10.0);
    assert_eq!(second.node("a").unwrap().value("cost").unwrap(), 1.0);
}

/// Test that the leaf of a very long chain can be queried from a cold cache
/// without exhausting the stack, before and after a scenario switch.
#[test]
fn deep_chain_leaf_from_cold_cache() {
    const LENGTH: usize = 5_000;

    let mut nodes = serde_json::Map::new();
    nodes.insert("n0".to_string(), json!({"edges": [{"type": "cost"}]}));
    for i in 1..LENGTH {
        nodes.insert(
            format!("n{}", i),
            json!({"edges": [{"ref": format!("n{}", i - 1), "type": "cost"}]}),
        );
    }

    let mut map = build(json!({
        "version": 1,
        "properties": {
            "cost": {"value": {"operator": "+", "a": {"parent": "self"}, "b": 1}}
        },
        "root": {"cost": 0},
        "nodes": Value::Object(nodes),
        "scenarios": {"shock": {"values": {"n0": {"cost": 100}}}}
    }))
    .unwrap();

    let leaf = format!("n{}", LENGTH - 1);
    assert_eq!(map.node(&leaf).unwrap().value("cost").unwrap(), LENGTH as f64);
    assert!(map.node("n0").unwrap().is_cached());

    map.set_scenario("shock").unwrap();
    assert!(!map.node("n0").unwrap().is_cached());
    assert_eq!(
        map.node(&leaf).unwrap().value("cost").unwrap(),
        (100 + LENGTH - 1) as f64
    );
}

/// Test that `lengthOf: "refs"` has one slot per edge, like parent lookups,
/// even when two edges share a target.
#[test]
fn ref_length_matches_parent_slots() {
    let map = build(json!({
        "version": 1,
        "properties": {
            "cost": {
                "value": {"collect": [{"parent": "self"}, {"lengthOf": "refs", "value": 9}]},
                "combine": "sum"
            }
        },
        "nodes": {
            "p": {"values": {"cost": 1}},
            "n": {"edges": [{"ref": "p", "type": "cost"}, {"ref": "p", "type": "cost"}]}
        }
    }))
    .unwrap();

    assert_eq!(map.node("n").unwrap().value("cost").unwrap(), 20.0);
}
