//! Whole-map validation, run once before an engine is usable.
//!
//! Checks every cross-reference in a [`MapDefinition`], validates every
//! expression in the context it will run in, and orders both the property
//! dependency graph and the node graph (failing on cycles).

use crate::definition::{
    MapDefinition, DEFAULT_SCENARIO, ID_DELIMITER, RESERVED_CONSTANTS, ROOT,
};
use crate::error::{Error, Result};
use crate::expr::{validate, Capabilities, ValidationScope, SELF};
use crate::graph::DependencyGraph;

/// Orders derived while validating.
#[derive(Debug, Clone)]
pub(crate) struct Validated {
    /// Every property after all of its dependencies.
    pub property_order: Vec<String>,
    /// Every node after all of its edge targets.
    pub node_order: Vec<String>,
}

pub(crate) fn validate_map(definition: &MapDefinition) -> Result<Validated> {
    check_properties(definition)?;
    let property_order = order_properties(definition)?;
    check_root(definition)?;
    check_display(definition)?;
    check_nodes(definition)?;
    let node_order = order_nodes(definition)?;
    check_scenarios(definition)?;

    Ok(Validated {
        property_order,
        node_order,
    })
}

fn scope<'a>(
    definition: &'a MapDefinition,
    label: &'a str,
    capabilities: Capabilities,
) -> ValidationScope<'a> {
    ValidationScope {
        label,
        capabilities,
        properties: &definition.properties,
        constants: None,
        dependencies: None,
    }
}

fn check_properties(definition: &MapDefinition) -> Result<()> {
    for (name, property) in &definition.properties {
        if name.is_empty() || name == SELF {
            return Err(Error::ReservedName {
                context: "properties".to_string(),
                name: name.clone(),
            });
        }
        let context = format!("property '{}'", name);

        for constant in property.constants.keys() {
            if RESERVED_CONSTANTS.contains(&constant.as_str()) {
                return Err(Error::ReservedName {
                    context: format!("{} constants", context),
                    name: constant.clone(),
                });
            }
        }
        for dependency in &property.dependencies {
            if !definition.properties.contains_key(dependency) {
                return Err(Error::unknown_property(format!("{} dependencies", context), dependency));
            }
        }
        for implied in property.implies.named() {
            if !definition.properties.contains_key(implied) {
                return Err(Error::unknown_property(format!("{} implies", context), implied));
            }
        }

        let label = format!("{} value", context);
        validate(
            &property.value,
            &ValidationScope {
                constants: Some(&property.constants),
                dependencies: Some(&property.dependencies),
                ..scope(definition, &label, Capabilities::property())
            },
        )?;

        let display = &property.display;
        for (field, expr) in [
            ("color", &display.color),
            ("width", &display.width),
            ("opacity", &display.opacity),
            ("distinct", &display.distinct),
        ] {
            if let Some(expr) = expr {
                let label = format!("{} display {}", context, field);
                validate(
                    expr,
                    &ValidationScope {
                        constants: Some(&property.constants),
                        ..scope(definition, &label, Capabilities::edge_display())
                    },
                )?;
            }
        }
    }
    Ok(())
}

/// Dependencies before dependents; declaration order otherwise.
fn order_properties(definition: &MapDefinition) -> Result<Vec<String>> {
    let mut graph = DependencyGraph::new();
    for name in definition.properties.keys() {
        graph.add_node(name.clone());
    }
    for (name, property) in &definition.properties {
        for dependency in &property.dependencies {
            graph.add_edge(dependency.clone(), name.clone());
        }
    }
    graph.topological_sort("property dependencies")
}

fn check_root(definition: &MapDefinition) -> Result<()> {
    for name in definition.root.keys() {
        if !definition.properties.contains_key(name) {
            return Err(Error::unknown_property("root", name));
        }
    }
    Ok(())
}

fn check_display(definition: &MapDefinition) -> Result<()> {
    let edges = &definition.display.edges;
    for (field, expr) in [
        ("color", &edges.color),
        ("width", &edges.width),
        ("opacity", &edges.opacity),
    ] {
        let label = format!("display edges {}", field);
        validate(expr, &scope(definition, &label, Capabilities::edge_combiner()))?;
    }
    let nodes = &definition.display.nodes;
    for (field, expr) in [
        ("radius", &nodes.radius),
        ("color", &nodes.color),
        ("opacity", &nodes.opacity),
    ] {
        let label = format!("display nodes {}", field);
        validate(expr, &scope(definition, &label, Capabilities::node_display()))?;
    }
    Ok(())
}

fn check_nodes(definition: &MapDefinition) -> Result<()> {
    for (id, node) in &definition.nodes {
        if id == ROOT {
            return Err(Error::InvalidNodeId {
                id: id.clone(),
                reason: "the empty id is reserved for the root".to_string(),
            });
        }
        if id.contains(ID_DELIMITER) {
            return Err(Error::InvalidNodeId {
                id: id.clone(),
                reason: format!("ids may not contain '{}'", ID_DELIMITER),
            });
        }
        let context = format!("node '{}'", id);

        for name in node.values.keys() {
            if !definition.properties.contains_key(name) {
                return Err(Error::unknown_property(format!("{} values", context), name));
            }
        }

        for edge in &node.edges {
            let Some(property) = definition.properties.get(&edge.property_type) else {
                return Err(Error::unknown_property(format!("{} edge", context), &edge.property_type));
            };
            if let Some(target) = &edge.ref_id {
                if !definition.nodes.contains_key(target) {
                    return Err(Error::unknown_node(format!("{} edge", context), target));
                }
            }
            for constant in edge.constants.keys() {
                if RESERVED_CONSTANTS.contains(&constant.as_str()) {
                    return Err(Error::ReservedName {
                        context: format!("{} edge", context),
                        name: constant.clone(),
                    });
                }
                if !property.constants.contains_key(constant) {
                    return Err(Error::UnknownConstant {
                        context: format!("{} edge of type '{}'", context, edge.property_type),
                        name: constant.clone(),
                    });
                }
            }
        }

        for tag in &node.tags {
            if !definition.tags.contains_key(tag) {
                return Err(Error::UnknownTag {
                    context: context.clone(),
                    name: tag.clone(),
                });
            }
        }

        let display = &node.display;
        for (field, expr) in [
            ("radius", &display.radius),
            ("color", &display.color),
            ("opacity", &display.opacity),
        ] {
            if let Some(expr) = expr {
                let label = format!("{} display {}", context, field);
                validate(expr, &scope(definition, &label, Capabilities::node_display()))?;
            }
        }
    }
    Ok(())
}

/// Edge targets before the nodes pointing at them.
fn order_nodes(definition: &MapDefinition) -> Result<Vec<String>> {
    let mut graph = DependencyGraph::new();
    for id in definition.nodes.keys() {
        graph.add_node(id.clone());
    }
    for (id, node) in &definition.nodes {
        for edge in &node.edges {
            if let Some(target) = &edge.ref_id {
                graph.add_edge(target.clone(), id.clone());
            }
        }
    }
    graph.topological_sort("node edges")
}

fn check_scenarios(definition: &MapDefinition) -> Result<()> {
    for (name, scenario) in &definition.scenarios {
        if name == DEFAULT_SCENARIO {
            return Err(Error::ReservedName {
                context: "scenarios".to_string(),
                name: name.clone(),
            });
        }
        let context = format!("scenario '{}'", name);
        for (id, overrides) in &scenario.values {
            if id != ROOT && !definition.nodes.contains_key(id) {
                return Err(Error::unknown_node(context.as_str(), id));
            }
            for property in overrides.keys() {
                if !definition.properties.contains_key(property) {
                    return Err(Error::unknown_property(context.as_str(), property));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::LibrarySet;
    use serde_json::json;

    fn check(json: serde_json::Value) -> Result<Validated> {
        let definition = MapDefinition::from_json(&json, &LibrarySet::builtin())?;
        validate_map(&definition)
    }

    fn with_nodes(nodes: serde_json::Value) -> serde_json::Value {
        json!({
            "version": 1,
            "properties": {
                "cost": {"value": {"reduce": {"edge": "w"}}, "constants": {"w": 1}},
                "risk": {"value": {"result": "cost"}}
            },
            "tags": {"hot": {}},
            "nodes": nodes
        })
    }

    #[test]
    fn orders_dependencies_first() {
        let validated = check(with_nodes(json!({
            "b": {"edges": [{"ref": "a", "type": "cost"}]},
            "a": {}
        })))
        .unwrap();
        assert_eq!(validated.property_order, vec!["cost", "risk"]);
        assert_eq!(validated.node_order, vec!["a", "b"]);
    }

    #[test]
    fn rejects_dependency_cycles() {
        let err = check(json!({
            "version": 1,
            "properties": {
                "a": {"value": {"result": "b"}},
                "b": {"value": {"result": "a"}}
            }
        }))
        .unwrap_err();
        assert!(matches!(err, Error::CycleDetected { ref graph, .. } if graph == "property dependencies"));

        assert!(matches!(
            check(json!({"version": 1, "properties": {"a": {"value": {"result": "a"}}}})),
            Err(Error::CycleDetected { .. })
        ));
    }

    #[test]
    fn rejects_node_cycles() {
        let err = check(with_nodes(json!({
            "a": {"edges": [{"ref": "b", "type": "cost"}]},
            "b": {"edges": [{"ref": "a", "type": "cost"}]}
        })))
        .unwrap_err();
        assert!(matches!(err, Error::CycleDetected { ref graph, .. } if graph == "node edges"));
    }

    #[test]
    fn rejects_bad_node_ids() {
        assert!(matches!(
            check(with_nodes(json!({"": {}}))),
            Err(Error::InvalidNodeId { .. })
        ));
        assert!(matches!(
            check(with_nodes(json!({"a:b": {}}))),
            Err(Error::InvalidNodeId { .. })
        ));
    }

    #[test]
    fn rejects_bad_edges() {
        assert!(matches!(
            check(with_nodes(json!({"a": {"edges": [{"type": "speed"}]}}))),
            Err(Error::UnknownProperty { .. })
        ));
        assert!(matches!(
            check(with_nodes(json!({"a": {"edges": [{"ref": "z", "type": "cost"}]}}))),
            Err(Error::UnknownNode { .. })
        ));
        assert!(matches!(
            check(with_nodes(json!({"a": {"edges": [{"type": "cost", "h": 1}]}}))),
            Err(Error::UnknownConstant { .. })
        ));
        assert!(matches!(
            check(with_nodes(json!({"a": {"edges": [{"type": "cost", "implied": 1}]}}))),
            Err(Error::ReservedName { .. })
        ));
    }

    #[test]
    fn rejects_unknown_tags_and_values() {
        assert!(matches!(
            check(with_nodes(json!({"a": {"tags": ["cold"]}}))),
            Err(Error::UnknownTag { .. })
        ));
        assert!(matches!(
            check(with_nodes(json!({"a": {"values": {"speed": 1}}}))),
            Err(Error::UnknownProperty { .. })
        ));
    }

    #[test]
    fn rejects_bad_scenarios() {
        let mut map = with_nodes(json!({"a": {}}));
        map["scenarios"] = json!({"s": {"values": {"a": {"speed": 1}}}});
        assert!(matches!(check(map.clone()), Err(Error::UnknownProperty { .. })));

        map["scenarios"] = json!({"s": {"values": {"b": {"cost": 1}}}});
        assert!(matches!(check(map.clone()), Err(Error::UnknownNode { .. })));

        map["scenarios"] = json!({"": {}});
        assert!(matches!(check(map.clone()), Err(Error::ReservedName { .. })));

        map["scenarios"] = json!({"s": {"values": {"": {"cost": 1}, "a": {"risk": 2}}}});
        check(map).unwrap();
    }

    #[test]
    fn rejects_reserved_names() {
        assert!(matches!(
            check(json!({"version": 1, "properties": {"self": {"value": 0}}})),
            Err(Error::ReservedName { .. })
        ));
        assert!(matches!(
            check(json!({"version": 1, "properties": {"a": {"value": 0, "constants": {"implied": 1}}}})),
            Err(Error::ReservedName { .. })
        ));
    }

    #[test]
    fn display_expressions_are_checked_in_context() {
        let map = json!({
            "version": 1,
            "properties": {"cost": {"value": 0}},
            "display": {"edges": {"width": {"reduce": {"edge": "w"}}}}
        });
        assert!(matches!(check(map), Err(Error::CapabilityDenied { .. })));

        let map = json!({
            "version": 1,
            "properties": {"cost": {"value": 0}},
            "nodes": {"a": {"display": {"radius": {"reduce": "input"}}}}
        });
        assert!(matches!(check(map), Err(Error::CapabilityDenied { .. })));
    }
}
