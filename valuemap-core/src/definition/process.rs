//! Raw definition → canonical [`MapDefinition`].
//!
//! Steps, in order:
//!
//! 1. Check the version and resolve the library import closure.
//! 2. Merge library properties, root defaults, display defaults and tags in
//!    import order, then the map's own (later entries win by name).
//! 3. Rewrite `self` in every property expression to the property's name.
//! 4. Fill in `dependencies` from `result` references where not declared.
//! 5. Normalize each node's edge syntaxes into one [`EdgeValue`] list and fold
//!    scalar constants, values and scenario overrides into numbers.
//!
//! Cross-reference checks happen later, when an engine is built.

use indexmap::IndexMap;
use tracing::debug;

use super::raw::{
    RawEdgeConstants, RawEdges, RawImplies, RawMapDefinition, RawMapDisplay, RawNodeDefinition,
    RawNodeStyle, RawPropertyDefinition, RawScalars, RawScenario, RawTagDefinition,
};
use super::{
    EdgeCombiners, EdgeDisplay, EdgeValue, Implies, LibrarySet, MapDefinition, MapDisplay,
    NodeDefinition, NodeDisplay, NodeStyleExpressions, PropertyDefinition, Scenario,
    TagDefinition, SUPPORTED_VERSION,
};
use crate::combine::Combiner;
use crate::error::{Error, Result};
use crate::expr::{leaf, Expression};

/// Build the canonical definition from a raw one.
pub fn process(raw: RawMapDefinition, libraries: &LibrarySet) -> Result<MapDefinition> {
    if raw.version == 0 || raw.version > SUPPORTED_VERSION {
        return Err(Error::UnsupportedVersion {
            found: raw.version,
            supported: SUPPORTED_VERSION,
        });
    }

    let requested = raw.library.into_vec();
    let imports = libraries.resolve(&requested)?;

    let mut merged = Merged::default();
    for name in &imports {
        if let Some(library) = libraries.get(name) {
            merged.absorb(
                library.properties.clone(),
                library.root.clone(),
                &library.display,
                library.tags.clone(),
            );
        }
    }
    merged.absorb(raw.properties, raw.root, &raw.display, raw.tags);

    let properties = merged
        .properties
        .into_iter()
        .map(|(name, property)| {
            let canonical = property_definition(&name, property)?;
            Ok((name, canonical))
        })
        .collect::<Result<IndexMap<_, _>>>()?;

    let root = fold(merged.root, "root")?;
    let display = map_display(merged.display);

    let tags = merged
        .tags
        .into_iter()
        .map(|(name, tag)| {
            let constants = fold(tag.constants, &format!("tag '{}'", name))?;
            Ok((
                name,
                TagDefinition {
                    description: tag.description,
                    constants,
                },
            ))
        })
        .collect::<Result<IndexMap<_, _>>>()?;

    let nodes = raw
        .nodes
        .into_iter()
        .map(|(id, node)| {
            let canonical = node_definition(&id, node)?;
            Ok((id, canonical))
        })
        .collect::<Result<IndexMap<_, _>>>()?;

    let scenarios = raw
        .scenarios
        .into_iter()
        .map(|(name, scenario)| {
            let canonical = scenario_definition(&name, scenario)?;
            Ok((name, canonical))
        })
        .collect::<Result<IndexMap<_, _>>>()?;

    debug!(
        libraries = ?imports,
        properties = properties.len(),
        nodes = nodes.len(),
        scenarios = scenarios.len(),
        "processed map definition"
    );

    Ok(MapDefinition {
        version: raw.version,
        properties,
        root,
        display,
        tags,
        nodes,
        scenarios,
    })
}

#[derive(Default)]
struct Merged {
    properties: IndexMap<String, RawPropertyDefinition>,
    root: RawScalars,
    display: RawMapDisplay,
    tags: IndexMap<String, RawTagDefinition>,
}

impl Merged {
    fn absorb(
        &mut self,
        properties: IndexMap<String, RawPropertyDefinition>,
        root: RawScalars,
        display: &RawMapDisplay,
        tags: IndexMap<String, RawTagDefinition>,
    ) {
        self.properties.extend(properties);
        self.root.extend(root);
        self.tags.extend(tags);

        let edges = &mut self.display.edges;
        overlay(&mut edges.color, &display.edges.color);
        overlay(&mut edges.width, &display.edges.width);
        overlay(&mut edges.opacity, &display.edges.opacity);
        let nodes = &mut self.display.nodes;
        overlay(&mut nodes.radius, &display.nodes.radius);
        overlay(&mut nodes.color, &display.nodes.color);
        overlay(&mut nodes.opacity, &display.nodes.opacity);
    }
}

fn overlay(base: &mut Option<Expression>, top: &Option<Expression>) {
    if let Some(top) = top {
        *base = Some(top.clone());
    }
}

fn map_display(raw: RawMapDisplay) -> MapDisplay {
    let defaults = MapDisplay::default();
    MapDisplay {
        edges: EdgeCombiners {
            color: raw.edges.color.unwrap_or(defaults.edges.color),
            width: raw.edges.width.unwrap_or(defaults.edges.width),
            opacity: raw.edges.opacity.unwrap_or(defaults.edges.opacity),
        },
        nodes: NodeStyleExpressions {
            radius: raw.nodes.radius.unwrap_or(defaults.nodes.radius),
            color: raw.nodes.color.unwrap_or(defaults.nodes.color),
            opacity: raw.nodes.opacity.unwrap_or(defaults.nodes.opacity),
        },
    }
}

fn property_definition(name: &str, raw: RawPropertyDefinition) -> Result<PropertyDefinition> {
    let value = raw.value.substitute_self(name);
    let combine = match raw.combine.as_deref() {
        Some(text) => text
            .parse::<Combiner>()
            .map_err(|err| with_context(err, &format!("property '{}'", name)))?,
        None => Combiner::default(),
    };
    let dependencies = raw
        .dependencies
        .unwrap_or_else(|| value.result_references());
    let implies = match raw.implies {
        None => Implies::None,
        Some(RawImplies::Name(n)) if n == "*" => Implies::All,
        Some(RawImplies::Name(n)) => Implies::Types(vec![n]),
        Some(RawImplies::List(list)) if list.iter().any(|n| n == "*") => Implies::All,
        Some(RawImplies::List(list)) => Implies::Types(list),
        Some(RawImplies::Except { except }) => Implies::AllExcept(except),
    };
    let constants = fold(raw.constants, &format!("property '{}' constants", name))?;
    let rewrite = |expr: Option<Expression>| expr.map(|e| e.substitute_self(name));

    Ok(PropertyDefinition {
        description: raw.description,
        value,
        combine,
        dependencies,
        implies,
        constants,
        hide: raw.hide,
        display: EdgeDisplay {
            color: rewrite(raw.display.color),
            width: rewrite(raw.display.width),
            opacity: rewrite(raw.display.opacity),
            distinct: rewrite(raw.display.distinct),
        },
    })
}

fn node_definition(id: &str, raw: RawNodeDefinition) -> Result<NodeDefinition> {
    let context = format!("node '{}'", id);
    let mut edges = Vec::new();

    match raw.edges {
        None => {}
        Some(RawEdges::List(list)) => {
            for edge in list {
                edges.push(EdgeValue {
                    ref_id: edge.ref_id.filter(|r| !r.is_empty()),
                    property_type: edge.property_type,
                    constants: fold(edge.constants, &context)?,
                });
            }
        }
        Some(RawEdges::ByTarget(targets)) => {
            for (target, types) in targets {
                for (property_type, constants) in types {
                    push_edges(&mut edges, &target, &property_type, constants, &context)?;
                }
            }
        }
    }
    for (property_type, targets) in raw.edges_by_type {
        for (target, constants) in targets {
            push_edges(&mut edges, &target, &property_type, constants, &context)?;
        }
    }

    Ok(NodeDefinition {
        description: raw.description,
        name: raw.name,
        values: fold(raw.values, &context)?,
        edges,
        tags: raw.tags,
        display: node_display(raw.display),
    })
}

fn push_edges(
    edges: &mut Vec<EdgeValue>,
    target: &str,
    property_type: &str,
    constants: RawEdgeConstants,
    context: &str,
) -> Result<()> {
    for constants in constants.into_vec() {
        edges.push(EdgeValue {
            ref_id: (!target.is_empty()).then(|| target.to_string()),
            property_type: property_type.to_string(),
            constants: fold(constants, context)?,
        });
    }
    Ok(())
}

fn node_display(raw: RawNodeStyle) -> NodeDisplay {
    NodeDisplay {
        radius: raw.radius,
        color: raw.color,
        opacity: raw.opacity,
    }
}

fn scenario_definition(name: &str, raw: RawScenario) -> Result<Scenario> {
    let context = format!("scenario '{}'", name);
    let values = raw
        .values
        .into_iter()
        .map(|(node, overrides)| Ok((node, fold(overrides, &context)?)))
        .collect::<Result<IndexMap<_, _>>>()?;
    Ok(Scenario {
        description: raw.description,
        values,
    })
}

/// Fold numbers, booleans and nulls into plain numbers.
fn fold(raw: RawScalars, context: &str) -> Result<IndexMap<String, f64>> {
    raw.into_iter()
        .map(|(key, value)| {
            let number =
                leaf(&value).map_err(|err| with_context(err, &format!("{} '{}'", context, key)))?;
            Ok((key, number))
        })
        .collect()
}

fn with_context(err: Error, context: &str) -> Error {
    match err {
        Error::Parse(message) => Error::Parse(format!("{}: {}", context, message)),
        other => other,
    }
}
