//! Graph Engine
//!
//! An [`AdjacencyMap`] owns one validated [`MapDefinition`] plus the name of
//! the active scenario, and answers queries about it: per-node computed
//! values, expanded edges, render edges and styles, root values and the
//! aggregate across all nodes.
//!
//! # How it works
//!
//! Construction validates the whole definition and fixes two orders:
//! properties after their dependencies, and nodes after their edge targets.
//! It also precomputes each node's parents, children and tag scopes. Nothing
//! else is computed up front.
//!
//! Every derived quantity lives in a [`Cached`] cell and is computed on first
//! read. When any property reads parent values, a query first fills the
//! node's uncached ancestors one at a time in node order, so computing a
//! node only ever reads parent cells that are already filled and the call
//! depth stays constant however deep the graph is.
//!
//! # Invalidation
//!
//! Switching scenario empties every node's values, render-edge and style
//! cells plus the aggregate, since a change anywhere upstream can reach any
//! node through parent or result lookups. The root cell is emptied only when
//! the old or new scenario overrides root values. Expanded edges never
//! depend on the scenario and stay cached.

mod cache;
mod compute;
mod dump;
mod expand;
mod node;
mod render;
mod validate;

pub use cache::{CacheState, Cached};
pub use compute::NodeStyle;
pub use node::Node;
pub use render::RenderEdge;

use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::definition::{
    ExpandedEdgeValue, LibrarySet, MapDefinition, Scenario, DEFAULT_SCENARIO, ROOT,
};
use crate::error::{Error, Result};
use crate::expr::{Capability, TagContext, TagScopes};
use crate::value::Values;

use self::dump::dump_values;
use self::expand::expand_edges;
use self::validate::{validate_map, Validated};

/// A validated map with lazily computed, scenario-aware state.
pub struct AdjacencyMap {
    definition: Arc<MapDefinition>,
    config: EngineConfig,
    scenario_name: String,
    property_order: Vec<String>,
    links: IndexMap<String, NodeLinks>,
    /// Whether any property expression reads parent values.
    reads_parents: bool,
    root: Cached<Values>,
    aggregate: Cached<Values>,
}

/// Per-node structure fixed at construction, plus the node's caches.
#[derive(Debug, Default)]
pub(crate) struct NodeLinks {
    /// Position in node order; edge targets come first.
    position: usize,
    parents: Vec<String>,
    children: Vec<String>,
    tags: TagScopes,
    cache: NodeCache,
}

#[derive(Debug, Default)]
struct NodeCache {
    edges: Cached<Vec<ExpandedEdgeValue>>,
    values: Cached<Values>,
    render: Cached<Vec<RenderEdge>>,
    style: Cached<NodeStyle>,
}

impl AdjacencyMap {
    /// Validate `definition` and build an engine with the default config,
    /// on the default scenario.
    pub fn new(definition: impl Into<Arc<MapDefinition>>) -> Result<Self> {
        Self::with_config(definition, EngineConfig::default())
    }

    pub fn with_config(
        definition: impl Into<Arc<MapDefinition>>,
        config: EngineConfig,
    ) -> Result<Self> {
        let definition = definition.into();
        let Validated {
            property_order,
            node_order,
        } = validate_map(&definition)?;
        let links = link_nodes(&definition, &node_order);
        let reads_parents = definition
            .properties
            .values()
            .any(|property| property.value.uses(Capability::ParentValue));

        info!(
            nodes = definition.nodes.len(),
            properties = property_order.len(),
            scenarios = definition.scenarios.len(),
            "built adjacency map"
        );

        Ok(Self {
            definition,
            config,
            scenario_name: DEFAULT_SCENARIO.to_string(),
            property_order,
            links,
            reads_parents,
            root: Cached::new(),
            aggregate: Cached::new(),
        })
    }

    /// Process a raw JSON definition and build an engine from it.
    pub fn from_json(json: &serde_json::Value, libraries: &LibrarySet) -> Result<Self> {
        Self::new(MapDefinition::from_json(json, libraries)?)
    }

    pub fn definition(&self) -> &MapDefinition {
        &self.definition
    }

    /// The shared definition, for building more engines over it.
    pub fn shared_definition(&self) -> Arc<MapDefinition> {
        Arc::clone(&self.definition)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Property names, each after all of its dependencies.
    pub fn property_order(&self) -> &[String] {
        &self.property_order
    }

    pub fn scenario_name(&self) -> &str {
        &self.scenario_name
    }

    /// The active overlay; `None` on the default scenario.
    pub fn scenario(&self) -> Option<&Scenario> {
        self.definition.scenario(&self.scenario_name)
    }

    /// Switch the active scenario and invalidate what it can affect.
    /// The default scenario (`""`) is always accepted.
    pub fn set_scenario(&mut self, name: &str) -> Result<()> {
        if name != DEFAULT_SCENARIO && !self.definition.scenarios.contains_key(name) {
            return Err(Error::UnknownScenario(name.to_string()));
        }
        if name == self.scenario_name {
            return Ok(());
        }

        let touches_root = |name: &str| {
            self.definition
                .scenario(name)
                .map_or(false, Scenario::touches_root)
        };
        let root_touched = touches_root(&self.scenario_name) || touches_root(name);

        debug!(
            from = %self.scenario_name,
            to = name,
            root_touched,
            "switching scenario"
        );
        self.scenario_name = name.to_string();
        self.invalidate(root_touched);
        Ok(())
    }

    fn invalidate(&self, root: bool) {
        let mut dropped = 0usize;
        for links in self.links.values() {
            let cache = &links.cache;
            for emptied in [
                cache.values.invalidate(),
                cache.render.invalidate(),
                cache.style.invalidate(),
            ] {
                dropped += usize::from(emptied);
            }
        }
        self.aggregate.invalidate();
        if root {
            self.root.invalidate();
        }
        debug!(dropped, root, "invalidated caches");
    }

    /// Zero for every property, overlaid by root defaults and the active
    /// scenario's root overrides.
    pub fn root_values(&self) -> Result<Arc<Values>> {
        self.root
            .get_or_try_init(|| Ok(compute::root_values(self)))
    }

    pub fn is_root_cached(&self) -> bool {
        self.root.is_cached()
    }

    pub fn node(&self, id: &str) -> Result<Node<'_>> {
        let (key, definition) = self
            .definition
            .nodes
            .get_key_value(id)
            .ok_or_else(|| Error::unknown_node("map", id))?;
        let links = self.links_of(id)?;
        Ok(Node::new(self, key, definition, links))
    }

    /// Every node, in definition order.
    pub fn nodes(&self) -> impl Iterator<Item = Node<'_>> + '_ {
        self.definition.nodes.iter().filter_map(move |(id, definition)| {
            self.links
                .get(id)
                .map(|links| Node::new(self, id, definition, links))
        })
    }

    pub fn node_count(&self) -> usize {
        self.definition.nodes.len()
    }

    /// Each property reduced across all nodes with its own combiner.
    pub fn aggregate(&self) -> Result<Arc<Values>> {
        self.aggregate
            .get_or_try_init(|| compute::aggregate(self))
    }

    pub fn is_aggregate_cached(&self) -> bool {
        self.aggregate.is_cached()
    }

    pub fn dump_aggregate(&self, include_hidden: bool) -> Result<String> {
        let values = self.aggregate()?;
        Ok(dump_values(
            "aggregate",
            &self.definition,
            &self.property_order,
            &values,
            include_hidden,
        ))
    }

    fn links_of(&self, id: &str) -> Result<&NodeLinks> {
        self.links
            .get(id)
            .ok_or_else(|| Error::unknown_node("map", id))
    }

    /// Values of a node, or of the root for [`ROOT`].
    fn values_of(&self, id: &str) -> Result<Arc<Values>> {
        if id == ROOT {
            return self.root_values();
        }
        let links = self.links_of(id)?;
        if self.reads_parents && !links.cache.values.is_cached() {
            self.fill_ancestors(id)?;
        }
        links
            .cache
            .values
            .get_or_try_init(|| compute::node_values(self, id))
    }

    /// Compute the values of every uncached ancestor of `id`, edge targets
    /// first. Walks the parent links with an explicit stack and stops at
    /// cached nodes, whose own ancestors are cached too.
    fn fill_ancestors(&self, id: &str) -> Result<()> {
        let mut pending: IndexSet<&str> = IndexSet::new();
        let mut stack = vec![self.links_of(id)?];
        while let Some(links) = stack.pop() {
            for parent in &links.parents {
                let parent_links = self.links_of(parent)?;
                if parent_links.cache.values.is_cached() || !pending.insert(parent.as_str()) {
                    continue;
                }
                stack.push(parent_links);
            }
        }

        let mut ordered: Vec<(usize, &str)> = Vec::with_capacity(pending.len());
        for ancestor in pending {
            ordered.push((self.links_of(ancestor)?.position, ancestor));
        }
        ordered.sort_unstable_by_key(|(position, _)| *position);

        debug!(node = id, ancestors = ordered.len(), "filling ancestor values");
        for (_, ancestor) in ordered {
            self.links_of(ancestor)?
                .cache
                .values
                .get_or_try_init(|| compute::node_values(self, ancestor))?;
        }
        Ok(())
    }

    fn expanded_edges(&self, id: &str) -> Result<Arc<Vec<ExpandedEdgeValue>>> {
        self.links_of(id)?.cache.edges.get_or_try_init(|| {
            let node = self
                .definition
                .node(id)
                .ok_or_else(|| Error::unknown_node("edges", id))?;
            Ok(expand_edges(&self.definition, id, node))
        })
    }

    fn render_edges_of(&self, id: &str) -> Result<Arc<Vec<RenderEdge>>> {
        self.links_of(id)?
            .cache
            .render
            .get_or_try_init(|| render::render_edges(self, id))
    }

    fn style_of(&self, id: &str) -> Result<Arc<NodeStyle>> {
        self.links_of(id)?
            .cache
            .style
            .get_or_try_init(|| compute::node_style(self, id))
    }

    fn tag_context(&self, id: &str) -> Option<TagContext<'_>> {
        self.links.get(id).map(|links| TagContext {
            definitions: &self.definition.tags,
            scopes: &links.tags,
        })
    }
}

impl std::fmt::Debug for AdjacencyMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdjacencyMap")
            .field("scenario", &self.scenario_name)
            .field("properties", &self.property_order)
            .field("nodes", &self.links.len())
            .finish()
    }
}

/// Parents, children and tag scopes of every node. `node_order` lists edge
/// targets before the nodes pointing at them.
fn link_nodes(definition: &MapDefinition, node_order: &[String]) -> IndexMap<String, NodeLinks> {
    let mut links: IndexMap<String, NodeLinks> = definition
        .nodes
        .keys()
        .map(|id| (id.clone(), NodeLinks::default()))
        .collect();

    for (id, node) in &definition.nodes {
        let parents: IndexSet<&str> = node
            .edges
            .iter()
            .filter_map(|edge| edge.ref_id.as_deref())
            .collect();
        for parent in &parents {
            if let Some(parent_links) = links.get_mut(*parent) {
                parent_links.children.push(id.clone());
            }
        }
        if let Some(own) = links.get_mut(id) {
            own.parents = parents.into_iter().map(str::to_string).collect();
        }
    }

    for (position, id) in node_order.iter().enumerate() {
        let Some(node) = definition.node(id) else {
            continue;
        };
        if let Some(current) = links.get_mut(id) {
            current.position = position;
        }
        let own: IndexSet<String> = node.tags.iter().cloned().collect();
        let mut all = own.clone();
        if let Some(current) = links.get(id) {
            for parent in &current.parents {
                if let Some(parent_links) = links.get(parent) {
                    all.extend(parent_links.tags.all.iter().cloned());
                }
            }
        }
        let extended = all.difference(&own).cloned().collect();
        if let Some(current) = links.get_mut(id) {
            current.tags = TagScopes {
                own,
                all,
                extended,
            };
        }
    }

    links
}
