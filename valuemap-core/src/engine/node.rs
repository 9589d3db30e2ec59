//! Read-only view of one node in an [`AdjacencyMap`].

use std::sync::Arc;

use super::compute::NodeStyle;
use super::dump::dump_values;
use super::render::RenderEdge;
use super::{AdjacencyMap, NodeLinks};
use crate::definition::{ExpandedEdgeValue, NodeDefinition};
use crate::error::{Error, Result};
use crate::expr::TagScopes;
use crate::value::Values;

/// A node of a map. Cheap to create; every derived quantity is cached on
/// the map, not the view.
#[derive(Clone, Copy)]
pub struct Node<'a> {
    map: &'a AdjacencyMap,
    id: &'a str,
    definition: &'a NodeDefinition,
    links: &'a NodeLinks,
}

impl<'a> Node<'a> {
    pub(super) fn new(
        map: &'a AdjacencyMap,
        id: &'a str,
        definition: &'a NodeDefinition,
        links: &'a NodeLinks,
    ) -> Self {
        Self {
            map,
            id,
            definition,
            links,
        }
    }

    pub fn id(&self) -> &'a str {
        self.id
    }

    pub fn description(&self) -> &'a str {
        &self.definition.description
    }

    /// Display name; the id when the node has none.
    pub fn name(&self) -> &'a str {
        self.definition.name.as_deref().unwrap_or(self.id)
    }

    pub fn definition(&self) -> &'a NodeDefinition {
        self.definition
    }

    /// Computed values for every property, in property order.
    pub fn values(&self) -> Result<Arc<Values>> {
        self.map.values_of(self.id)
    }

    pub fn value(&self, property: &str) -> Result<f64> {
        self.values()?
            .get(property)
            .copied()
            .ok_or_else(|| Error::unknown_property(format!("node '{}'", self.id), property))
    }

    /// Authored plus implied edges.
    pub fn edges(&self) -> Result<Arc<Vec<ExpandedEdgeValue>>> {
        self.map.expanded_edges(self.id)
    }

    pub fn render_edges(&self) -> Result<Arc<Vec<RenderEdge>>> {
        self.map.render_edges_of(self.id)
    }

    pub fn style(&self) -> Result<Arc<NodeStyle>> {
        self.map.style_of(self.id)
    }

    /// Ids this node has edges to, excluding the root.
    pub fn parent_ids(&self) -> &'a [String] {
        &self.links.parents
    }

    /// Ids of nodes with edges to this one.
    pub fn child_ids(&self) -> &'a [String] {
        &self.links.children
    }

    pub fn tags(&self) -> &'a TagScopes {
        &self.links.tags
    }

    /// Whether the computed values are currently cached.
    pub fn is_cached(&self) -> bool {
        self.links.cache.values.is_cached()
    }

    pub fn dump(&self, include_hidden: bool) -> Result<String> {
        let values = self.values()?;
        let header = if self.name() == self.id {
            self.id.to_string()
        } else {
            format!("{} ({})", self.name(), self.id)
        };
        Ok(dump_values(
            &header,
            self.map.definition(),
            self.map.property_order(),
            &values,
            include_hidden,
        ))
    }
}

impl std::fmt::Debug for Node<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("parents", &self.links.parents)
            .finish()
    }
}
