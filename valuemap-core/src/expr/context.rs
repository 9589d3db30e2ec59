//! Evaluation Context
//!
//! Everything an expression may read while it is evaluated: the edges being
//! processed, their parents' values, the root's values, the node's partial
//! results, an optional input array, `let` bindings and tag membership.
//!
//! # Capabilities
//!
//! Each kind of outside data belongs to a capability class. A context
//! carries the set of classes it allows; the validator rejects expressions
//! that use a disallowed class and the evaluator refuses them at runtime.
//! For example, the map-wide edge-combiner expressions run with no edge
//! access, only an input array.
//!
//! # Implementation
//!
//! A context is a bundle of shared references and is `Copy`. Entering a
//! `let` block copies the context with one more [`Binding`] pushed on a
//! stack-allocated linked list, so evaluation never mutates a context it was
//! given.

use std::fmt;
use std::sync::Arc;

use indexmap::{IndexMap, IndexSet};

use crate::definition::{ExpandedEdgeValue, TagDefinition};
use crate::value::{Numbers, Values};

/// A class of outside data an expression can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    EdgeConstant,
    ParentValue,
    RootValue,
    ResultValue,
    Input,
    TagHas,
    TagConstant,
}

impl Capability {
    fn bit(self) -> u8 {
        match self {
            Capability::EdgeConstant => 1 << 0,
            Capability::ParentValue => 1 << 1,
            Capability::RootValue => 1 << 2,
            Capability::ResultValue => 1 << 3,
            Capability::Input => 1 << 4,
            Capability::TagHas => 1 << 5,
            Capability::TagConstant => 1 << 6,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Capability::EdgeConstant => "edge",
            Capability::ParentValue => "parent value",
            Capability::RootValue => "root value",
            Capability::ResultValue => "result value",
            Capability::Input => "input",
            Capability::TagHas => "tag membership",
            Capability::TagConstant => "tag constant",
        })
    }
}

/// A set of allowed capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities(u8);

impl Capabilities {
    pub const NONE: Capabilities = Capabilities(0);
    pub const ALL: Capabilities = Capabilities(0x7f);

    /// A property's value expression: everything but input.
    pub fn property() -> Self {
        Self::ALL.without(Capability::Input)
    }

    /// A property's per-type edge display expressions.
    pub fn edge_display() -> Self {
        Self::ALL.without(Capability::Input)
    }

    /// Map-wide edge combiners: reduce an input array, no edge access.
    pub fn edge_combiner() -> Self {
        Self::ALL
            .without(Capability::EdgeConstant)
            .without(Capability::ParentValue)
    }

    /// Node display expressions: the node's own results and the root.
    pub fn node_display() -> Self {
        Self::ALL
            .without(Capability::EdgeConstant)
            .without(Capability::ParentValue)
            .without(Capability::Input)
    }

    pub fn with(self, capability: Capability) -> Self {
        Capabilities(self.0 | capability.bit())
    }

    pub fn without(self, capability: Capability) -> Self {
        Capabilities(self.0 & !capability.bit())
    }

    pub fn allows(self, capability: Capability) -> bool {
        self.0 & capability.bit() != 0
    }
}

/// Tag membership of one node, precomputed once per map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagScopes {
    /// The node's own tags.
    pub own: IndexSet<String>,
    /// Own tags plus every tag reachable through parents.
    pub all: IndexSet<String>,
    /// `all` minus `own`.
    pub extended: IndexSet<String>,
}

/// Tag definitions plus one node's scopes.
#[derive(Debug, Clone, Copy)]
pub struct TagContext<'a> {
    pub definitions: &'a IndexMap<String, TagDefinition>,
    pub scopes: &'a TagScopes,
}

/// One `let` binding, linked to the bindings of enclosing blocks.
#[derive(Debug)]
pub struct Binding<'a> {
    pub name: &'a str,
    pub value: Numbers,
    pub parent: Option<&'a Binding<'a>>,
}

impl<'a> Binding<'a> {
    pub fn lookup(&self, name: &str) -> Option<&Numbers> {
        let mut current = Some(self);
        while let Some(binding) = current {
            if binding.name == name {
                return Some(&binding.value);
            }
            current = binding.parent;
        }
        None
    }
}

/// Read-only view of the data an expression is evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    /// Label used in error messages (usually `node.property`).
    pub label: &'a str,
    pub capabilities: Capabilities,
    /// Edges being processed, constants already merged with the property's.
    pub edges: &'a [ExpandedEdgeValue],
    /// Values of each edge's ref node, parallel to `edges`. Empty when the
    /// expression does not read parent values.
    pub parents: &'a [Arc<Values>],
    pub root: &'a Values,
    /// Values computed so far on the current node.
    pub results: &'a Values,
    pub input: &'a [f64],
    pub tags: Option<TagContext<'a>>,
    pub bindings: Option<&'a Binding<'a>>,
}

impl<'a> EvalContext<'a> {
    /// A context with no data and the given capabilities. Callers fill in
    /// the fields they have with struct update syntax.
    pub fn empty(label: &'a str, capabilities: Capabilities, root: &'a Values) -> Self {
        Self {
            label,
            capabilities,
            edges: &[],
            parents: &[],
            root,
            results: root,
            input: &[],
            tags: None,
            bindings: None,
        }
    }

    pub fn variable(&self, name: &str) -> Option<&'a Numbers> {
        self.bindings.and_then(|binding| binding.lookup(name))
    }
}
