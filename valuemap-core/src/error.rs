//! Errors raised while building or querying a map.
//!
//! Construction failures (schema, reference and structural errors) abort the
//! constructor; evaluation failures abort the accessor that triggered them.
//! Nothing is retried and nothing is defaulted here.

use thiserror::Error;

use crate::expr::Capability;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong in the core.
#[derive(Debug, Error)]
pub enum Error {
    // ----- schema / reference ---------------------------------------------
    #[error("could not parse definition: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid expression: {0}")]
    Parse(String),

    #[error("unsupported definition version {found} (supported up to {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("unknown library '{0}'")]
    UnknownLibrary(String),

    #[error("{context}: unknown property '{name}'")]
    UnknownProperty { context: String, name: String },

    #[error("{context}: unknown node '{id}'")]
    UnknownNode { context: String, id: String },

    #[error("unknown scenario '{0}'")]
    UnknownScenario(String),

    #[error("{context}: unknown constant '{name}'")]
    UnknownConstant { context: String, name: String },

    #[error("{context}: unknown tag '{name}'")]
    UnknownTag { context: String, name: String },

    #[error("{context}: '{name}' is reserved")]
    ReservedName { context: String, name: String },

    #[error("invalid node id '{id}': {reason}")]
    InvalidNodeId { id: String, reason: String },

    #[error("{context}: clip needs at least one of 'low' or 'high'")]
    EmptyClip { context: String },

    #[error("{context}: collect needs at least one expression")]
    EmptyCollect { context: String },

    // ----- structural ------------------------------------------------------
    #[error("cycle detected in {graph}: {nodes:?}")]
    CycleDetected { graph: String, nodes: Vec<String> },

    #[error("{context}: result '{name}' is not a declared dependency")]
    UndeclaredDependency { context: String, name: String },

    #[error("{context}: variable '{name}' is not bound by an enclosing let")]
    UnboundVariable { context: String, name: String },

    #[error("{context}: let '{name}' shadows an enclosing binding")]
    ShadowedVariable { context: String, name: String },

    #[error("{context}: {capability} access is not available here")]
    CapabilityDenied {
        context: String,
        capability: Capability,
    },

    // ----- runtime ---------------------------------------------------------
    #[error("{context}: expression produced no values")]
    EmptyResult { context: String },

    #[error("evaluation failed: {0}")]
    Evaluation(String),
}

impl Error {
    pub(crate) fn unknown_property(context: impl Into<String>, name: impl Into<String>) -> Self {
        Error::UnknownProperty {
            context: context.into(),
            name: name.into(),
        }
    }

    pub(crate) fn unknown_node(context: impl Into<String>, id: impl Into<String>) -> Self {
        Error::UnknownNode {
            context: context.into(),
            id: id.into(),
        }
    }
}
