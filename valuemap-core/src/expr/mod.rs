//! Expression Language
//!
//! Property values, edge styles and node styles are all written in a small
//! declarative expression language. This module holds its syntax tree, the
//! static validator, and the evaluator.
//!
//! # Concepts
//!
//! ## Arrays, not scalars
//!
//! Every expression evaluates to a non-empty array of numbers. A property
//! expression runs once per node over all of that node's edges of the
//! property's type, so `{"edge": "weight"}` yields one number per edge. The
//! property's combiner then reduces the array to the node's value.
//!
//! ## Sentinels
//!
//! Booleans and "no value" are numbers too: see [`crate::value`].
//!
//! ## Capabilities
//!
//! Lookups of outside data (edge constants, parent/root/result values, the
//! input array, tags) are grouped into [`Capability`] classes. Each place an
//! expression can appear allows a fixed set of them, checked once by
//! [`validate`] and again by [`evaluate`].
//!
//! # Implementation Notes
//!
//! The tree is a plain enum. JSON objects are matched to a variant by their
//! single marker field, and parsing fails if an object has zero or several
//! markers, so every form is handled exhaustively by `match`.

mod ast;
mod context;
mod eval;
mod refs;
mod validate;

pub use ast::{BinaryOp, Comparator, Expression, LengthMode, TagScope, UnaryOp, SELF};
pub use context::{Binding, Capabilities, Capability, EvalContext, TagContext, TagScopes};
pub use eval::{evaluate, evaluate_scalar};
pub use validate::{validate, ValidationScope};

pub(crate) use ast::leaf;
