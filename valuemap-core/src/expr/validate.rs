//! Static validation of expressions.
//!
//! Walks an expression tree once, before any evaluation, and rejects:
//!
//! - a `clip` with neither bound, or an empty `collect`
//! - edge constants the owning property does not declare
//! - `parent`/`root`/`result` lookups of unknown properties
//! - `result` lookups the owning property did not declare as dependencies
//! - `variable`s with no enclosing `let`, and `let`s that shadow one
//! - any capability the surrounding context disallows

use indexmap::IndexMap;

use super::ast::Expression;
use super::context::Capabilities;
use crate::definition::{PropertyDefinition, RESERVED_CONSTANTS};
use crate::error::{Error, Result};

/// Where an expression lives, and therefore what it may reference.
#[derive(Debug, Clone, Copy)]
pub struct ValidationScope<'a> {
    /// Prefix for error messages, e.g. `property 'cost' value`.
    pub label: &'a str,
    pub capabilities: Capabilities,
    pub properties: &'a IndexMap<String, PropertyDefinition>,
    /// Constants of the owning property, if the expression has one.
    pub constants: Option<&'a IndexMap<String, f64>>,
    /// When set, `result` lookups must name one of these.
    pub dependencies: Option<&'a [String]>,
}

/// Validate `expr` in `scope`.
pub fn validate(expr: &Expression, scope: &ValidationScope<'_>) -> Result<()> {
    let mut bindings = Vec::new();
    check(expr, scope, &mut bindings)
}

fn check<'e>(
    expr: &'e Expression,
    scope: &ValidationScope<'_>,
    bindings: &mut Vec<&'e str>,
) -> Result<()> {
    if let Some(capability) = expr.capability() {
        if !scope.capabilities.allows(capability) {
            return Err(Error::CapabilityDenied {
                context: scope.label.to_string(),
                capability,
            });
        }
    }

    match expr {
        Expression::EdgeConstant(name) => {
            let declared = scope
                .constants
                .map(|constants| constants.contains_key(name))
                .unwrap_or(false);
            if !declared && !RESERVED_CONSTANTS.contains(&name.as_str()) {
                return Err(Error::UnknownConstant {
                    context: scope.label.to_string(),
                    name: name.clone(),
                });
            }
        }
        Expression::Parent(name) | Expression::Root(name) => {
            known_property(scope, name)?;
        }
        Expression::Result(name) => {
            known_property(scope, name)?;
            if let Some(dependencies) = scope.dependencies {
                if !dependencies.iter().any(|d| d == name) {
                    return Err(Error::UndeclaredDependency {
                        context: scope.label.to_string(),
                        name: name.clone(),
                    });
                }
            }
        }
        Expression::Clip {
            low: None,
            high: None,
            ..
        } => {
            return Err(Error::EmptyClip {
                context: scope.label.to_string(),
            });
        }
        Expression::Collect(items) if items.is_empty() => {
            return Err(Error::EmptyCollect {
                context: scope.label.to_string(),
            });
        }
        Expression::Variable(name) => {
            if !bindings.contains(&name.as_str()) {
                return Err(Error::UnboundVariable {
                    context: scope.label.to_string(),
                    name: name.clone(),
                });
            }
        }
        Expression::Let { name, value, block } => {
            if bindings.contains(&name.as_str()) {
                return Err(Error::ShadowedVariable {
                    context: scope.label.to_string(),
                    name: name.clone(),
                });
            }
            // The bound value cannot see its own name.
            check(value, scope, bindings)?;
            bindings.push(name);
            let outcome = check(block, scope, bindings);
            bindings.pop();
            return outcome;
        }
        _ => {}
    }

    let mut outcome = Ok(());
    expr.for_each_child(&mut |child| {
        if outcome.is_ok() {
            outcome = check(child, scope, bindings);
        }
    });
    outcome
}

fn known_property(scope: &ValidationScope<'_>, name: &str) -> Result<()> {
    if scope.properties.contains_key(name) {
        Ok(())
    } else {
        Err(Error::unknown_property(scope.label, name))
    }
}
