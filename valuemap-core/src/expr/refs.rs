//! Tree walks over expressions: child traversal, reference extraction,
//! capability usage, and the `self` rewrite.

use super::ast::{Expression, LengthMode, SELF};
use super::context::Capability;

impl Expression {
    /// Call `f` on each direct sub-expression, in field order.
    pub fn for_each_child<'a>(&'a self, f: &mut dyn FnMut(&'a Expression)) {
        match self {
            Expression::Literal(_)
            | Expression::Array(_)
            | Expression::Input
            | Expression::EdgeConstant(_)
            | Expression::Parent(_)
            | Expression::Root(_)
            | Expression::Result(_)
            | Expression::Color(_)
            | Expression::HasTag { .. }
            | Expression::Variable(_) => {}
            Expression::Reduce { value, .. }
            | Expression::Unary { a: value, .. }
            | Expression::LengthOf { value, .. }
            | Expression::Log { value, .. } => f(value),
            Expression::Rgb { r, g, b } => {
                f(r);
                f(g);
                f(b);
            }
            Expression::Gradient { value, from, to } => {
                f(value);
                f(from);
                f(to);
            }
            Expression::Binary { a, b, .. } | Expression::Compare { a, b, .. } => {
                f(a);
                f(b);
            }
            Expression::If {
                condition,
                then,
                otherwise,
            } => {
                f(condition);
                f(then);
                if let Some(otherwise) = otherwise {
                    f(otherwise);
                }
            }
            Expression::Filter {
                filter,
                value,
                default,
            } => {
                f(filter);
                f(value);
                if let Some(default) = default {
                    f(default);
                }
            }
            Expression::Clip { value, low, high }
            | Expression::Range { value, low, high }
            | Expression::Percent { value, low, high } => {
                f(value);
                if let Some(low) = low {
                    f(low);
                }
                if let Some(high) = high {
                    f(high);
                }
            }
            Expression::Collect(items) => {
                for item in items {
                    f(item);
                }
            }
            Expression::TagConstant { default, .. } => {
                if let Some(default) = default {
                    f(default);
                }
            }
            Expression::Let { value, block, .. } => {
                f(value);
                f(block);
            }
        }
    }

    /// The capability this node itself needs, ignoring its children.
    pub fn capability(&self) -> Option<Capability> {
        match self {
            Expression::Input => Some(Capability::Input),
            Expression::EdgeConstant(_) => Some(Capability::EdgeConstant),
            Expression::Parent(_) => Some(Capability::ParentValue),
            Expression::Root(_) => Some(Capability::RootValue),
            Expression::Result(_) => Some(Capability::ResultValue),
            Expression::LengthOf { mode, .. } => Some(match mode {
                LengthMode::Refs => Capability::ParentValue,
                LengthMode::Edges => Capability::EdgeConstant,
                LengthMode::Input => Capability::Input,
            }),
            Expression::HasTag { .. } => Some(Capability::TagHas),
            Expression::TagConstant { .. } => Some(Capability::TagConstant),
            _ => None,
        }
    }

    /// Whether this expression reads `capability` anywhere in its tree.
    pub fn uses(&self, capability: Capability) -> bool {
        if self.capability() == Some(capability) {
            return true;
        }
        let mut found = false;
        self.for_each_child(&mut |child| {
            found = found || child.uses(capability);
        });
        found
    }

    /// Property names read through `result` references, in first-seen order
    /// without duplicates.
    pub fn result_references(&self) -> Vec<String> {
        fn walk(expr: &Expression, out: &mut Vec<String>) {
            if let Expression::Result(name) = expr {
                if !out.iter().any(|seen| seen == name) {
                    out.push(name.clone());
                }
            }
            expr.for_each_child(&mut |child| walk(child, out));
        }

        let mut out = Vec::new();
        walk(self, &mut out);
        out
    }

    /// Produce a new tree with `self` in `parent`/`root`/`result` lookups
    /// replaced by `owner`. The original tree is left untouched.
    pub fn substitute_self(&self, owner: &str) -> Expression {
        self.rewrite(&|expr| {
            let rename = |name: &String| {
                if name == SELF {
                    owner.to_string()
                } else {
                    name.clone()
                }
            };
            match expr {
                Expression::Parent(name) => Some(Expression::Parent(rename(name))),
                Expression::Root(name) => Some(Expression::Root(rename(name))),
                Expression::Result(name) => Some(Expression::Result(rename(name))),
                _ => None,
            }
        })
    }

    /// Rebuild the tree bottom-up. Wherever `replace` returns `Some`, that
    /// node is swapped for the returned expression.
    pub fn rewrite(&self, replace: &dyn Fn(&Expression) -> Option<Expression>) -> Expression {
        if let Some(replacement) = replace(self) {
            return replacement;
        }
        let boxed = |e: &Expression| Box::new(e.rewrite(replace));
        let optional = |e: &Option<Box<Expression>>| e.as_ref().map(|e| boxed(e));

        match self {
            Expression::Literal(_)
            | Expression::Array(_)
            | Expression::Input
            | Expression::EdgeConstant(_)
            | Expression::Parent(_)
            | Expression::Root(_)
            | Expression::Result(_)
            | Expression::Color(_)
            | Expression::HasTag { .. }
            | Expression::Variable(_) => self.clone(),
            Expression::Reduce { value, combine } => Expression::Reduce {
                value: boxed(value),
                combine: *combine,
            },
            Expression::Rgb { r, g, b } => Expression::Rgb {
                r: boxed(r),
                g: boxed(g),
                b: boxed(b),
            },
            Expression::Gradient { value, from, to } => Expression::Gradient {
                value: boxed(value),
                from: boxed(from),
                to: boxed(to),
            },
            Expression::Unary { op, a } => Expression::Unary {
                op: *op,
                a: boxed(a),
            },
            Expression::Binary { op, a, b } => Expression::Binary {
                op: *op,
                a: boxed(a),
                b: boxed(b),
            },
            Expression::Compare { op, a, b } => Expression::Compare {
                op: *op,
                a: boxed(a),
                b: boxed(b),
            },
            Expression::If {
                condition,
                then,
                otherwise,
            } => Expression::If {
                condition: boxed(condition),
                then: boxed(then),
                otherwise: optional(otherwise),
            },
            Expression::Filter {
                filter,
                value,
                default,
            } => Expression::Filter {
                filter: boxed(filter),
                value: boxed(value),
                default: optional(default),
            },
            Expression::Clip { value, low, high } => Expression::Clip {
                value: boxed(value),
                low: optional(low),
                high: optional(high),
            },
            Expression::Range { value, low, high } => Expression::Range {
                value: boxed(value),
                low: optional(low),
                high: optional(high),
            },
            Expression::Percent { value, low, high } => Expression::Percent {
                value: boxed(value),
                low: optional(low),
                high: optional(high),
            },
            Expression::Collect(items) => {
                Expression::Collect(items.iter().map(|item| item.rewrite(replace)).collect())
            }
            Expression::LengthOf { mode, value } => Expression::LengthOf {
                mode: *mode,
                value: boxed(value),
            },
            Expression::TagConstant {
                name,
                scope,
                default,
            } => Expression::TagConstant {
                name: name.clone(),
                scope: *scope,
                default: optional(default),
            },
            Expression::Let { name, value, block } => Expression::Let {
                name: name.clone(),
                value: boxed(value),
                block: boxed(block),
            },
            Expression::Log { value, label } => Expression::Log {
                value: boxed(value),
                label: label.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(json: serde_json::Value) -> Expression {
        Expression::from_json(&json).unwrap()
    }

    #[test]
    fn result_references_are_unique_and_ordered() {
        let expr = parse(json!({
            "operator": "+",
            "a": {"result": "b"},
            "b": {"collect": [{"result": "a"}, {"result": "b"}, {"edge": "w"}]}
        }));
        assert_eq!(expr.result_references(), vec!["b", "a"]);
    }

    #[test]
    fn uses_finds_nested_capabilities() {
        let expr = parse(json!({
            "if": {"hasTag": "x"},
            "then": {"reduce": {"parent": "cost"}},
            "else": 0
        }));
        assert!(expr.uses(Capability::ParentValue));
        assert!(expr.uses(Capability::TagHas));
        assert!(!expr.uses(Capability::EdgeConstant));
        assert!(parse(json!({"lengthOf": "edges", "value": 1})).uses(Capability::EdgeConstant));
        let refs = parse(json!({"lengthOf": "refs", "value": 1}));
        assert!(refs.uses(Capability::ParentValue));
        assert!(!refs.uses(Capability::EdgeConstant));
    }

    #[test]
    fn substitute_self_builds_a_new_tree() {
        let template = parse(json!({
            "operator": "*",
            "a": {"parent": "self"},
            "b": {"let": "k", "value": {"root": "self"}, "block": {"variable": "k"}}
        }));
        let rewritten = template.substitute_self("cost");

        assert_eq!(
            rewritten,
            parse(json!({
                "operator": "*",
                "a": {"parent": "cost"},
                "b": {"let": "k", "value": {"root": "cost"}, "block": {"variable": "k"}}
            }))
        );
        assert!(matches!(
            template,
            Expression::Binary { ref a, .. } if **a == Expression::Parent("self".into())
        ));
    }
}
