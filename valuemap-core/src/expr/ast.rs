//! Expression syntax tree and its JSON form.
//!
//! Authors write expressions as JSON. Leaves are numbers, booleans, `null`,
//! arrays of those, or the string `"input"`. Every structured form is an
//! object carrying exactly one marker field (`edge`, `operator`, `clip`, ...)
//! plus that form's own fields. Parsing rejects objects with no marker, more
//! than one marker, or a field the form does not accept, so two forms can
//! never be confused.

use std::fmt;

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::color;
use crate::combine::Combiner;
use crate::error::{Error, Result};
use crate::value::{from_bool, FALSE, NULL, TRUE};

/// Reserved name that `parent`/`root` lookups may use for "the property that
/// owns this expression". Rewritten away during definition processing.
pub const SELF: &str = "self";

/// An expression in the value language.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// A single number (`true`, `false` and `null` fold into sentinels).
    Literal(f64),
    /// A fixed, non-empty array of numbers.
    Array(Vec<f64>),
    /// The caller-supplied input array.
    Input,
    /// A constant carried by each edge being evaluated.
    EdgeConstant(String),
    /// A property of each edge's parent node.
    Parent(String),
    /// A property of the root node.
    Root(String),
    /// A property already computed on the current node.
    Result(String),
    Reduce {
        value: Box<Expression>,
        combine: Combiner,
    },
    /// A packed literal color.
    Color(f64),
    Rgb {
        r: Box<Expression>,
        g: Box<Expression>,
        b: Box<Expression>,
    },
    Gradient {
        value: Box<Expression>,
        from: Box<Expression>,
        to: Box<Expression>,
    },
    Unary {
        op: UnaryOp,
        a: Box<Expression>,
    },
    Binary {
        op: BinaryOp,
        a: Box<Expression>,
        b: Box<Expression>,
    },
    Compare {
        op: Comparator,
        a: Box<Expression>,
        b: Box<Expression>,
    },
    If {
        condition: Box<Expression>,
        then: Box<Expression>,
        otherwise: Option<Box<Expression>>,
    },
    Filter {
        filter: Box<Expression>,
        value: Box<Expression>,
        default: Option<Box<Expression>>,
    },
    Clip {
        value: Box<Expression>,
        low: Option<Box<Expression>>,
        high: Option<Box<Expression>>,
    },
    Range {
        value: Box<Expression>,
        low: Option<Box<Expression>>,
        high: Option<Box<Expression>>,
    },
    Percent {
        value: Box<Expression>,
        low: Option<Box<Expression>>,
        high: Option<Box<Expression>>,
    },
    Collect(Vec<Expression>),
    LengthOf {
        mode: LengthMode,
        value: Box<Expression>,
    },
    HasTag {
        tag: String,
        scope: TagScope,
    },
    TagConstant {
        name: String,
        scope: TagScope,
        default: Option<Box<Expression>>,
    },
    Let {
        name: String,
        value: Box<Expression>,
        block: Box<Expression>,
    },
    Variable(String),
    Log {
        value: Box<Expression>,
        label: Option<String>,
    },
}

macro_rules! symbol_enum {
    ($(#[$meta:meta])* $name:ident, $what:literal { $($variant:ident => $symbol:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn symbol(self) -> &'static str {
                match self {
                    $($name::$variant => $symbol),+
                }
            }

            pub fn parse(symbol: &str) -> Result<Self> {
                match symbol {
                    $($symbol => Ok($name::$variant),)+
                    other => Err(Error::Parse(format!("unknown {} '{}'", $what, other))),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.symbol())
            }
        }
    };
}

symbol_enum!(UnaryOp, "unary operator" {
    Neg => "-",
    Not => "not",
    Abs => "abs",
    Sqrt => "sqrt",
    Log => "log",
    Exp => "exp",
    Floor => "floor",
    Ceil => "ceil",
    Round => "round",
});

symbol_enum!(BinaryOp, "operator" {
    Add => "+",
    Sub => "-",
    Mul => "*",
    Div => "/",
    Rem => "%",
    Pow => "^",
    Min => "min",
    Max => "max",
    And => "and",
    Or => "or",
});

symbol_enum!(Comparator, "comparator" {
    Lt => "<",
    Le => "<=",
    Gt => ">",
    Ge => ">=",
    Eq => "==",
    Ne => "!=",
});

symbol_enum!(
    /// What `lengthOf` stretches its value to match.
    LengthMode, "lengthOf mode" {
    Refs => "refs",
    Edges => "edges",
    Input => "input",
});

symbol_enum!(
    /// Which tags a tag lookup sees: the node's own, every tag reachable
    /// through its parents, or the reachable ones minus its own.
    TagScope, "tag scope" {
    All => "all",
    SelfOnly => "self",
    Extended => "extended",
});

impl UnaryOp {
    pub fn apply(self, a: f64) -> f64 {
        match self {
            UnaryOp::Neg => -a,
            UnaryOp::Not => from_bool(a == FALSE),
            UnaryOp::Abs => a.abs(),
            UnaryOp::Sqrt => a.sqrt(),
            UnaryOp::Log => a.ln(),
            UnaryOp::Exp => a.exp(),
            UnaryOp::Floor => a.floor(),
            UnaryOp::Ceil => a.ceil(),
            UnaryOp::Round => a.round(),
        }
    }
}

impl BinaryOp {
    pub fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Rem => a % b,
            BinaryOp::Pow => a.powf(b),
            BinaryOp::Min => a.min(b),
            BinaryOp::Max => a.max(b),
            BinaryOp::And => from_bool(a != FALSE && b != FALSE),
            BinaryOp::Or => from_bool(a != FALSE || b != FALSE),
        }
    }
}

impl Comparator {
    pub fn apply(self, a: f64, b: f64) -> f64 {
        let holds = match self {
            Comparator::Lt => a < b,
            Comparator::Le => a <= b,
            Comparator::Gt => a > b,
            Comparator::Ge => a >= b,
            Comparator::Eq => a == b,
            Comparator::Ne => a != b,
        };
        if holds {
            TRUE
        } else {
            FALSE
        }
    }
}

/// Marker fields, each paired with the other fields its form accepts.
const FORMS: &[(&str, &[&str])] = &[
    ("edge", &[]),
    ("parent", &[]),
    ("root", &[]),
    ("result", &[]),
    ("reduce", &["combine"]),
    ("color", &[]),
    ("rgb", &[]),
    ("gradient", &["from", "to"]),
    ("unary", &["a"]),
    ("operator", &["a", "b"]),
    ("compare", &["a", "b"]),
    ("if", &["then", "else"]),
    ("filter", &["value", "default"]),
    ("clip", &["low", "high"]),
    ("range", &["low", "high"]),
    ("percent", &["low", "high"]),
    ("collect", &[]),
    ("lengthOf", &["value"]),
    ("hasTag", &["scope"]),
    ("tagConstant", &["scope", "default"]),
    ("let", &["value", "block"]),
    ("variable", &[]),
    ("log", &["label"]),
];

impl Expression {
    /// Parse an expression from its JSON form.
    pub fn from_json(json: &Value) -> Result<Self> {
        match json {
            Value::Null => Ok(Expression::Literal(NULL)),
            Value::Bool(b) => Ok(Expression::Literal(from_bool(*b))),
            Value::Number(_) => Ok(Expression::Literal(leaf(json)?)),
            Value::String(s) if s == "input" => Ok(Expression::Input),
            Value::String(s) => Err(Error::Parse(format!(
                "unexpected string '{}' (only \"input\" is a string expression)",
                s
            ))),
            Value::Array(items) => {
                if items.is_empty() {
                    return Err(Error::Parse("array expression is empty".to_string()));
                }
                let values = items.iter().map(leaf).collect::<Result<Vec<_>>>()?;
                Ok(Expression::Array(values))
            }
            Value::Object(object) => parse_object(object),
        }
    }

    /// The marker this expression is written with, or a description of the
    /// leaf kind.
    pub fn marker(&self) -> &'static str {
        match self {
            Expression::Literal(_) => "literal",
            Expression::Array(_) => "array",
            Expression::Input => "input",
            Expression::EdgeConstant(_) => "edge",
            Expression::Parent(_) => "parent",
            Expression::Root(_) => "root",
            Expression::Result(_) => "result",
            Expression::Reduce { .. } => "reduce",
            Expression::Color(_) => "color",
            Expression::Rgb { .. } => "rgb",
            Expression::Gradient { .. } => "gradient",
            Expression::Unary { .. } => "unary",
            Expression::Binary { .. } => "operator",
            Expression::Compare { .. } => "compare",
            Expression::If { .. } => "if",
            Expression::Filter { .. } => "filter",
            Expression::Clip { .. } => "clip",
            Expression::Range { .. } => "range",
            Expression::Percent { .. } => "percent",
            Expression::Collect(_) => "collect",
            Expression::LengthOf { .. } => "lengthOf",
            Expression::HasTag { .. } => "hasTag",
            Expression::TagConstant { .. } => "tagConstant",
            Expression::Let { .. } => "let",
            Expression::Variable(_) => "variable",
            Expression::Log { .. } => "log",
        }
    }
}

impl From<f64> for Expression {
    fn from(value: f64) -> Self {
        Expression::Literal(value)
    }
}

impl<'de> Deserialize<'de> for Expression {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let json = Value::deserialize(deserializer)?;
        Expression::from_json(&json).map_err(serde::de::Error::custom)
    }
}

/// A number, boolean or null folded into a number.
pub(crate) fn leaf(json: &Value) -> Result<f64> {
    match json {
        Value::Null => Ok(NULL),
        Value::Bool(b) => Ok(from_bool(*b)),
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| Error::Parse(format!("number {} is out of range", n))),
        other => Err(Error::Parse(format!(
            "expected a number, boolean or null, got {}",
            other
        ))),
    }
}

fn parse_object(object: &Map<String, Value>) -> Result<Expression> {
    let markers: Vec<&(&str, &[&str])> = FORMS
        .iter()
        .filter(|(marker, _)| object.contains_key(*marker))
        .collect();

    let (marker, accepted) = match markers.as_slice() {
        [] => {
            let keys: Vec<&str> = object.keys().map(String::as_str).collect();
            return Err(Error::Parse(format!(
                "object has no expression marker (fields: {:?})",
                keys
            )));
        }
        [single] => **single,
        [first, second, ..] => {
            return Err(Error::Parse(format!(
                "fields '{}' and '{}' cannot appear in the same expression",
                first.0, second.0
            )));
        }
    };

    if let Some(unexpected) = object
        .keys()
        .find(|key| key.as_str() != marker && !accepted.contains(&key.as_str()))
    {
        return Err(Error::Parse(format!(
            "unexpected field '{}' in '{}' expression",
            unexpected, marker
        )));
    }

    let fields = Fields { object, marker };
    let expression = match marker {
        "edge" => Expression::EdgeConstant(fields.string(marker)?),
        "parent" => Expression::Parent(fields.string(marker)?),
        "root" => Expression::Root(fields.string(marker)?),
        "result" => Expression::Result(fields.string(marker)?),
        "reduce" => Expression::Reduce {
            value: fields.expr(marker)?,
            combine: match fields.optional_string("combine")? {
                Some(name) => name.parse()?,
                None => Combiner::default(),
            },
        },
        "color" => {
            let text = fields.string(marker)?;
            let packed = color::parse_hex(&text)
                .ok_or_else(|| Error::Parse(format!("invalid color '{}'", text)))?;
            Expression::Color(packed)
        }
        "rgb" => {
            let channels = fields.expr_list(marker)?;
            match <[Expression; 3]>::try_from(channels) {
                Ok([r, g, b]) => Expression::Rgb {
                    r: Box::new(r),
                    g: Box::new(g),
                    b: Box::new(b),
                },
                Err(channels) => {
                    return Err(Error::Parse(format!(
                        "rgb needs exactly 3 channels, got {}",
                        channels.len()
                    )))
                }
            }
        }
        "gradient" => Expression::Gradient {
            value: fields.expr(marker)?,
            from: fields.expr("from")?,
            to: fields.expr("to")?,
        },
        "unary" => Expression::Unary {
            op: UnaryOp::parse(&fields.string(marker)?)?,
            a: fields.expr("a")?,
        },
        "operator" => Expression::Binary {
            op: BinaryOp::parse(&fields.string(marker)?)?,
            a: fields.expr("a")?,
            b: fields.expr("b")?,
        },
        "compare" => Expression::Compare {
            op: Comparator::parse(&fields.string(marker)?)?,
            a: fields.expr("a")?,
            b: fields.expr("b")?,
        },
        "if" => Expression::If {
            condition: fields.expr(marker)?,
            then: fields.expr("then")?,
            otherwise: fields.optional_expr("else")?,
        },
        "filter" => Expression::Filter {
            filter: fields.expr(marker)?,
            value: fields.expr("value")?,
            default: fields.optional_expr("default")?,
        },
        "clip" => Expression::Clip {
            value: fields.expr(marker)?,
            low: fields.optional_expr("low")?,
            high: fields.optional_expr("high")?,
        },
        "range" => Expression::Range {
            value: fields.expr(marker)?,
            low: fields.optional_expr("low")?,
            high: fields.optional_expr("high")?,
        },
        "percent" => Expression::Percent {
            value: fields.expr(marker)?,
            low: fields.optional_expr("low")?,
            high: fields.optional_expr("high")?,
        },
        "collect" => Expression::Collect(fields.expr_list(marker)?),
        "lengthOf" => Expression::LengthOf {
            mode: LengthMode::parse(&fields.string(marker)?)?,
            value: fields.expr("value")?,
        },
        "hasTag" => Expression::HasTag {
            tag: fields.string(marker)?,
            scope: fields.scope()?,
        },
        "tagConstant" => Expression::TagConstant {
            name: fields.string(marker)?,
            scope: fields.scope()?,
            default: fields.optional_expr("default")?,
        },
        "let" => Expression::Let {
            name: fields.string(marker)?,
            value: fields.expr("value")?,
            block: fields.expr("block")?,
        },
        "variable" => Expression::Variable(fields.string(marker)?),
        "log" => Expression::Log {
            value: fields.expr(marker)?,
            label: fields.optional_string("label")?,
        },
        other => return Err(Error::Parse(format!("unhandled marker '{}'", other))),
    };
    Ok(expression)
}

/// Typed field access on one expression object.
struct Fields<'a> {
    object: &'a Map<String, Value>,
    marker: &'a str,
}

impl Fields<'_> {
    fn missing(&self, key: &str) -> Error {
        Error::Parse(format!(
            "'{}' expression is missing field '{}'",
            self.marker, key
        ))
    }

    fn string(&self, key: &str) -> Result<String> {
        self.optional_string(key)?.ok_or_else(|| self.missing(key))
    }

    fn optional_string(&self, key: &str) -> Result<Option<String>> {
        match self.object.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(other) => Err(Error::Parse(format!(
                "field '{}' of '{}' must be a string, got {}",
                key, self.marker, other
            ))),
        }
    }

    fn expr(&self, key: &str) -> Result<Box<Expression>> {
        self.optional_expr(key)?.ok_or_else(|| self.missing(key))
    }

    fn optional_expr(&self, key: &str) -> Result<Option<Box<Expression>>> {
        self.object
            .get(key)
            .map(|json| Expression::from_json(json).map(Box::new))
            .transpose()
    }

    fn expr_list(&self, key: &str) -> Result<Vec<Expression>> {
        match self.object.get(key) {
            Some(Value::Array(items)) => items.iter().map(Expression::from_json).collect(),
            Some(other) => Err(Error::Parse(format!(
                "field '{}' of '{}' must be an array, got {}",
                key, self.marker, other
            ))),
            None => Err(self.missing(key)),
        }
    }

    fn scope(&self) -> Result<TagScope> {
        match self.optional_string("scope")? {
            Some(scope) => TagScope::parse(&scope),
            None => Ok(TagScope::All),
        }
    }
}
