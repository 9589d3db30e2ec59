//! Combiners: reductions from an array of per-edge numbers to one scalar.
//!
//! Every combiner is total. On an empty input each one returns `0`
//! (`FALSE` for the logical pair), so a property never needs a special case
//! for "no values".

use std::fmt;
use std::str::FromStr;

use crate::color;
use crate::error::Error;
use crate::value::{from_bool, truthy};

/// A named reduction strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Combiner {
    #[default]
    Mean,
    First,
    Last,
    Min,
    Max,
    Sum,
    Product,
    And,
    Or,
    /// Channel-wise mean of packed colors.
    ColorMean,
}

impl Combiner {
    pub const ALL: [Combiner; 10] = [
        Combiner::Mean,
        Combiner::First,
        Combiner::Last,
        Combiner::Min,
        Combiner::Max,
        Combiner::Sum,
        Combiner::Product,
        Combiner::And,
        Combiner::Or,
        Combiner::ColorMean,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Combiner::Mean => "mean",
            Combiner::First => "first",
            Combiner::Last => "last",
            Combiner::Min => "min",
            Combiner::Max => "max",
            Combiner::Sum => "sum",
            Combiner::Product => "product",
            Combiner::And => "and",
            Combiner::Or => "or",
            Combiner::ColorMean => "colorMean",
        }
    }

    /// Reduce `values` to a scalar.
    pub fn apply(self, values: &[f64]) -> f64 {
        if values.is_empty() {
            return 0.0;
        }
        match self {
            Combiner::Mean => values.iter().sum::<f64>() / values.len() as f64,
            Combiner::First => values[0],
            Combiner::Last => values[values.len() - 1],
            Combiner::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Combiner::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Combiner::Sum => values.iter().sum(),
            Combiner::Product => values.iter().product(),
            Combiner::And => from_bool(values.iter().all(|v| truthy(*v))),
            Combiner::Or => from_bool(values.iter().any(|v| truthy(*v))),
            Combiner::ColorMean => color_mean(values),
        }
    }
}

fn color_mean(values: &[f64]) -> f64 {
    let mut totals = [0.0f64; 3];
    for value in values {
        let (r, g, b) = color::unpack(*value);
        totals[0] += f64::from(r);
        totals[1] += f64::from(g);
        totals[2] += f64::from(b);
    }
    let n = values.len() as f64;
    color::pack(
        color::channel(totals[0] / n),
        color::channel(totals[1] / n),
        color::channel(totals[2] / n),
    )
}

impl FromStr for Combiner {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Combiner::ALL
            .iter()
            .copied()
            .find(|c| c.name() == s)
            .ok_or_else(|| Error::Parse(format!("unknown combiner '{}'", s)))
    }
}

impl fmt::Display for Combiner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
