//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Tunables for render-edge layout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Offset between neighbouring edges that share a target.
    pub bump_spacing: f64,
    /// Widest total spread edges sharing a target may occupy. When the fixed
    /// spacing would overflow it, edges are spaced evenly across it instead.
    pub bump_spread: f64,
    /// Drop render edges whose width evaluates to zero or less.
    pub drop_zero_width: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bump_spacing: 0.25,
            bump_spread: 1.0,
            drop_zero_width: true,
        }
    }
}

impl EngineConfig {
    /// Parse from JSON; missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
