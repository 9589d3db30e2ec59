//! Numeric conventions shared by every module.
//!
//! All values in a map are `f64`. Booleans and "no value" are encoded as
//! reserved numbers so that every expression result is a plain array of
//! numbers, one per edge (or per input slot) being processed.

use indexmap::IndexMap;
use smallvec::SmallVec;

/// The number `true` evaluates to.
pub const TRUE: f64 = 1.0;

/// The number `false` (and an omitted boolean) evaluates to.
pub const FALSE: f64 = 0.0;

/// Sentinel meaning "no value". Far below any value a map would hold.
pub const NULL: f64 = -1.0e300;

/// Result of evaluating an expression. Never empty once evaluation succeeds.
pub type Numbers = SmallVec<[f64; 4]>;

/// Property name to scalar value, in property evaluation order.
pub type Values = IndexMap<String, f64>;

/// Any non-zero number is true.
#[inline]
pub fn truthy(value: f64) -> bool {
    value != FALSE
}

/// Encode a boolean as `TRUE`/`FALSE`.
#[inline]
pub fn from_bool(value: bool) -> f64 {
    if value {
        TRUE
    } else {
        FALSE
    }
}

/// Whether a value is the null sentinel.
#[inline]
pub fn is_null(value: f64) -> bool {
    value == NULL
}

/// Format a value for text dumps: `null` for the sentinel, otherwise at most
/// four decimals with trailing zeros removed.
pub fn format_value(value: f64) -> String {
    if is_null(value) {
        return "null".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    let text = format!("{:.4}", value);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    if text == "-0" {
        "0".to_string()
    } else {
        text.to_string()
    }
}
