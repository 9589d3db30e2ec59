//! Plain-text dumps of computed values.

use crate::definition::MapDefinition;
use crate::value::{format_value, Values};

/// One header line, then `  name = value` per property in `order`.
/// Hidden properties are skipped unless `include_hidden` is set, in which
/// case they are marked.
pub(crate) fn dump_values(
    header: &str,
    definition: &MapDefinition,
    order: &[String],
    values: &Values,
    include_hidden: bool,
) -> String {
    let mut lines = vec![header.to_string()];
    for name in order {
        let hidden = definition
            .property(name)
            .map(|property| property.hide)
            .unwrap_or(false);
        if hidden && !include_hidden {
            continue;
        }
        let Some(value) = values.get(name) else {
            continue;
        };
        let mut line = format!("  {} = {}", name, format_value(*value));
        if hidden {
            line.push_str(" (hidden)");
        }
        lines.push(line);
    }
    lines.join("\n")
}
