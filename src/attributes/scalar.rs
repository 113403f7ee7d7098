//! Unit scaling and display formatting for continuous attributes.

use super::descriptor::AttributeDescriptor;

/// Raw device value to presented value.
pub fn from_raw(descriptor: &AttributeDescriptor, raw: f64) -> f64 {
    raw * descriptor.scale
}

/// Presented value back to the raw device value.
pub fn to_raw(descriptor: &AttributeDescriptor, value: f64) -> f64 {
    value / descriptor.scale
}

/// Render `value` with the descriptor's `%W.Pf` format and unit suffix.
pub fn format(descriptor: &AttributeDescriptor, value: f64) -> String {
    let number = match descriptor.format {
        Some(f) => format!("{:>width$.prec$}", value, width = f.width, prec = f.precision),
        None => value.to_string(),
    };
    match descriptor.unit.as_deref() {
        Some(unit) if !unit.is_empty() => format!("{number} {unit}"),
        _ => number,
    }
}
