//! Attribute adapter core
//!
//! Pure, synchronous translation between raw register values and the typed
//! attribute values exposed to the remote control system:
//!
//! - [`registry`]: static descriptor table (`describe(name)`)
//! - [`resolver`]: raw value → enumerated index
//! - [`writer`]: index / bounded scalar / flag → raw value
//! - [`scalar`]: unit scaling and display formatting
//! - [`boolean`]: 1.0 / 0.0 flag coercion
//!
//! Nothing in here touches the link. The instrument layer acquires the link,
//! fetches or commits the raw value and calls into these functions.

pub mod boolean;
pub mod descriptor;
pub mod registry;
pub mod resolver;
pub mod scalar;
pub mod writer;

use serde::Serialize;
use std::fmt;

pub use descriptor::{AttributeAccess, AttributeDescriptor, AttributeKind, Bounds, DisplayFormat};
pub use registry::{names, AttributeRegistry};

use crate::error::{AppResult, DaqError};

/// Typed attribute value as seen by the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum AttributeValue {
    /// Position in the candidate table.
    Index(usize),
    /// Scaled continuous value.
    Scalar(f64),
    /// Flag.
    Boolean(bool),
}

impl AttributeValue {
    /// Index of an enumerated value.
    pub fn as_index(self) -> Option<usize> {
        match self {
            AttributeValue::Index(i) => Some(i),
            _ => None,
        }
    }

    /// Number of a scalar value.
    pub fn as_scalar(self) -> Option<f64> {
        match self {
            AttributeValue::Scalar(v) => Some(v),
            _ => None,
        }
    }

    /// State of a flag.
    pub fn as_bool(self) -> Option<bool> {
        match self {
            AttributeValue::Boolean(b) => Some(b),
            _ => None,
        }
    }
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Index(i) => write!(f, "{i}"),
            AttributeValue::Scalar(v) => write!(f, "{v}"),
            AttributeValue::Boolean(b) => write!(f, "{b}"),
        }
    }
}

/// Convert a raw register value read from the link into an attribute value.
///
/// # Errors
///
/// [`DaqError::NoMatchingValue`](crate::error::DaqError::NoMatchingValue) for
/// enumerated attributes whose raw value matches no candidate.
pub fn from_raw(descriptor: &AttributeDescriptor, raw: f64) -> AppResult<AttributeValue> {
    Ok(match descriptor.kind {
        AttributeKind::Enumerated => AttributeValue::Index(resolver::resolve(descriptor, raw)?),
        AttributeKind::Scalar => AttributeValue::Scalar(scalar::from_raw(descriptor, raw)),
        AttributeKind::Boolean => AttributeValue::Boolean(boolean::from_raw(raw)),
    })
}

/// Display string for `value`: label, formatted number with unit, or flag.
pub fn display(descriptor: &AttributeDescriptor, value: AttributeValue) -> String {
    match value {
        AttributeValue::Index(i) => descriptor
            .label_of(i)
            .map_or_else(|| i.to_string(), str::to_string),
        AttributeValue::Scalar(v) => scalar::format(descriptor, v),
        AttributeValue::Boolean(b) => b.to_string(),
    }
}

/// Parse user input for `descriptor`.
///
/// Enumerated attributes take an index or a label, flags take
/// `true`/`false`/`1`/`0`/`on`/`off`, scalars take a float.
///
/// # Errors
///
/// `UnknownLabel` for an unrecognised enumerated label, `TypeMismatch` for
/// anything else that does not parse.
pub fn parse_value(descriptor: &AttributeDescriptor, input: &str) -> AppResult<AttributeValue> {
    let input = input.trim();
    let mismatch = || DaqError::TypeMismatch {
        attribute: descriptor.name.clone(),
        expected: descriptor.kind.expected_value(),
    };
    match descriptor.kind {
        AttributeKind::Enumerated => match input.parse::<usize>() {
            Ok(index) => Ok(AttributeValue::Index(index)),
            Err(_) => descriptor
                .index_of_label(input)
                .map(AttributeValue::Index)
                .ok_or_else(|| DaqError::UnknownLabel {
                    attribute: descriptor.name.clone(),
                    label: input.to_string(),
                }),
        },
        AttributeKind::Scalar => input
            .parse::<f64>()
            .map(AttributeValue::Scalar)
            .map_err(|_| mismatch()),
        AttributeKind::Boolean => match input.to_ascii_lowercase().as_str() {
            "true" | "1" | "on" => Ok(AttributeValue::Boolean(true)),
            "false" | "0" | "off" => Ok(AttributeValue::Boolean(false)),
            _ => Err(mismatch()),
        },
    }
}
