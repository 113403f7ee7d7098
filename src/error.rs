//! Custom error types for the attribute adapter.
//!
//! This module defines the primary error type, `DaqError`, used by every layer of
//! the crate. Using the `thiserror` crate, it provides a centralized and consistent
//! way to report the ways an attribute access can fail.
//!
//! ## Error Hierarchy
//!
//! - **Lookup**: `UnknownAttribute`, `UnknownLabel`.
//! - **Construction**: `InvalidDescriptor` is only produced while the attribute
//!   registry is built. A registry that exists is valid.
//! - **Conversion**: `NoMatchingValue`, `IndexOutOfRange`, `OutOfBounds`,
//!   `ReadOnly` and `TypeMismatch` come from the pure adapter functions and are
//!   raised before any traffic reaches the instrument.
//! - **Link**: `LinkUnavailable` and `LinkTimeout` are transient from the
//!   caller's point of view. The adapter never retries them.
//! - **Configuration**: `Config` wraps figment errors, `ConfigValidation` covers
//!   values that parse but make no sense.
//!
//! None of these are swallowed. In particular an unmatched raw value is never
//! reported as the first enumerated option.

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

/// Every way an attribute access, link call or configuration load can fail.
#[derive(Error, Debug)]
pub enum DaqError {
    /// No descriptor registered under this name.
    #[error("Unknown attribute '{0}'")]
    UnknownAttribute(String),

    /// Enumerated attribute has no such label.
    #[error("Attribute '{attribute}' has no label '{label}'")]
    UnknownLabel {
        /// Attribute name.
        attribute: String,
        /// Label that was asked for.
        label: String,
    },

    /// Descriptor breaks an invariant; registry construction only.
    #[error("Invalid descriptor for '{attribute}': {reason}")]
    InvalidDescriptor {
        /// Attribute name.
        attribute: String,
        /// Violated invariant.
        reason: String,
    },

    /// Raw value outside the tolerance of every candidate.
    #[error("Raw value {raw} of '{attribute}' matches no candidate")]
    NoMatchingValue {
        /// Attribute name.
        attribute: String,
        /// Value read from the link.
        raw: f64,
    },

    /// Enumerated write past the end of the candidate table.
    #[error("Index {index} out of range for '{attribute}' ({len} candidates)")]
    IndexOutOfRange {
        /// Attribute name.
        attribute: String,
        /// Requested index.
        index: usize,
        /// Number of candidates.
        len: usize,
    },

    /// Scalar write outside the attribute bounds, or not finite.
    #[error("Value {value} out of bounds for '{attribute}' [{min}, {max}]")]
    OutOfBounds {
        /// Attribute name.
        attribute: String,
        /// Requested value.
        value: f64,
        /// Lower bound.
        min: f64,
        /// Upper bound.
        max: f64,
    },

    /// Write to a signal channel.
    #[error("Attribute '{0}' is read-only")]
    ReadOnly(String),

    /// Write value of the wrong kind.
    #[error("Attribute '{attribute}' expects {expected} value")]
    TypeMismatch {
        /// Attribute name.
        attribute: String,
        /// Expected kind, e.g. "an index".
        expected: &'static str,
    },

    /// Link closed, lost, or reconnected during the request.
    #[error("Instrument link unavailable ({register}): {reason}")]
    LinkUnavailable {
        /// Register being accessed.
        register: String,
        /// Cause reported by the link.
        reason: String,
    },

    /// Link call exceeded the configured timeout.
    #[error("Instrument link timed out after {timeout_ms}ms ({register})")]
    LinkTimeout {
        /// Register being accessed.
        register: String,
        /// Timeout that expired.
        timeout_ms: u64,
    },

    /// Protocol-level failure such as an unparseable reply.
    #[error("Instrument error: {0}")]
    Instrument(String),

    /// Configuration source could not be read or parsed.
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Configuration parsed but holds unusable values.
    #[error("Configuration validation error: {0}")]
    ConfigValidation(String),
}

impl DaqError {
    /// `true` for failures of the link itself rather than of the request.
    ///
    /// These are the errors a caller may retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DaqError::LinkUnavailable { .. } | DaqError::LinkTimeout { .. }
        )
    }

    pub(crate) fn unavailable(register: &str, reason: impl Into<String>) -> Self {
        DaqError::LinkUnavailable {
            register: register.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid(attribute: &str, reason: impl Into<String>) -> Self {
        DaqError::InvalidDescriptor {
            attribute: attribute.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<figment::Error> for DaqError {
    fn from(err: figment::Error) -> Self {
        DaqError::Config(Box::new(err))
    }
}
