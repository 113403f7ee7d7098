//! Static per-attribute metadata.
//!
//! An [`AttributeDescriptor`] is built once when the registry is constructed and
//! never mutated afterwards. Construction goes through [`AttributeDescriptor::validate`],
//! so every descriptor reachable from a registry upholds its invariants:
//!
//! - enumerated candidates are pairwise more than `tolerance` apart
//! - one label per candidate
//! - scalar `scale` is finite and non-zero
//! - bounds are finite with `min <= max`

use serde::Serialize;

use crate::error::{AppResult, DaqError};

/// How the raw register value is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AttributeKind {
    /// Position in an ordered candidate table.
    Enumerated,
    /// Continuous value, optionally bounded.
    Scalar,
    /// Exact 1.0 / 0.0 flag.
    Boolean,
}

impl AttributeKind {
    /// Short noun used in type mismatch errors.
    pub fn expected_value(self) -> &'static str {
        match self {
            AttributeKind::Enumerated => "an index",
            AttributeKind::Scalar => "a scalar",
            AttributeKind::Boolean => "a boolean",
        }
    }
}

/// Whether the remote side may write the attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AttributeAccess {
    /// Signal channels; writes fail with `ReadOnly`.
    ReadOnly,
    /// Settings.
    ReadWrite,
}

/// printf-style `%W.Pf` display format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DisplayFormat {
    /// Minimum field width.
    pub width: usize,
    /// Digits after the decimal point.
    pub precision: usize,
}

impl DisplayFormat {
    /// `%6.2f`
    pub const SIGNAL: DisplayFormat = DisplayFormat {
        width: 6,
        precision: 2,
    };

    /// `%8.3f`
    pub const FREQUENCY: DisplayFormat = DisplayFormat {
        width: 8,
        precision: 3,
    };
}

/// Inclusive `[min, max]` range of a bounded scalar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    /// Lower bound.
    pub min: f64,
    /// Upper bound.
    pub max: f64,
}

impl Bounds {
    /// `true` if `value` lies inside the range, ends included.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Metadata for one exposed attribute.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeDescriptor {
    /// Attribute name used by the remote side (`"timeconstant"`).
    pub name: String,
    /// Human label (`"time constant"`).
    pub label: String,
    /// Value kind.
    pub kind: AttributeKind,
    /// Whether writes are accepted.
    pub access: AttributeAccess,
    /// InstrumentLink register backing this attribute.
    pub register: String,
    /// Raw candidate values; the position is the attribute index.
    pub candidates: Vec<f64>,
    /// Human labels, one per candidate.
    pub labels: Vec<String>,
    /// Presented value is `raw * scale`. Scalars only.
    pub scale: f64,
    /// Accepted write range. Scalars only.
    pub bounds: Option<Bounds>,
    /// Absolute match window used when resolving raw values.
    pub tolerance: f64,
    /// Display unit. Scalars only.
    pub unit: Option<String>,
    /// Display format. Scalars only.
    pub format: Option<DisplayFormat>,
}

impl AttributeDescriptor {
    fn base(name: &str, label: &str, kind: AttributeKind, register: &str) -> Self {
        Self {
            name: name.to_string(),
            label: label.to_string(),
            kind,
            access: AttributeAccess::ReadWrite,
            register: register.to_string(),
            candidates: Vec::new(),
            labels: Vec::new(),
            scale: 1.0,
            bounds: None,
            tolerance: 0.0,
            unit: None,
            format: None,
        }
    }

    /// Enumerated attribute over `candidates`, labelled by `labels`.
    pub fn enumerated<S: AsRef<str>>(
        name: &str,
        label: &str,
        register: &str,
        candidates: Vec<f64>,
        labels: &[S],
        tolerance: f64,
    ) -> Self {
        Self {
            candidates,
            labels: labels.iter().map(|l| l.as_ref().to_string()).collect(),
            tolerance,
            ..Self::base(name, label, AttributeKind::Enumerated, register)
        }
    }

    /// Scalar attribute presented as `raw * scale` in `unit`.
    pub fn scalar(name: &str, label: &str, register: &str, scale: f64, unit: &str) -> Self {
        Self {
            scale,
            unit: Some(unit.to_string()),
            ..Self::base(name, label, AttributeKind::Scalar, register)
        }
    }

    /// Boolean attribute encoded by the device as 1.0 / 0.0.
    pub fn boolean(name: &str, label: &str, register: &str) -> Self {
        Self::base(name, label, AttributeKind::Boolean, register)
    }

    /// Restrict writes to `[min, max]`.
    pub fn with_bounds(mut self, min: f64, max: f64) -> Self {
        self.bounds = Some(Bounds { min, max });
        self
    }

    /// Format used by `display`.
    pub fn with_format(mut self, format: DisplayFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Reject writes.
    pub fn read_only(mut self) -> Self {
        self.access = AttributeAccess::ReadOnly;
        self
    }

    /// `true` unless the attribute is read-only.
    pub fn is_writable(&self) -> bool {
        self.access == AttributeAccess::ReadWrite
    }

    /// Number of candidates; zero for non-enumerated attributes.
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// `true` for attributes without candidates.
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// Label shown for `index`, if any.
    pub fn label_of(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    /// Position of `label` in the label table.
    pub fn index_of_label(&self, label: &str) -> Option<usize> {
        self.labels.iter().position(|l| l == label)
    }

    /// Check the construction invariants.
    ///
    /// # Errors
    ///
    /// [`DaqError::InvalidDescriptor`] naming the first violated invariant.
    pub fn validate(&self) -> AppResult<()> {
        let name = self.name.as_str();
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(DaqError::invalid(
                name,
                format!("tolerance {} must be finite and non-negative", self.tolerance),
            ));
        }

        match self.kind {
            AttributeKind::Enumerated => {
                if self.candidates.is_empty() {
                    return Err(DaqError::invalid(name, "empty candidate table"));
                }
                if self.labels.len() != self.candidates.len() {
                    return Err(DaqError::invalid(
                        name,
                        format!(
                            "{} labels for {} candidates",
                            self.labels.len(),
                            self.candidates.len()
                        ),
                    ));
                }
                if let Some(bad) = self.candidates.iter().find(|c| !c.is_finite()) {
                    return Err(DaqError::invalid(name, format!("candidate {bad} is not finite")));
                }
                for (i, a) in self.candidates.iter().enumerate() {
                    for (j, b) in self.candidates.iter().enumerate().skip(i + 1) {
                        if (a - b).abs() <= self.tolerance {
                            return Err(DaqError::invalid(
                                name,
                                format!(
                                    "candidates {i} ({a}) and {j} ({b}) are within tolerance {}",
                                    self.tolerance
                                ),
                            ));
                        }
                    }
                }
            }
            AttributeKind::Scalar => {
                if self.scale == 0.0 || !self.scale.is_finite() {
                    return Err(DaqError::invalid(
                        name,
                        format!("scale {} must be finite and non-zero", self.scale),
                    ));
                }
                if let Some(Bounds { min, max }) = self.bounds {
                    if !min.is_finite() || !max.is_finite() || min > max {
                        return Err(DaqError::invalid(
                            name,
                            format!("bounds [{min}, {max}] are not an ordered finite range"),
                        ));
                    }
                }
            }
            AttributeKind::Boolean => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_invalid(descriptor: AttributeDescriptor) {
        match descriptor.validate() {
            Err(DaqError::InvalidDescriptor { attribute, .. }) => {
                assert_eq!(attribute, descriptor.name)
            }
            other => panic!("expected InvalidDescriptor, got {other:?}"),
        }
    }

    #[test]
    fn test_valid_enumerated() {
        let d = AttributeDescriptor::enumerated(
            "slope",
            "filter slope",
            "slope",
            vec![6.0, 12.0, 18.0, 24.0],
            &["6", "12", "18", "24"],
            0.1,
        );
        assert!(d.validate().is_ok());
        assert_eq!(d.len(), 4);
        assert_eq!(d.index_of_label("18"), Some(2));
        assert_eq!(d.label_of(3), Some("24"));
        assert_eq!(d.label_of(4), None);
    }

    #[test]
    fn test_candidates_within_tolerance_rejected() {
        assert_invalid(AttributeDescriptor::enumerated(
            "t",
            "t",
            "t",
            vec![1.0, 1.05],
            &["a", "b"],
            0.1,
        ));
    }

    #[test]
    fn test_label_count_mismatch_rejected() {
        assert_invalid(AttributeDescriptor::enumerated(
            "t",
            "t",
            "t",
            vec![1.0, 2.0],
            &["a"],
            0.1,
        ));
    }

    #[test]
    fn test_empty_candidates_rejected() {
        let labels: [&str; 0] = [];
        assert_invalid(AttributeDescriptor::enumerated("t", "t", "t", vec![], &labels, 0.1));
    }

    #[test]
    fn test_zero_scale_rejected() {
        assert_invalid(AttributeDescriptor::scalar("x", "x", "x", 0.0, "nV"));
        assert_invalid(AttributeDescriptor::scalar("x", "x", "x", f64::NAN, "nV"));
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        assert_invalid(AttributeDescriptor::scalar("f", "f", "f", 1.0, "Hz").with_bounds(10.0, 1.0));
    }

    #[test]
    fn test_negative_tolerance_rejected() {
        assert_invalid(AttributeDescriptor::enumerated(
            "t",
            "t",
            "t",
            vec![1.0],
            &["a"],
            -1.0,
        ));
    }

    #[test]
    fn test_bounds_inclusive() {
        let b = Bounds {
            min: 0.001,
            max: 250_000.0,
        };
        assert!(b.contains(0.001));
        assert!(b.contains(250_000.0));
        assert!(!b.contains(250_000.1));
        assert!(!b.contains(0.0));
        assert!(!b.contains(f64::NAN));
    }
}
