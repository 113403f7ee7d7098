//! Attribute value → raw value to be written.

use super::descriptor::{AttributeDescriptor, AttributeKind};
use super::{boolean, scalar, AttributeValue};
use crate::error::{AppResult, DaqError};

/// Candidate at `index`, passed through unchanged.
///
/// # Errors
///
/// [`DaqError::IndexOutOfRange`] if `index >= descriptor.len()`.
pub fn index_to_raw(descriptor: &AttributeDescriptor, index: usize) -> AppResult<f64> {
    descriptor
        .candidates
        .get(index)
        .copied()
        .ok_or_else(|| DaqError::IndexOutOfRange {
            attribute: descriptor.name.clone(),
            index,
            len: descriptor.candidates.len(),
        })
}

/// Check `value` against the bounds, then undo the read-side scaling.
///
/// Unbounded scalars accept any finite value.
///
/// # Errors
///
/// [`DaqError::OutOfBounds`] if `value` falls outside the inclusive range or
/// is not a number.
pub fn scalar_to_raw(descriptor: &AttributeDescriptor, value: f64) -> AppResult<f64> {
    let in_range = match descriptor.bounds {
        Some(bounds) => bounds.contains(value),
        None => value.is_finite(),
    };
    if !in_range {
        let (min, max) = descriptor
            .bounds
            .map_or((f64::MIN, f64::MAX), |b| (b.min, b.max));
        return Err(DaqError::OutOfBounds {
            attribute: descriptor.name.clone(),
            value,
            min,
            max,
        });
    }
    Ok(scalar::to_raw(descriptor, value))
}

/// Convert any attribute value into the raw value for its register.
///
/// # Errors
///
/// [`DaqError::TypeMismatch`] when the value variant does not fit the
/// descriptor kind, otherwise whatever the kind-specific conversion reports.
pub fn to_raw(descriptor: &AttributeDescriptor, value: AttributeValue) -> AppResult<f64> {
    match (descriptor.kind, value) {
        (AttributeKind::Enumerated, AttributeValue::Index(index)) => {
            index_to_raw(descriptor, index)
        }
        (AttributeKind::Scalar, AttributeValue::Scalar(v)) => scalar_to_raw(descriptor, v),
        (AttributeKind::Boolean, AttributeValue::Boolean(b)) => Ok(boolean::to_raw(b)),
        (kind, _) => Err(DaqError::TypeMismatch {
            attribute: descriptor.name.clone(),
            expected: kind.expected_value(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::DisplayFormat;

    fn frequency() -> AttributeDescriptor {
        AttributeDescriptor::scalar("frequency", "reference frequency", "frequency", 1.0, "Hz")
            .with_bounds(0.001, 250_000.0)
            .with_format(DisplayFormat::FREQUENCY)
    }

    fn slopes() -> AttributeDescriptor {
        AttributeDescriptor::enumerated(
            "slope",
            "filter slope",
            "slope",
            vec![6.0, 12.0, 18.0, 24.0],
            &["6 db/octave", "12 db/octave", "18 db/octave", "24 db/octave"],
            0.1,
        )
    }

    #[test]
    fn test_index_passthrough() {
        let d = slopes();
        assert_eq!(index_to_raw(&d, 0).unwrap(), 6.0);
        assert_eq!(index_to_raw(&d, 3).unwrap(), 24.0);
    }

    #[test]
    fn test_index_out_of_range() {
        let err = index_to_raw(&slopes(), 4).unwrap_err();
        assert!(matches!(
            err,
            DaqError::IndexOutOfRange { index: 4, len: 4, .. }
        ));
    }

    #[test]
    fn test_frequency_bounds() {
        let d = frequency();
        assert!(matches!(
            scalar_to_raw(&d, 300_000.0),
            Err(DaqError::OutOfBounds { .. })
        ));
        assert!(scalar_to_raw(&d, 0.0).is_err());
        assert!(scalar_to_raw(&d, f64::NAN).is_err());
        assert_eq!(scalar_to_raw(&d, 1000.0).unwrap(), 1000.0);
        assert_eq!(scalar_to_raw(&d, 0.001).unwrap(), 0.001);
        assert_eq!(scalar_to_raw(&d, 250_000.0).unwrap(), 250_000.0);
    }

    #[test]
    fn test_scaled_write_divides() {
        let d = AttributeDescriptor::scalar("x", "X", "x", 1e9, "nV");
        let raw = scalar_to_raw(&d, 5.0).unwrap();
        assert!((raw - 5e-9).abs() < 1e-20);
        assert!(scalar_to_raw(&d, f64::INFINITY).is_err());
    }

    #[test]
    fn test_type_mismatch() {
        let err = to_raw(&slopes(), AttributeValue::Boolean(true)).unwrap_err();
        assert!(matches!(
            err,
            DaqError::TypeMismatch { expected: "an index", .. }
        ));
        assert!(to_raw(&frequency(), AttributeValue::Index(1)).is_err());
    }

    #[test]
    fn test_dispatch_by_kind() {
        assert_eq!(to_raw(&slopes(), AttributeValue::Index(1)).unwrap(), 12.0);
        assert_eq!(
            to_raw(&frequency(), AttributeValue::Scalar(1000.0)).unwrap(),
            1000.0
        );
        let ground = AttributeDescriptor::boolean("ground", "Ground shielding", "ground");
        assert_eq!(to_raw(&ground, AttributeValue::Boolean(true)).unwrap(), 1.0);
        assert_eq!(to_raw(&ground, AttributeValue::Boolean(false)).unwrap(), 0.0);
    }
}
