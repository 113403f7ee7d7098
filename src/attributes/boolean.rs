//! The device's float encoding of flags.
//!
//! Only an exact 1.0 reads as `true`. Anything else, including values that are
//! merely close to 1.0, reads as `false`.

/// Raw register value to flag.
#[allow(clippy::float_cmp)]
pub fn from_raw(raw: f64) -> bool {
    raw == 1.0
}

/// Flag to raw register value.
pub fn to_raw(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        assert!(from_raw(to_raw(true)));
        assert!(!from_raw(to_raw(false)));
    }

    #[test]
    fn test_only_exact_one_is_true() {
        assert!(!from_raw(0.5));
        assert!(!from_raw(0.999_999_9));
        assert!(!from_raw(1.000_000_1));
        assert!(!from_raw(2.0));
        assert!(!from_raw(-1.0));
        assert!(!from_raw(f64::NAN));
    }
}
