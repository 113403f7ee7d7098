//! AttributeRegistry - the fixed table of exposed attributes
//!
//! Built once when the adapter is initialised and read-only afterwards. The
//! time constant, sensitivity and reference tables come from the link so that
//! attribute indices follow the instrument's own ordering; gain and slope codes
//! are owned here.

use std::collections::BTreeMap;

use super::descriptor::{AttributeDescriptor, DisplayFormat};
use crate::error::{AppResult, DaqError};
use crate::link::{registers, InstrumentLink};

/// Attribute names as seen by the remote control system.
pub mod names {
    /// In-phase signal, nV.
    pub const X: &str = "X";
    /// Quadrature signal, nV.
    pub const Y: &str = "Y";
    /// Signal magnitude, nV.
    pub const R: &str = "R";
    /// Signal phase, deg.
    pub const THETA: &str = "Theta";
    /// Output filter time constant.
    pub const TIME_CONSTANT: &str = "timeconstant";
    /// Full-scale sensitivity.
    pub const SENSITIVITY: &str = "sensitivity";
    /// AC gain.
    pub const GAIN: &str = "gain";
    /// Output filter slope.
    pub const SLOPE: &str = "slope";
    /// Reference frequency, Hz.
    pub const FREQUENCY: &str = "frequency";
    /// Reference source.
    pub const REFERENCE: &str = "reference";
    /// AC input coupling flag.
    pub const AC_COUPLING: &str = "ACcoupling";
    /// Input shield grounding flag.
    pub const GROUND: &str = "ground";
}

const TIME_CONSTANT_LABELS: [&str; 29] = [
    "10 us", "20 us", "40 us", "80 us", "160 us", "320 us", "640 us", "5 ms", "10 ms", "20 ms",
    "50 ms", "100 ms", "200 ms", "500 ms", "1 s", "2 s", "5 s", "10 s", "20 s", "50 s", "100 s",
    "200 s", "500 s", "1 ks", "2 ks", "5 ks", "10 ks", "20 ks", "50 ks",
];

const SENSITIVITY_LABELS: [&str; 28] = [
    "nan", "2 nV", "5 nV", "10 nV", "20 nV", "50 nV", "100 nV", "200 nV", "500 nV", "1 uV",
    "2 uV", "5 uV", "10 uV", "20 uV", "50 uV", "100 uV", "200 uV", "500 uV", "1 mV", "2 mV",
    "5 mV", "10 mV", "20 mV", "50 mV", "100 mV", "200 mV", "500 mV", "1 V",
];

const GAIN_LABELS: [&str; 10] = [
    "0 db", "10 db", "20 db", "30 db", "40 db", "50 db", "60 db", "70 db", "80 db", "90 db",
];

const SLOPE_LABELS: [&str; 4] = ["6 db/octave", "12 db/octave", "18 db/octave", "24 db/octave"];

const REFERENCE_LABELS: [&str; 3] = ["internal", "external rear", "external front"];

/// AC gain codes in dB.
pub const GAINS: [f64; 10] = [0.0, 10.0, 20.0, 30.0, 40.0, 50.0, 60.0, 70.0, 80.0, 90.0];

/// Filter slopes in dB/octave.
pub const SLOPES: [f64; 4] = [6.0, 12.0, 18.0, 24.0];

/// Lowest reference frequency in Hz.
pub const FREQUENCY_MIN: f64 = 0.001;
/// Highest reference frequency in Hz.
pub const FREQUENCY_MAX: f64 = 250_000.0;

/// Immutable set of validated descriptors, keyed by attribute name.
#[derive(Debug, Clone)]
pub struct AttributeRegistry {
    descriptors: BTreeMap<String, AttributeDescriptor>,
}

impl AttributeRegistry {
    /// Validate and register `descriptors`.
    ///
    /// # Errors
    ///
    /// [`DaqError::InvalidDescriptor`] for the first descriptor that breaks an
    /// invariant, or when two descriptors share a name.
    pub fn new(descriptors: Vec<AttributeDescriptor>) -> AppResult<Self> {
        let mut map = BTreeMap::new();
        for descriptor in descriptors {
            descriptor.validate()?;
            let name = descriptor.name.clone();
            if map.insert(name.clone(), descriptor).is_some() {
                return Err(DaqError::invalid(&name, "registered twice"));
            }
        }
        Ok(Self { descriptors: map })
    }

    /// The DSP 7265 attribute set, using the link's native candidate tables.
    pub fn dsp7265(link: &dyn InstrumentLink) -> AppResult<Self> {
        Self::dsp7265_from_tables(link.time_constants(), link.sensitivities(), link.references())
    }

    /// Same as [`AttributeRegistry::dsp7265`] with explicit tables.
    pub fn dsp7265_from_tables(
        time_constants: Vec<f64>,
        sensitivities: Vec<f64>,
        references: Vec<f64>,
    ) -> AppResult<Self> {
        use names::*;

        Self::new(vec![
            AttributeDescriptor::scalar(X, "X", registers::X, 1e9, "nV")
                .with_format(DisplayFormat::SIGNAL)
                .read_only(),
            AttributeDescriptor::scalar(Y, "Y", registers::Y, 1e9, "nV")
                .with_format(DisplayFormat::SIGNAL)
                .read_only(),
            AttributeDescriptor::scalar(R, "R", registers::MAGNITUDE, 1e9, "nV")
                .with_format(DisplayFormat::SIGNAL)
                .read_only(),
            AttributeDescriptor::scalar(THETA, "Theta", registers::PHASE, 1.0, "deg")
                .with_format(DisplayFormat::SIGNAL)
                .read_only(),
            AttributeDescriptor::enumerated(
                TIME_CONSTANT,
                "time constant",
                registers::TIME_CONSTANT,
                time_constants,
                &TIME_CONSTANT_LABELS,
                1e-7,
            ),
            AttributeDescriptor::enumerated(
                SENSITIVITY,
                "sensitivity",
                registers::SENSITIVITY,
                sensitivities,
                &SENSITIVITY_LABELS,
                1e-10,
            ),
            AttributeDescriptor::enumerated(
                GAIN,
                "AC gain",
                registers::GAIN,
                GAINS.to_vec(),
                &GAIN_LABELS,
                0.1,
            ),
            AttributeDescriptor::enumerated(
                SLOPE,
                "filter slope",
                registers::SLOPE,
                SLOPES.to_vec(),
                &SLOPE_LABELS,
                0.1,
            ),
            AttributeDescriptor::scalar(
                FREQUENCY,
                "reference frequency",
                registers::FREQUENCY,
                1.0,
                "Hz",
            )
            .with_bounds(FREQUENCY_MIN, FREQUENCY_MAX)
            .with_format(DisplayFormat::FREQUENCY),
            AttributeDescriptor::enumerated(
                REFERENCE,
                "reference",
                registers::REFERENCE,
                references,
                &REFERENCE_LABELS,
                0.1,
            ),
            AttributeDescriptor::boolean(AC_COUPLING, "AC coupling", registers::COUPLING),
            AttributeDescriptor::boolean(GROUND, "Ground shielding", registers::GROUND),
        ])
    }

    /// Descriptor for `name`.
    ///
    /// # Errors
    ///
    /// [`DaqError::UnknownAttribute`] if nothing is registered under `name`.
    pub fn describe(&self, name: &str) -> AppResult<&AttributeDescriptor> {
        self.descriptors
            .get(name)
            .ok_or_else(|| DaqError::UnknownAttribute(name.to_string()))
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.descriptors.keys().map(String::as_str)
    }

    /// Descriptors in name order.
    pub fn iter(&self) -> impl Iterator<Item = &AttributeDescriptor> {
        self.descriptors.values()
    }

    /// Number of registered attributes.
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::{AttributeAccess, AttributeKind};
    use crate::link::dsp7265::{REFERENCES, SENSITIVITIES, TIME_CONSTANTS};

    fn registry() -> AttributeRegistry {
        AttributeRegistry::dsp7265_from_tables(
            TIME_CONSTANTS.to_vec(),
            SENSITIVITIES.to_vec(),
            REFERENCES.to_vec(),
        )
        .unwrap()
    }

    #[test]
    fn test_all_attributes_registered() {
        let registry = registry();
        assert_eq!(registry.len(), 12);
        for name in [
            "X",
            "Y",
            "R",
            "Theta",
            "timeconstant",
            "sensitivity",
            "gain",
            "slope",
            "frequency",
            "reference",
            "ACcoupling",
            "ground",
        ] {
            assert!(registry.describe(name).is_ok(), "{name} missing");
        }
    }

    #[test]
    fn test_unknown_attribute() {
        let err = registry().describe("phase").unwrap_err();
        assert!(matches!(err, DaqError::UnknownAttribute(name) if name == "phase"));
    }

    #[test]
    fn test_candidate_counts() {
        let registry = registry();
        let count = |n: &str| registry.describe(n).unwrap().len();
        assert_eq!(count(names::TIME_CONSTANT), 29);
        assert_eq!(count(names::SENSITIVITY), 28);
        assert_eq!(count(names::GAIN), 10);
        assert_eq!(count(names::SLOPE), 4);
        assert_eq!(count(names::REFERENCE), 3);
    }

    #[test]
    fn test_signal_channels_read_only() {
        let registry = registry();
        for name in [names::X, names::Y, names::R, names::THETA] {
            let d = registry.describe(name).unwrap();
            assert_eq!(d.kind, AttributeKind::Scalar);
            assert_eq!(d.access, AttributeAccess::ReadOnly);
        }
        assert_eq!(registry.describe(names::R).unwrap().scale, 1e9);
        assert_eq!(registry.describe(names::THETA).unwrap().scale, 1.0);
    }

    #[test]
    fn test_labels_follow_table_order() {
        let registry = registry();
        let tc = registry.describe(names::TIME_CONSTANT).unwrap();
        assert_eq!(tc.label_of(7), Some("5 ms"));
        assert_eq!(tc.candidates[7], 5.0e-3);
        let reference = registry.describe(names::REFERENCE).unwrap();
        assert_eq!(reference.index_of_label("external front"), Some(2));
    }

    #[test]
    fn test_short_link_table_rejected() {
        let err = AttributeRegistry::dsp7265_from_tables(
            TIME_CONSTANTS[..28].to_vec(),
            SENSITIVITIES.to_vec(),
            REFERENCES.to_vec(),
        )
        .unwrap_err();
        assert!(
            matches!(err, DaqError::InvalidDescriptor { ref attribute, .. } if attribute == "timeconstant")
        );
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let d = AttributeDescriptor::boolean("ground", "g", "ground");
        assert!(AttributeRegistry::new(vec![d.clone(), d]).is_err());
    }
}
