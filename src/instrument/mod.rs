//! Instrument adapters built on the attribute core.

pub mod dsp7265;

pub use dsp7265::Dsp7265;
