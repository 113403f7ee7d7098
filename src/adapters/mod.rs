//! InstrumentLink implementations
//!
//! - [`MockLink`]: in-memory DSP 7265 for tests and `--mock` runs
//! - [`VisaLink`]: DSP 7265 over VISA (real I/O needs `instrument_visa`)

pub mod mock;
pub mod visa_adapter;

pub use mock::MockLink;
pub use visa_adapter::VisaLink;
