//! Attribute adapter for the Signal Recovery DSP 7265 lock-in amplifier.
//!
//! Exposes the instrument's settings as named, typed attributes for a remote
//! control system, translating between raw register values and discrete,
//! labelled settings (time constant, sensitivity, gain, filter slope,
//! reference source), scaled signal channels and flags.
//!
//! - [`attributes`]: pure conversion core and the static attribute registry
//! - [`link`]: the raw register interface to the instrument
//! - [`adapters`]: mock and VISA link implementations
//! - [`instrument`]: the serialized, timeout-bounded DSP 7265 adapter
//! - [`binding`]: device state and properties for a remote-control framework
//! - [`config`], [`logging`]: ambient setup used by the `lockin_daq` binary

pub mod adapters;
pub mod attributes;
pub mod binding;
pub mod config;
pub mod error;
pub mod instrument;
pub mod link;
pub mod logging;

pub use attributes::{AttributeDescriptor, AttributeRegistry, AttributeValue};
pub use binding::{DeviceBinding, DeviceProperties, DeviceState};
pub use error::{AppResult, DaqError};
pub use instrument::Dsp7265;
pub use link::InstrumentLink;
