//! InstrumentLink - raw register access to the lock-in amplifier
//!
//! Hardware-agnostic interface the attribute adapter talks to. Implementations
//! handle protocol-specific details (VISA/GPIB, in-memory mock).
//!
//! ## Contract
//!
//! - Registers are addressed by the names in [`registers`] and carry raw
//!   device values in native units (volts, seconds, Hz, dB, 1.0/0.0 flags).
//! - One command is in flight at a time. Callers serialize access; a link
//!   implementation does not need to be re-entrant.
//! - Candidate tables are returned in the instrument's own order. That order is
//!   the externally visible attribute index and must not be sorted or deduped.
//! - Failures are reported as [`DaqError::LinkUnavailable`] or
//!   [`DaqError::LinkTimeout`].
//!
//! [`DaqError::LinkUnavailable`]: crate::error::DaqError::LinkUnavailable
//! [`DaqError::LinkTimeout`]: crate::error::DaqError::LinkTimeout

use async_trait::async_trait;

use crate::error::AppResult;

/// Register names understood by every link implementation.
pub mod registers {
    /// In-phase signal component (V).
    pub const X: &str = "x";
    /// Quadrature signal component (V).
    pub const Y: &str = "y";
    /// Signal magnitude (V).
    pub const MAGNITUDE: &str = "magnitude";
    /// Signal phase (deg).
    pub const PHASE: &str = "phase";
    /// Output filter time constant (s).
    pub const TIME_CONSTANT: &str = "time_constant";
    /// Full-scale sensitivity (V).
    pub const SENSITIVITY: &str = "sensitivity";
    /// AC gain (dB).
    pub const GAIN: &str = "gain";
    /// Output filter slope (dB/octave).
    pub const SLOPE: &str = "slope";
    /// Reference frequency (Hz).
    pub const FREQUENCY: &str = "frequency";
    /// Reference source code.
    pub const REFERENCE: &str = "reference";
    /// AC coupling flag.
    pub const COUPLING: &str = "coupling";
    /// Input shield grounding flag.
    pub const GROUND: &str = "ground";

    /// Every register, in a stable order.
    pub const ALL: [&str; 12] = [
        X,
        Y,
        MAGNITUDE,
        PHASE,
        TIME_CONSTANT,
        SENSITIVITY,
        GAIN,
        SLOPE,
        FREQUENCY,
        REFERENCE,
        COUPLING,
        GROUND,
    ];
}

/// Native DSP 7265 candidate tables.
pub mod dsp7265 {
    /// Output filter time constants in seconds, in front-panel order.
    pub const TIME_CONSTANTS: [f64; 29] = [
        10.0e-6, 20.0e-6, 40.0e-6, 80.0e-6, 160.0e-6, 320.0e-6, 640.0e-6, 5.0e-3, 10.0e-3,
        20.0e-3, 50.0e-3, 100.0e-3, 200.0e-3, 500.0e-3, 1.0, 2.0, 5.0, 10.0, 20.0, 50.0, 100.0,
        200.0, 500.0, 1.0e3, 2.0e3, 5.0e3, 10.0e3, 20.0e3, 50.0e3,
    ];

    /// Full-scale sensitivities in volts. Entry 0 is the unused code.
    pub const SENSITIVITIES: [f64; 28] = [
        0.0, 2.0e-9, 5.0e-9, 10.0e-9, 20.0e-9, 50.0e-9, 100.0e-9, 200.0e-9, 500.0e-9, 1.0e-6,
        2.0e-6, 5.0e-6, 10.0e-6, 20.0e-6, 50.0e-6, 100.0e-6, 200.0e-6, 500.0e-6, 1.0e-3, 2.0e-3,
        5.0e-3, 10.0e-3, 20.0e-3, 50.0e-3, 100.0e-3, 200.0e-3, 500.0e-3, 1.0,
    ];

    /// Reference source codes: internal, external rear, external front.
    pub const REFERENCES: [f64; 3] = [0.0, 1.0, 2.0];
}

/// Raw register access to one physical instrument.
#[async_trait]
pub trait InstrumentLink: Send + Sync {
    /// Read the raw value of `register`.
    async fn get_register(&self, register: &str) -> AppResult<f64>;

    /// Write the raw value of `register`.
    async fn set_register(&self, register: &str, value: f64) -> AppResult<()>;

    /// Drop and re-open the underlying session.
    async fn reconnect(&self) -> AppResult<()>;

    /// Time constant table in instrument order.
    fn time_constants(&self) -> Vec<f64>;

    /// Sensitivity table in instrument order.
    fn sensitivities(&self) -> Vec<f64>;

    /// Reference source table in instrument order.
    fn references(&self) -> Vec<f64>;

    /// Human-readable endpoint, for logs.
    fn info(&self) -> String;
}
