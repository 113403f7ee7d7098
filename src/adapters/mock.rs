//! Mock DSP 7265 link
//!
//! In-memory register file that behaves like the instrument for testing
//! without hardware. All waiting uses `tokio::time::sleep`.
//!
//! Fault injection:
//! - [`MockLink::set_unavailable`]: every call fails with `LinkUnavailable`
//!   until cleared or until [`InstrumentLink::reconnect`] succeeds
//! - [`MockLink::set_latency`]: every call sleeps first, so callers can
//!   exercise their timeouts
//!
//! The link also records how many calls were executing at once, which lets
//! tests check that callers serialize access.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::trace;

use crate::error::{AppResult, DaqError};
use crate::link::{dsp7265, registers, InstrumentLink};

const READ_ONLY: [&str; 4] = [
    registers::X,
    registers::Y,
    registers::MAGNITUDE,
    registers::PHASE,
];

/// Simulated lock-in amplifier.
///
/// # Example
///
/// ```rust,ignore
/// let link = Arc::new(MockLink::new());
/// link.set_signal(3e-9, 4e-9).await;
/// assert_eq!(link.get_register("magnitude").await?, 5e-9);
/// ```
pub struct MockLink {
    registers: Arc<RwLock<HashMap<String, f64>>>,
    time_constants: Vec<f64>,
    sensitivities: Vec<f64>,
    references: Vec<f64>,
    unavailable: AtomicBool,
    latency_ms: AtomicU64,
    operations: AtomicU64,
    reconnects: AtomicU64,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

/// Decrements the in-flight count even if the call is cancelled.
struct InFlight(Arc<AtomicUsize>);

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockLink {
    /// Power-on state with the instrument's native tables.
    pub fn new() -> Self {
        Self::with_tables(
            dsp7265::TIME_CONSTANTS.to_vec(),
            dsp7265::SENSITIVITIES.to_vec(),
            dsp7265::REFERENCES.to_vec(),
        )
    }

    /// Power-on state with custom candidate tables.
    pub fn with_tables(
        time_constants: Vec<f64>,
        sensitivities: Vec<f64>,
        references: Vec<f64>,
    ) -> Self {
        let defaults = [
            (registers::X, 0.0),
            (registers::Y, 0.0),
            (registers::MAGNITUDE, 0.0),
            (registers::PHASE, 0.0),
            (registers::TIME_CONSTANT, 100.0e-3),
            (registers::SENSITIVITY, 1.0e-3),
            (registers::GAIN, 0.0),
            (registers::SLOPE, 12.0),
            (registers::FREQUENCY, 1000.0),
            (registers::REFERENCE, 0.0),
            (registers::COUPLING, 1.0),
            (registers::GROUND, 0.0),
        ];
        Self {
            registers: Arc::new(RwLock::new(
                defaults.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            )),
            time_constants,
            sensitivities,
            references,
            unavailable: AtomicBool::new(false),
            latency_ms: AtomicU64::new(0),
            operations: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Make every call fail with `LinkUnavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delay applied before every call.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    /// Overwrite a register directly, bypassing the read-only check.
    pub async fn set_raw(&self, register: &str, value: f64) {
        self.registers
            .write()
            .await
            .insert(register.to_string(), value);
    }

    /// Current register content without counting as an operation.
    pub async fn raw(&self, register: &str) -> Option<f64> {
        self.registers.read().await.get(register).copied()
    }

    /// Set the demodulated signal, deriving magnitude and phase.
    pub async fn set_signal(&self, x: f64, y: f64) {
        let mut regs = self.registers.write().await;
        regs.insert(registers::X.to_string(), x);
        regs.insert(registers::Y.to_string(), y);
        regs.insert(registers::MAGNITUDE.to_string(), x.hypot(y));
        regs.insert(registers::PHASE.to_string(), y.atan2(x).to_degrees());
    }

    /// Number of get/set calls that reached the register file.
    pub fn operation_count(&self) -> u64 {
        self.operations.load(Ordering::SeqCst)
    }

    /// Number of `reconnect` calls.
    pub fn reconnect_count(&self) -> u64 {
        self.reconnects.load(Ordering::SeqCst)
    }

    /// Highest number of calls observed executing at the same time.
    pub fn max_concurrency(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self, register: &str) -> AppResult<InFlight> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let guard = InFlight(self.in_flight.clone());

        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            sleep(Duration::from_millis(latency)).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DaqError::unavailable(register, "mock link offline"));
        }
        Ok(guard)
    }
}

impl Default for MockLink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InstrumentLink for MockLink {
    async fn get_register(&self, register: &str) -> AppResult<f64> {
        let _guard = self.enter(register).await?;
        let value = self
            .registers
            .read()
            .await
            .get(register)
            .copied()
            .ok_or_else(|| DaqError::Instrument(format!("unknown register '{register}'")))?;
        self.operations.fetch_add(1, Ordering::SeqCst);
        trace!("MockLink get {} -> {}", register, value);
        Ok(value)
    }

    async fn set_register(&self, register: &str, value: f64) -> AppResult<()> {
        let _guard = self.enter(register).await?;
        if READ_ONLY.contains(&register) {
            return Err(DaqError::Instrument(format!(
                "register '{register}' cannot be written"
            )));
        }
        let mut regs = self.registers.write().await;
        match regs.get_mut(register) {
            Some(slot) => *slot = value,
            None => {
                return Err(DaqError::Instrument(format!(
                    "unknown register '{register}'"
                )))
            }
        }
        self.operations.fetch_add(1, Ordering::SeqCst);
        trace!("MockLink set {} <- {}", register, value);
        Ok(())
    }

    async fn reconnect(&self) -> AppResult<()> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            sleep(Duration::from_millis(latency)).await;
        }
        self.unavailable.store(false, Ordering::SeqCst);
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn time_constants(&self) -> Vec<f64> {
        self.time_constants.clone()
    }

    fn sensitivities(&self) -> Vec<f64> {
        self.sensitivities.clone()
    }

    fn references(&self) -> Vec<f64> {
        self.references.clone()
    }

    fn info(&self) -> String {
        "MockLink(DSP 7265)".to_string()
    }
}
