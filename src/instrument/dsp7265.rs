//! Signal Recovery DSP 7265 lock-in amplifier
//!
//! Ties the attribute core to an [`InstrumentLink`]. Every access is a single
//! request/response:
//!
//! ```text
//! read:  describe -> gate -> get_register (bounded by timeout) -> resolve/scale/coerce
//! write: describe -> access + value check -> gate -> set_register (bounded by timeout)
//! ```
//!
//! Value checks happen before the gate is taken, so a rejected write never
//! reaches the instrument. Nothing is cached; every read goes to the link.
//!
//! ## Serialization
//!
//! The link accepts one command at a time. A `tokio::sync::Mutex` gate is held
//! for the duration of each link call, so a polling loop and an interactive
//! write sharing one `Dsp7265` never overlap, and a write is fully committed
//! before a later read can observe the instrument.
//!
//! ## Reconnects
//!
//! Each request records the link epoch when it starts. [`Dsp7265::reconnect`]
//! bumps the epoch before it waits for the gate, so requests that are queued or
//! in flight across a reconnect fail with `LinkUnavailable` instead of
//! returning data from the old session.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::attributes::{self, writer, AttributeDescriptor, AttributeRegistry, AttributeValue};
use crate::error::{AppResult, DaqError};
use crate::link::InstrumentLink;

/// Default bound on a single link call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// Attribute-level access to one DSP 7265.
pub struct Dsp7265 {
    link: Arc<dyn InstrumentLink>,
    registry: AttributeRegistry,
    gate: Mutex<()>,
    epoch: AtomicU64,
    timeout: Duration,
}

impl Dsp7265 {
    /// Build the registry from the link's candidate tables.
    ///
    /// # Errors
    ///
    /// [`DaqError::InvalidDescriptor`] if the link tables do not fit the
    /// attribute definitions.
    pub fn new(link: Arc<dyn InstrumentLink>, timeout: Duration) -> AppResult<Self> {
        let registry = AttributeRegistry::dsp7265(link.as_ref())?;
        Ok(Self::with_registry(link, registry, timeout))
    }

    /// Use an already-built registry.
    pub fn with_registry(
        link: Arc<dyn InstrumentLink>,
        registry: AttributeRegistry,
        timeout: Duration,
    ) -> Self {
        info!(
            "DSP 7265 adapter on {} ({} attributes, {}ms timeout)",
            link.info(),
            registry.len(),
            timeout.as_millis()
        );
        Self {
            link,
            registry,
            gate: Mutex::new(()),
            epoch: AtomicU64::new(0),
            timeout,
        }
    }

    /// Attribute table built at construction.
    pub fn registry(&self) -> &AttributeRegistry {
        &self.registry
    }

    /// Descriptor for `name`.
    pub fn describe(&self, name: &str) -> AppResult<&AttributeDescriptor> {
        self.registry.describe(name)
    }

    /// Bound on each link call.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Read `name` from the instrument.
    ///
    /// # Errors
    ///
    /// `UnknownAttribute`, `NoMatchingValue`, or a link error.
    pub async fn read(&self, name: &str) -> AppResult<AttributeValue> {
        let descriptor = self.registry.describe(name)?;
        let register = descriptor.register.as_str();
        let result = self
            .gated(register, self.link.get_register(register))
            .await
            .and_then(|raw| {
                let value = attributes::from_raw(descriptor, raw)?;
                debug!("read {} ({} = {}) -> {}", name, register, raw, value);
                Ok(value)
            });
        if let Err(e) = &result {
            warn!("read {} failed: {}", name, e);
        }
        result
    }

    /// Write `value` to `name`.
    ///
    /// # Errors
    ///
    /// `UnknownAttribute`, `ReadOnly`, `TypeMismatch`, `IndexOutOfRange`,
    /// `OutOfBounds`, or a link error.
    pub async fn write(&self, name: &str, value: AttributeValue) -> AppResult<()> {
        let result = self.write_inner(name, value).await;
        if let Err(e) = &result {
            warn!("write {} = {} failed: {}", name, value, e);
        }
        result
    }

    async fn write_inner(&self, name: &str, value: AttributeValue) -> AppResult<()> {
        let descriptor = self.registry.describe(name)?;
        if !descriptor.is_writable() {
            return Err(DaqError::ReadOnly(name.to_string()));
        }
        let raw = writer::to_raw(descriptor, value)?;
        let register = descriptor.register.as_str();
        self.gated(register, self.link.set_register(register, raw))
            .await?;
        debug!("write {} = {} ({} <- {})", name, value, register, raw);
        Ok(())
    }

    /// Re-open the link, failing any request that straddles it.
    pub async fn reconnect(&self) -> AppResult<()> {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let _gate = self.gate.lock().await;
        info!("reconnecting {} (epoch {})", self.link.info(), epoch);
        tokio::time::timeout(self.timeout, self.link.reconnect())
            .await
            .map_err(|_| DaqError::LinkTimeout {
                register: "session".to_string(),
                timeout_ms: self.timeout_ms(),
            })?
    }

    /// Run one link call under the gate and the timeout.
    async fn gated<T>(
        &self,
        register: &str,
        call: impl Future<Output = AppResult<T>> + Send,
    ) -> AppResult<T> {
        let epoch = self.epoch.load(Ordering::SeqCst);
        let _gate = self.gate.lock().await;
        self.check_epoch(epoch, register)?;

        let result = tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| DaqError::LinkTimeout {
                register: register.to_string(),
                timeout_ms: self.timeout_ms(),
            })?;

        self.check_epoch(epoch, register)?;
        result
    }

    fn check_epoch(&self, started: u64, register: &str) -> AppResult<()> {
        if self.epoch.load(Ordering::SeqCst) == started {
            Ok(())
        } else {
            Err(DaqError::unavailable(register, "link reconnected during request"))
        }
    }

    fn timeout_ms(&self) -> u64 {
        self.timeout.as_millis() as u64
    }
}
