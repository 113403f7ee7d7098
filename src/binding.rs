//! Remote-control binding for the DSP 7265 adapter.
//!
//! The adapter core knows nothing about device state. This layer owns what a
//! remote control framework expects from a device server:
//!
//! - device properties applied at initialisation (the default reference mode)
//! - a coarse device state, `On` once initialised and `Fault` after
//!   [`FAULT_THRESHOLD`] consecutive `LinkUnavailable` results
//! - label lookups and display strings for enumerated attributes
//!
//! A successful [`DeviceBinding::reconnect`] is the only way out of `Fault`.
//! Requests are still forwarded while faulted so the framework can keep
//! polling.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info};

use crate::attributes::{self, names, AttributeDescriptor, AttributeValue};
use crate::error::{AppResult, DaqError};
use crate::instrument::Dsp7265;

/// Consecutive `LinkUnavailable` results that put the device in `Fault`.
pub const FAULT_THRESHOLD: u32 = 3;

/// Coarse device state reported to the remote side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceState {
    /// Properties not yet applied.
    Init,
    /// Serving requests.
    On,
    /// Link lost; cleared by a successful reconnect.
    Fault,
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DeviceState::Init => "INIT",
            DeviceState::On => "ON",
            DeviceState::Fault => "FAULT",
        };
        f.write_str(s)
    }
}

/// Read-only settings supplied when the device is created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProperties {
    /// VISA resource string of the instrument.
    #[serde(default = "default_address")]
    pub address: String,
    /// Reference source label applied at initialisation.
    #[serde(default = "default_reference")]
    pub reference: String,
}

fn default_address() -> String {
    "GPIB::12::INSTR".to_string()
}

fn default_reference() -> String {
    "internal".to_string()
}

impl Default for DeviceProperties {
    fn default() -> Self {
        Self {
            address: default_address(),
            reference: default_reference(),
        }
    }
}

/// Device-server facade over a [`Dsp7265`].
pub struct DeviceBinding {
    adapter: Arc<Dsp7265>,
    properties: DeviceProperties,
    state: RwLock<DeviceState>,
    consecutive_unavailable: AtomicU32,
}

impl DeviceBinding {
    /// Apply the device properties and switch the device on.
    ///
    /// # Errors
    ///
    /// `UnknownLabel` if the configured reference is not one of the reference
    /// labels, or whatever the reference write reports.
    pub async fn init(adapter: Arc<Dsp7265>, properties: DeviceProperties) -> AppResult<Self> {
        let binding = Self {
            adapter,
            properties,
            state: RwLock::new(DeviceState::Init),
            consecutive_unavailable: AtomicU32::new(0),
        };

        let reference = binding.properties.reference.clone();
        binding.write_label(names::REFERENCE, &reference).await?;

        *binding.state.write().await = DeviceState::On;
        info!(
            "DSP 7265 at {} is {} (reference '{}')",
            binding.properties.address,
            DeviceState::On,
            reference
        );
        Ok(binding)
    }

    /// Properties applied at initialisation.
    pub fn properties(&self) -> &DeviceProperties {
        &self.properties
    }

    /// Current device state.
    pub async fn state(&self) -> DeviceState {
        *self.state.read().await
    }

    /// Status line in the usual device-server wording.
    pub async fn status(&self) -> String {
        format!("The device is in {} state.", self.state().await)
    }

    /// Descriptor for `name`.
    pub fn describe(&self, name: &str) -> AppResult<&AttributeDescriptor> {
        self.adapter.describe(name)
    }

    /// Attribute names in registry order.
    pub fn attribute_names(&self) -> Vec<String> {
        self.adapter
            .registry()
            .names()
            .map(str::to_string)
            .collect()
    }

    /// Labels of an enumerated attribute, empty for other kinds.
    pub fn enum_labels(&self, name: &str) -> AppResult<&[String]> {
        Ok(&self.adapter.describe(name)?.labels)
    }

    /// Read `name`, counting link failures towards `Fault`.
    pub async fn read_attribute(&self, name: &str) -> AppResult<AttributeValue> {
        let result = self.adapter.read(name).await;
        self.record(&result).await;
        result
    }

    /// Write `name`, counting link failures towards `Fault`.
    pub async fn write_attribute(&self, name: &str, value: AttributeValue) -> AppResult<()> {
        let result = self.adapter.write(name, value).await;
        self.record(&result).await;
        result
    }

    /// Write an enumerated attribute by label.
    ///
    /// # Errors
    ///
    /// `UnknownLabel` if `label` is not in the attribute's label table.
    pub async fn write_label(&self, name: &str, label: &str) -> AppResult<()> {
        let index = self
            .adapter
            .describe(name)?
            .index_of_label(label)
            .ok_or_else(|| DaqError::UnknownLabel {
                attribute: name.to_string(),
                label: label.to_string(),
            })?;
        self.write_attribute(name, AttributeValue::Index(index)).await
    }

    /// Read `name` and render it for display.
    pub async fn read_formatted(&self, name: &str) -> AppResult<String> {
        let value = self.read_attribute(name).await?;
        Ok(attributes::display(self.adapter.describe(name)?, value))
    }

    /// Re-open the link; on success the device is `On` again.
    pub async fn reconnect(&self) -> AppResult<()> {
        let result = self.adapter.reconnect().await;
        if result.is_ok() {
            self.consecutive_unavailable.store(0, Ordering::SeqCst);
            *self.state.write().await = DeviceState::On;
            info!("DSP 7265 at {} reconnected", self.properties.address);
        }
        result
    }

    async fn record<T>(&self, result: &AppResult<T>) {
        match result {
            Err(DaqError::LinkUnavailable { .. }) => {
                let count = self.consecutive_unavailable.fetch_add(1, Ordering::SeqCst) + 1;
                if count >= FAULT_THRESHOLD {
                    let mut state = self.state.write().await;
                    if *state != DeviceState::Fault {
                        error!(
                            "DSP 7265 at {} entering {} after {} consecutive link failures",
                            self.properties.address,
                            DeviceState::Fault,
                            count
                        );
                        *state = DeviceState::Fault;
                    }
                }
            }
            _ => self.consecutive_unavailable.store(0, Ordering::SeqCst),
        }
    }
}
