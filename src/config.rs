//! Session configuration.

use std::fmt;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::transport::uuids::SPP_SERVICE_UUID;

/// Name the teapot firmware advertises out of the box.
pub const DEFAULT_DEVICE_NAME: &str = "ESP32-BT-Theiere";

/// The user-configurable name of the teapot. Never blank.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String"))]
pub struct DeviceName(String);

impl DeviceName {
    /// Create a device name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameter`] for a blank name.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(Error::invalid_parameter("device_name", name));
        }
        Ok(Self(name))
    }

    /// Replace the name. A blank name is rejected and the old one kept.
    pub fn update(&mut self, name: impl Into<String>) -> Result<()> {
        *self = Self::new(name)?;
        info!("Device name updated to {}", self.0);
        Ok(())
    }

    /// The name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DeviceName {
    type Error = Error;

    fn try_from(name: String) -> Result<Self> {
        Self::new(name)
    }
}

impl Default for DeviceName {
    fn default() -> Self {
        Self(DEFAULT_DEVICE_NAME.to_string())
    }
}

impl fmt::Display for DeviceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tuning for a brew session.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SessionConfig {
    /// Name of the bonded teapot to connect to.
    pub device_name: DeviceName,
    /// Serial service identifier.
    pub service_uuid: Uuid,
    /// Interval between poll cycles.
    pub cadence: Duration,
    /// Interval between countdown ticks.
    pub countdown_tick: Duration,
    /// Limit on waiting for one reply. `None` waits forever.
    pub read_timeout: Option<Duration>,
    /// Consecutive failed cycles that end the session. `None` never gives up.
    pub max_consecutive_failures: Option<u32>,
    /// Limit on sending the off instruction while shutting down.
    pub final_instruction_timeout: Duration,
}

impl SessionConfig {
    /// Default poll cadence.
    pub const DEFAULT_CADENCE: Duration = Duration::from_secs(1);
    /// Default reply timeout.
    pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(8);
    /// Default consecutive failure limit.
    pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 10;

    /// Config for the given device name with default tuning.
    pub fn new(device_name: DeviceName) -> Self {
        Self {
            device_name,
            ..Self::default()
        }
    }

    /// Set the serial service identifier.
    pub fn with_service_uuid(mut self, service_uuid: Uuid) -> Self {
        self.service_uuid = service_uuid;
        self
    }

    /// Set the poll cadence.
    pub fn with_cadence(mut self, cadence: Duration) -> Self {
        self.cadence = cadence;
        self
    }

    /// Set the countdown tick interval.
    pub fn with_countdown_tick(mut self, tick: Duration) -> Self {
        self.countdown_tick = tick;
        self
    }

    /// Set the reply timeout.
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the consecutive failure limit.
    pub fn with_max_consecutive_failures(mut self, limit: Option<u32>) -> Self {
        self.max_consecutive_failures = limit;
        self
    }

    /// Set the shutdown send limit.
    pub fn with_final_instruction_timeout(mut self, timeout: Duration) -> Self {
        self.final_instruction_timeout = timeout;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            device_name: DeviceName::default(),
            service_uuid: SPP_SERVICE_UUID,
            cadence: Self::DEFAULT_CADENCE,
            countdown_tick: Duration::from_secs(1),
            read_timeout: Some(Self::DEFAULT_READ_TIMEOUT),
            max_consecutive_failures: Some(Self::DEFAULT_MAX_CONSECUTIVE_FAILURES),
            final_instruction_timeout: Duration::from_secs(2),
        }
    }
}
