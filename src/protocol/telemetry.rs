//! Inbound temperature readings.

use std::fmt;

use super::instruction::{Reply, TEMPERATURE_OFF};
use crate::utils::celsius_to_fahrenheit;

/// One temperature reported by the teapot, in whole degrees Celsius.
///
/// [`TelemetryReading::UNKNOWN`] stands for "no reading yet".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TelemetryReading(i32);

impl TelemetryReading {
    /// Sentinel for an unknown temperature.
    pub const UNKNOWN: Self = Self(TEMPERATURE_OFF);

    /// Wrap a raw reading.
    pub fn new(celsius: i32) -> Self {
        Self(celsius)
    }

    /// Extract the `temp` value from a decoded reply.
    ///
    /// Returns `None` if the key is missing or not an integer.
    pub fn from_reply(reply: &Reply) -> Option<Self> {
        reply.temperature().map(Self)
    }

    /// The raw value, including the sentinel.
    pub fn value(&self) -> i32 {
        self.0
    }

    /// Whether this is a real reading.
    pub fn is_known(&self) -> bool {
        *self != Self::UNKNOWN
    }

    /// The reading in Celsius, if known.
    pub fn celsius(&self) -> Option<i32> {
        self.is_known().then_some(self.0)
    }

    /// The reading in Fahrenheit, if known.
    pub fn fahrenheit(&self) -> Option<f64> {
        self.celsius().map(|c| celsius_to_fahrenheit(c as f64))
    }
}

impl Default for TelemetryReading {
    fn default() -> Self {
        Self::UNKNOWN
    }
}

impl fmt::Display for TelemetryReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.celsius() {
            Some(c) => write!(f, "{}°C", c),
            None => f.write_str("--"),
        }
    }
}
