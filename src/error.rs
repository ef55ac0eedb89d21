//! Error types for the teapot-bt crate.

use thiserror::Error;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Bluetooth error from BlueZ.
    #[cfg(all(feature = "rfcomm", target_os = "linux"))]
    #[error("BlueZ error: {0}")]
    Bluez(#[from] bluer::Error),

    /// The local radio is absent or switched off.
    #[error("Bluetooth adapter not available or disabled")]
    AdapterUnavailable,

    /// The host has not granted the connect capability.
    #[error("Bluetooth connect permission not granted")]
    PermissionDenied,

    /// No bonded device carries the requested name.
    #[error("No bonded device named {name:?}")]
    DeviceNotFound {
        /// The name that was searched for.
        name: String,
    },

    /// Opening the serial stream failed.
    #[error("Connection failed: {reason}")]
    ConnectionFailed {
        /// Description of why the connection failed.
        reason: String,
    },

    /// Writing to the open stream failed. The handle stays open.
    #[error("Write failed: {0}")]
    Write(#[source] std::io::Error),

    /// Reading from the open stream failed.
    #[error("Read failed: {0}")]
    Read(#[source] std::io::Error),

    /// The peer closed the stream or the handle reports disconnected.
    #[error("End of stream")]
    EndOfStream,

    /// No terminated line arrived within the read timeout.
    #[error("Timed out waiting for a reply")]
    Timeout,

    /// Operation requires an open handle.
    #[error("Not connected")]
    NotConnected,

    /// An invalid parameter was provided.
    #[error("Invalid parameter: {name} = {value:?}")]
    InvalidParameter {
        /// The name of the parameter.
        name: String,
        /// The invalid value that was provided.
        value: String,
    },

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Errors raised by stream I/O once a handle is open.
    ///
    /// The poller logs these and keeps the last known reading.
    pub fn is_transport_io(&self) -> bool {
        matches!(
            self,
            Self::Write(_) | Self::Read(_) | Self::EndOfStream | Self::Timeout | Self::NotConnected
        )
    }

    pub(crate) fn invalid_parameter(name: &str, value: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.to_string(),
            value: value.into(),
        }
    }
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
