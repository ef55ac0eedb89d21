//! Framed serial transport.
//!
//! This module owns the physical connection to the teapot: finding a bonded
//! device by name, opening a stream to it, and splitting the byte stream into
//! `\n`-terminated lines.
//!
//! Radio access goes through two traits so the framing and the session logic
//! do not depend on a particular Bluetooth stack:
//!
//! - [`Radio`] answers adapter questions and opens a [`Link`].
//! - [`Link`] is one open duplex byte stream.
//!
//! Backends:
//!
//! - [`ble::BleRadio`] (btleplug) bridges the serial stream over the Nordic
//!   UART GATT service.
//! - `rfcomm::RfcommRadio` (BlueZ, `rfcomm` feature, Linux) opens a classic
//!   RFCOMM socket to the Serial Port Profile.
//! - [`stream::StreamLink`] wraps any tokio stream, including the RFCOMM one.

pub mod ble;
pub mod framed;
#[cfg(all(feature = "rfcomm", target_os = "linux"))]
pub mod rfcomm;
pub mod stream;
pub mod uuids;

use async_trait::async_trait;
use std::future::Future;
use tracing::warn;
use uuid::Uuid;

use crate::error::Result;

pub use framed::{discover, FramedTransport, LINE_TERMINATOR, READ_CHUNK_SIZE};
pub use stream::StreamLink;

/// A device the local adapter knows about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BondedDevice {
    /// Advertised or cached name, if any.
    pub name: Option<String>,
    /// Backend-specific address (MAC on BlueZ, peripheral id on btleplug).
    pub address: String,
}

impl BondedDevice {
    /// Create a bonded device entry.
    pub fn new(name: Option<&str>, address: impl Into<String>) -> Self {
        Self {
            name: name.map(str::to_string),
            address: address.into(),
        }
    }
}

/// The resolved target of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// Name the device was discovered under.
    pub name: String,
    /// Backend-specific address.
    pub address: String,
    /// Serial service to connect to.
    pub service_uuid: Uuid,
}

/// One open duplex byte stream to a single device.
#[async_trait]
pub trait Link: Send {
    /// Write all bytes and flush.
    async fn write_all(&mut self, bytes: &[u8]) -> std::io::Result<()>;

    /// Read up to `buf.len()` bytes. `Ok(0)` means end of stream.
    async fn read_chunk(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;

    /// Whether the underlying stream still reports connected.
    fn is_connected(&self) -> bool;

    /// Release the stream.
    async fn close(&mut self) -> std::io::Result<()>;
}

/// Access to the local Bluetooth adapter.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Radio: Send + Sync {
    /// Whether the adapter is present and powered.
    async fn is_available(&self) -> bool;

    /// Whether the host has granted the connect capability.
    async fn has_connect_permission(&self) -> bool;

    /// Devices the adapter is bonded with. Order is implementation-defined.
    async fn bonded_devices(&self) -> Result<Vec<BondedDevice>>;

    /// Open a stream to `identity`.
    ///
    /// On failure nothing may be left half-open: every backend releases what
    /// it created before returning the error. [`ble::BleRadio`] disconnects
    /// the peripheral if the UART service cannot be set up after connecting.
    /// `rfcomm::RfcommRadio` only creates its socket inside
    /// `Stream::connect`, which drops it when the connect fails.
    async fn open(&self, identity: &DeviceIdentity) -> Result<Box<dyn Link>>;
}

/// Run the setup that follows a successful connect.
///
/// If `setup` fails, `release` runs before the setup error is returned so the
/// connection is not left half-open. A failing `release` is only logged.
pub(crate) async fn release_on_error<T, S, R, E>(setup: S, release: R) -> Result<T>
where
    S: Future<Output = Result<T>>,
    R: Future<Output = std::result::Result<(), E>>,
    E: std::fmt::Display,
{
    match setup.await {
        Ok(value) => Ok(value),
        Err(e) => {
            if let Err(release_err) = release.await {
                warn!("Failed to release connection after setup error: {}", release_err);
            }
            Err(e)
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_release_runs_when_setup_fails() {
        let released = AtomicUsize::new(0);

        let result: Result<()> = release_on_error(
            async { Err(Error::Internal("no UART service".to_string())) },
            async {
                released.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>("already gone")
            },
        )
        .await;

        assert!(matches!(result, Err(Error::Internal(ref m)) if m == "no UART service"));
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_release_skipped_when_setup_succeeds() {
        let released = AtomicUsize::new(0);

        let value = release_on_error(async { Ok(7) }, async {
            released.fetch_add(1, Ordering::SeqCst);
            Ok::<(), Error>(())
        })
        .await
        .unwrap();

        assert_eq!(value, 7);
        assert_eq!(released.load(Ordering::SeqCst), 0);
    }
}
