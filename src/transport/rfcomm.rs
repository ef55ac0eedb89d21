//! Classic Bluetooth RFCOMM backend on BlueZ.
//!
//! Requires the `rfcomm` feature and Linux.

use async_trait::async_trait;
use bluer::rfcomm::{SocketAddr, Stream};
use bluer::{Address, ErrorKind};
use tracing::{debug, info, warn};

use super::stream::StreamLink;
use super::{BondedDevice, DeviceIdentity, Link, Radio};
use crate::error::{Error, Result};

/// RFCOMM channel ESP32 serial servers listen on by default.
pub const DEFAULT_RFCOMM_CHANNEL: u8 = 1;

/// Radio backed by the default BlueZ adapter.
pub struct RfcommRadio {
    _session: bluer::Session,
    adapter: bluer::Adapter,
    channel: u8,
}

impl RfcommRadio {
    /// Connect to BlueZ and use its default adapter.
    pub async fn new() -> Result<Self> {
        let session = bluer::Session::new().await.map_err(|e| {
            warn!("Failed to open BlueZ session: {}", e);
            Error::AdapterUnavailable
        })?;
        let adapter = session
            .default_adapter()
            .await
            .map_err(|_e| Error::AdapterUnavailable)?;

        info!("Using Bluetooth adapter: {}", adapter.name());

        Ok(Self {
            _session: session,
            adapter,
            channel: DEFAULT_RFCOMM_CHANNEL,
        })
    }

    /// Use a different RFCOMM channel.
    pub fn with_channel(mut self, channel: u8) -> Self {
        self.channel = channel;
        self
    }
}

#[async_trait]
impl Radio for RfcommRadio {
    async fn is_available(&self) -> bool {
        self.adapter.is_powered().await.unwrap_or(false)
    }

    async fn has_connect_permission(&self) -> bool {
        match self.adapter.device_addresses().await {
            Err(e) => !matches!(e.kind, ErrorKind::NotAuthorized | ErrorKind::NotPermitted),
            Ok(_) => true,
        }
    }

    async fn bonded_devices(&self) -> Result<Vec<BondedDevice>> {
        let mut devices = Vec::new();

        for address in self.adapter.device_addresses().await? {
            let device = self.adapter.device(address)?;
            if !device.is_paired().await? {
                continue;
            }
            let name = device.name().await?;
            debug!("Paired device {} ({:?})", address, name);
            devices.push(BondedDevice {
                name,
                address: address.to_string(),
            });
        }

        Ok(devices)
    }

    async fn open(&self, identity: &DeviceIdentity) -> Result<Box<dyn Link>> {
        let address: Address = identity
            .address
            .parse()
            .map_err(|_| Error::invalid_parameter("address", identity.address.as_str()))?;

        let device = self.adapter.device(address)?;
        match device.uuids().await {
            Ok(Some(uuids)) if !uuids.contains(&identity.service_uuid) => warn!(
                "{} does not advertise service {}, connecting anyway",
                identity.address, identity.service_uuid
            ),
            Ok(_) => {}
            Err(e) => debug!("Could not read service list of {}: {}", identity.address, e),
        }

        // A failed connect drops the socket, so nothing is left half-open.
        let stream = Stream::connect(SocketAddr::new(address, self.channel))
            .await
            .map_err(|e| Error::ConnectionFailed {
                reason: e.to_string(),
            })?;

        info!(
            "RFCOMM stream open to {} on channel {}",
            identity.address, self.channel
        );

        Ok(Box::new(StreamLink::new(stream)))
    }
}
