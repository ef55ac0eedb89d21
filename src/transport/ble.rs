//! BLE radio backend.
//!
//! ESP32 serial bridges that run over BLE expose the Nordic UART service:
//! the client writes frames to the RX characteristic and receives the reply
//! as TX notifications. This backend presents that pair as a byte stream.

use async_trait::async_trait;
use btleplug::api::{
    Central, CentralState, Characteristic, Manager as _, Peripheral as _, ScanFilter,
    ValueNotification, WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use bytes::BytesMut;
use futures::stream::{Stream, StreamExt};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::pin::Pin;
use std::time::Duration;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use super::uuids::{gatt_service_for, UART_RX_UUID, UART_TX_UUID};
use super::{release_on_error, BondedDevice, DeviceIdentity, Link, Radio};
use crate::error::{Error, Result};

/// Default time spent scanning before listing known peripherals.
pub const DEFAULT_SCAN_WINDOW: Duration = Duration::from_secs(2);

/// Largest write that fits a default-MTU ATT packet.
pub const DEFAULT_WRITE_CHUNK: usize = 20;

type NotificationStream = Pin<Box<dyn Stream<Item = ValueNotification> + Send>>;

/// Radio backed by the first btleplug adapter.
pub struct BleRadio {
    /// The BLE adapter.
    adapter: Adapter,
    /// How long to scan before listing peripherals.
    scan_window: Duration,
    /// Peripherals seen by the last listing, by address.
    known: RwLock<HashMap<String, Peripheral>>,
}

impl BleRadio {
    /// Create a radio on the first available adapter.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AdapterUnavailable`] if there is no adapter.
    pub async fn new() -> Result<Self> {
        let manager = Manager::new()
            .await
            .map_err(|_e| Error::AdapterUnavailable)?;

        let adapters = manager.adapters().await.map_err(Error::Bluetooth)?;

        let adapter = adapters
            .into_iter()
            .next()
            .ok_or(Error::AdapterUnavailable)?;

        info!(
            "Using Bluetooth adapter: {:?}",
            adapter.adapter_info().await.ok()
        );

        Ok(Self::with_adapter(adapter))
    }

    /// Create a radio on a specific adapter.
    pub fn with_adapter(adapter: Adapter) -> Self {
        Self {
            adapter,
            scan_window: DEFAULT_SCAN_WINDOW,
            known: RwLock::new(HashMap::new()),
        }
    }

    /// Set the scan window used before listing peripherals.
    pub fn with_scan_window(mut self, scan_window: Duration) -> Self {
        self.scan_window = scan_window;
        self
    }

    /// Scan briefly so nearby bridges show up, then list what the adapter knows.
    async fn refresh(&self) -> Result<Vec<Peripheral>> {
        if !self.scan_window.is_zero() {
            debug!("Scanning for {:?}", self.scan_window);
            self.adapter
                .start_scan(ScanFilter::default())
                .await
                .map_err(Error::Bluetooth)?;
            tokio::time::sleep(self.scan_window).await;
            if let Err(e) = self.adapter.stop_scan().await {
                warn!("Failed to stop scan: {}", e);
            }
        }

        self.adapter.peripherals().await.map_err(Error::Bluetooth)
    }
}

#[async_trait]
impl Radio for BleRadio {
    async fn is_available(&self) -> bool {
        match self.adapter.adapter_state().await {
            Ok(state) => state == CentralState::PoweredOn,
            Err(e) => {
                debug!("Failed to read adapter state: {}", e);
                false
            }
        }
    }

    async fn has_connect_permission(&self) -> bool {
        !matches!(
            self.adapter.peripherals().await,
            Err(btleplug::Error::PermissionDenied)
        )
    }

    async fn bonded_devices(&self) -> Result<Vec<BondedDevice>> {
        let peripherals = self.refresh().await?;
        let mut devices = Vec::with_capacity(peripherals.len());
        let mut known = HashMap::with_capacity(peripherals.len());

        for peripheral in peripherals {
            let name = match peripheral.properties().await {
                Ok(Some(props)) => props.local_name,
                _ => None,
            };
            let address = peripheral.id().to_string();
            trace!("Known peripheral {} ({:?})", address, name);

            devices.push(BondedDevice {
                name,
                address: address.clone(),
            });
            known.insert(address, peripheral);
        }

        *self.known.write() = known;
        Ok(devices)
    }

    async fn open(&self, identity: &DeviceIdentity) -> Result<Box<dyn Link>> {
        let peripheral = self
            .known
            .read()
            .get(&identity.address)
            .cloned()
            .ok_or_else(|| Error::ConnectionFailed {
                reason: format!("peripheral {} not discovered", identity.address),
            })?;

        peripheral
            .connect()
            .await
            .map_err(|e| Error::ConnectionFailed {
                reason: e.to_string(),
            })?;

        let service = gatt_service_for(&identity.service_uuid);
        let link = release_on_error(
            BleUartLink::attach(peripheral.clone(), service),
            async { peripheral.disconnect().await },
        )
        .await?;

        info!("UART bridge ready on {}", identity.address);
        Ok(Box::new(link))
    }
}

/// A serial stream carried over the UART characteristics of one peripheral.
pub struct BleUartLink {
    peripheral: Peripheral,
    rx: Characteristic,
    tx: Characteristic,
    notifications: NotificationStream,
    pending: BytesMut,
    write_chunk: usize,
    connected: bool,
}

impl BleUartLink {
    /// Discover the UART characteristics and subscribe to TX notifications.
    async fn attach(peripheral: Peripheral, service: Uuid) -> Result<Self> {
        peripheral
            .discover_services()
            .await
            .map_err(Error::Bluetooth)?;

        let find = |uuid: Uuid| {
            peripheral
                .characteristics()
                .into_iter()
                .find(|c| c.uuid == uuid && c.service_uuid == service)
                .ok_or_else(|| Error::ConnectionFailed {
                    reason: format!("characteristic {} missing from service {}", uuid, service),
                })
        };
        let rx = find(UART_RX_UUID)?;
        let tx = find(UART_TX_UUID)?;

        peripheral.subscribe(&tx).await.map_err(Error::Bluetooth)?;
        let notifications = peripheral.notifications().await.map_err(Error::Bluetooth)?;

        debug!("Subscribed to UART TX {}", tx.uuid);

        Ok(Self {
            peripheral,
            rx,
            tx,
            notifications,
            pending: BytesMut::new(),
            write_chunk: DEFAULT_WRITE_CHUNK,
            connected: true,
        })
    }
}

fn io_error(e: btleplug::Error) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, e)
}

#[async_trait]
impl Link for BleUartLink {
    async fn write_all(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        for chunk in bytes.chunks(self.write_chunk) {
            self.peripheral
                .write(&self.rx, chunk, WriteType::WithoutResponse)
                .await
                .map_err(io_error)?;
        }
        Ok(())
    }

    async fn read_chunk(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        while self.pending.is_empty() {
            match self.notifications.next().await {
                Some(notification) if notification.uuid == self.tx.uuid => {
                    trace!("UART notification: {} bytes", notification.value.len());
                    self.pending.extend_from_slice(&notification.value);
                }
                Some(_) => continue,
                None => {
                    debug!("Notification stream ended");
                    self.connected = false;
                    return Ok(0);
                }
            }
        }

        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending.split_to(n));
        Ok(n)
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn close(&mut self) -> std::io::Result<()> {
        self.connected = false;
        if let Err(e) = self.peripheral.unsubscribe(&self.tx).await {
            debug!("Failed to unsubscribe from UART TX: {}", e);
        }
        self.peripheral.disconnect().await.map_err(io_error)
    }
}
