//! Device discovery and line framing over an open [`Link`].

use bytes::{Buf, BytesMut};
use futures::FutureExt;
use std::time::Duration;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use super::{DeviceIdentity, Link, Radio};
use crate::error::{Error, Result};

/// Bytes requested from the link per read call.
pub const READ_CHUNK_SIZE: usize = 1024;

/// Byte that terminates a frame.
pub const LINE_TERMINATOR: u8 = b'\n';

/// Find the bonded device called `device_name`.
///
/// Checks run in order: blank name, adapter state, connect permission,
/// then an exact name match over the bonded devices. If several devices
/// share the name, the first one the backend lists wins; that order is
/// implementation-defined.
pub async fn discover(
    radio: &dyn Radio,
    device_name: &str,
    service_uuid: Uuid,
) -> Result<DeviceIdentity> {
    if device_name.trim().is_empty() {
        return Err(Error::invalid_parameter("device_name", device_name));
    }

    if !radio.is_available().await {
        warn!("Bluetooth adapter unavailable or powered off");
        return Err(Error::AdapterUnavailable);
    }

    if !radio.has_connect_permission().await {
        warn!("Bluetooth connect permission missing");
        return Err(Error::PermissionDenied);
    }

    let bonded = radio.bonded_devices().await?;
    debug!("Scanning {} bonded devices for {:?}", bonded.len(), device_name);

    let device = bonded
        .into_iter()
        .find(|d| d.name.as_deref() == Some(device_name))
        .ok_or_else(|| Error::DeviceNotFound {
            name: device_name.to_string(),
        })?;

    info!("Found device {} ({})", device_name, device.address);

    Ok(DeviceIdentity {
        name: device_name.to_string(),
        address: device.address,
        service_uuid,
    })
}

/// An open connection split into `\n`-terminated lines.
///
/// Owns the link exclusively; there is at most one per session.
pub struct FramedTransport {
    identity: DeviceIdentity,
    link: Option<Box<dyn Link>>,
    buffer: BytesMut,
}

impl FramedTransport {
    /// Open a stream to `identity`.
    ///
    /// Blocks until the remote accepts or refuses. Any backend failure other
    /// than a missing adapter or permission becomes [`Error::ConnectionFailed`].
    pub async fn open(radio: &dyn Radio, identity: DeviceIdentity) -> Result<Self> {
        if !radio.has_connect_permission().await {
            return Err(Error::PermissionDenied);
        }

        info!(
            "Opening serial link to {} ({}) on service {}",
            identity.name, identity.address, identity.service_uuid
        );

        let link = radio.open(&identity).await.map_err(|e| match e {
            Error::AdapterUnavailable | Error::PermissionDenied | Error::ConnectionFailed { .. } => e,
            other => Error::ConnectionFailed {
                reason: other.to_string(),
            },
        })?;

        info!("Serial link to {} established", identity.name);

        Ok(Self::from_link(identity, link))
    }

    /// Wrap an already open link.
    pub fn from_link(identity: DeviceIdentity, link: Box<dyn Link>) -> Self {
        Self {
            identity,
            link: Some(link),
            buffer: BytesMut::with_capacity(READ_CHUNK_SIZE),
        }
    }

    /// The device this transport talks to.
    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    /// Whether the handle has not been closed and the link reports connected.
    pub fn is_open(&self) -> bool {
        self.link.as_ref().map(|l| l.is_connected()).unwrap_or(false)
    }

    /// Write raw bytes and flush.
    ///
    /// A failure does not close the handle.
    pub async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        let link = self.link.as_mut().ok_or(Error::NotConnected)?;
        link.write_all(bytes).await.map_err(Error::Write)?;
        trace!("Wrote {} bytes", bytes.len());
        Ok(())
    }

    /// Write `line` followed by the terminator.
    pub async fn write_line(&mut self, line: &str) -> Result<()> {
        let mut frame = Vec::with_capacity(line.len() + 1);
        frame.extend_from_slice(line.as_bytes());
        frame.push(LINE_TERMINATOR);
        self.write(&frame).await?;
        debug!("Sent: {}", line);
        Ok(())
    }

    /// Read one frame, trimmed of surrounding whitespace.
    ///
    /// Returns [`Error::EndOfStream`] if the link reports disconnected before a
    /// terminator arrives, or if the stream ends with nothing buffered. If the
    /// stream ends with a partial frame buffered, that partial frame is
    /// returned. Bytes after the terminator are kept for the next call.
    ///
    /// With `timeout`, gives up with [`Error::Timeout`]; buffered bytes are kept.
    /// A reply to the abandoned request may still arrive later; use
    /// [`discard_pending`](Self::discard_pending) before the next request.
    pub async fn read_line(&mut self, timeout: Option<Duration>) -> Result<String> {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, self.read_frame())
                .await
                .map_err(|_| Error::Timeout)?,
            None => self.read_frame().await,
        }
    }

    /// Drop everything received so far without waiting for more.
    ///
    /// Buffered frames, a partial frame and any bytes the link can hand over
    /// right away are all discarded. Returns the number of complete frames
    /// dropped.
    pub fn discard_pending(&mut self) -> usize {
        let mut dropped = 0;
        let mut chunk = [0u8; READ_CHUNK_SIZE];

        if let Some(link) = self.link.as_mut() {
            while let Some(Ok(read)) = link.read_chunk(&mut chunk).now_or_never() {
                if read == 0 {
                    break;
                }
                trace!("Drained {} bytes: {:02X?}", read, &chunk[..read]);
                self.buffer.extend_from_slice(&chunk[..read]);
            }
        }

        while let Some(line) = take_line(&mut self.buffer) {
            debug!("Discarded stale frame: {}", line);
            dropped += 1;
        }
        if !self.buffer.is_empty() {
            debug!("Discarded {} bytes of partial frame", self.buffer.len());
            self.buffer.clear();
        }
        dropped
    }

    async fn read_frame(&mut self) -> Result<String> {
        let link = self.link.as_mut().ok_or(Error::NotConnected)?;
        let mut chunk = [0u8; READ_CHUNK_SIZE];

        loop {
            if let Some(line) = take_line(&mut self.buffer) {
                debug!("Received: {}", line);
                return Ok(line);
            }

            if !link.is_connected() {
                debug!("Link reports disconnected, dropping partial frame");
                return Err(Error::EndOfStream);
            }

            let read = link.read_chunk(&mut chunk).await.map_err(Error::Read)?;
            if read == 0 {
                if self.buffer.is_empty() {
                    return Err(Error::EndOfStream);
                }
                let rest = self.buffer.split();
                let line = String::from_utf8_lossy(&rest).trim().to_string();
                debug!("Received unterminated frame at end of stream: {}", line);
                return Ok(line);
            }

            trace!("Read {} bytes: {:02X?}", read, &chunk[..read]);
            self.buffer.extend_from_slice(&chunk[..read]);
        }
    }

    /// Release the link. Safe to call more than once.
    ///
    /// Failures from the underlying close are logged, not returned.
    pub async fn close(&mut self) {
        if let Some(mut link) = self.link.take() {
            match link.close().await {
                Ok(()) => info!("Serial link to {} closed", self.identity.name),
                Err(e) => warn!("Error closing serial link to {}: {}", self.identity.name, e),
            }
        }
        self.buffer.clear();
    }
}

/// Split the first complete frame off `buffer`.
fn take_line(buffer: &mut BytesMut) -> Option<String> {
    let end = buffer.iter().position(|&b| b == LINE_TERMINATOR)?;
    let frame = buffer.split_to(end);
    buffer.advance(1);
    Some(String::from_utf8_lossy(&frame).trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::{radio_with_link, ReadStep, ScriptedLink};
    use crate::transport::uuids::SPP_SERVICE_UUID;
    use crate::transport::{BondedDevice, MockRadio};
    use pretty_assertions::assert_eq;

    fn identity() -> DeviceIdentity {
        DeviceIdentity {
            name: "ESP32-BT-Theiere".to_string(),
            address: "AA:BB:CC:DD:EE:FF".to_string(),
            service_uuid: SPP_SERVICE_UUID,
        }
    }

    fn scripted(steps: Vec<ReadStep>) -> (FramedTransport, crate::transport::testing::LinkTap) {
        let (link, tap) = ScriptedLink::new(steps);
        (FramedTransport::from_link(identity(), Box::new(link)), tap)
    }

    #[tokio::test]
    async fn test_discover_finds_exact_name() {
        let mut radio = MockRadio::new();
        radio.expect_is_available().returning(|| true);
        radio.expect_has_connect_permission().returning(|| true);
        radio.expect_bonded_devices().returning(|| {
            Ok(vec![
                BondedDevice::new(None, "00:00:00:00:00:01"),
                BondedDevice::new(Some("ESP32-BT-Theiere-2"), "00:00:00:00:00:02"),
                BondedDevice::new(Some("ESP32-BT-Theiere"), "00:00:00:00:00:03"),
            ])
        });

        let found = discover(&radio, "ESP32-BT-Theiere", SPP_SERVICE_UUID)
            .await
            .unwrap();
        assert_eq!(found.address, "00:00:00:00:00:03");
        assert_eq!(found.service_uuid, SPP_SERVICE_UUID);
    }

    #[tokio::test]
    async fn test_discover_not_found() {
        let mut radio = MockRadio::new();
        radio.expect_is_available().returning(|| true);
        radio.expect_has_connect_permission().returning(|| true);
        radio
            .expect_bonded_devices()
            .returning(|| Ok(vec![BondedDevice::new(Some("Headphones"), "00:00:00:00:00:01")]));

        let err = discover(&radio, "ESP32-BT-Theiere", SPP_SERVICE_UUID)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DeviceNotFound { ref name } if name == "ESP32-BT-Theiere"));
    }

    #[tokio::test]
    async fn test_discover_adapter_unavailable() {
        let mut radio = MockRadio::new();
        radio.expect_is_available().returning(|| false);
        radio.expect_bonded_devices().never();

        let err = discover(&radio, "ESP32-BT-Theiere", SPP_SERVICE_UUID)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AdapterUnavailable));
    }

    #[tokio::test]
    async fn test_discover_permission_denied() {
        let mut radio = MockRadio::new();
        radio.expect_is_available().returning(|| true);
        radio.expect_has_connect_permission().returning(|| false);
        radio.expect_bonded_devices().never();

        let err = discover(&radio, "ESP32-BT-Theiere", SPP_SERVICE_UUID)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PermissionDenied));
    }

    #[tokio::test]
    async fn test_discover_rejects_blank_name() {
        let mut radio = MockRadio::new();
        radio.expect_is_available().never();

        let err = discover(&radio, "   ", SPP_SERVICE_UUID).await.unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { .. }));
    }

    #[tokio::test]
    async fn test_open_maps_backend_errors() {
        let mut radio = MockRadio::new();
        radio.expect_has_connect_permission().returning(|| true);
        radio
            .expect_open()
            .returning(|_| Err(Error::Internal("socket refused".to_string())));

        let err = FramedTransport::open(&radio, identity()).await.err().unwrap();
        assert!(matches!(err, Error::ConnectionFailed { ref reason } if reason.contains("socket refused")));
    }

    #[tokio::test]
    async fn test_open_and_close() {
        let (link, tap) = ScriptedLink::new(vec![]);
        let radio = radio_with_link("ESP32-BT-Theiere", link);

        let mut transport = FramedTransport::open(&radio, identity()).await.unwrap();
        assert!(transport.is_open());

        transport.close().await;
        transport.close().await;
        assert!(!transport.is_open());
        assert_eq!(tap.closes(), 1);

        let err = transport.write_line("temp>80").await.unwrap_err();
        assert!(matches!(err, Error::NotConnected));
    }

    #[tokio::test]
    async fn test_write_line_appends_terminator() {
        let (mut transport, tap) = scripted(vec![]);
        transport.write_line("temp>80|motor>UP").await.unwrap();
        assert_eq!(tap.writes(), vec!["temp>80|motor>UP\n".to_string()]);
    }

    #[tokio::test]
    async fn test_write_failure_keeps_handle_open() {
        let (mut transport, tap) = scripted(vec![]);
        tap
            .fail_writes
            .store(true, std::sync::atomic::Ordering::SeqCst);

        let err = transport.write_line("temp>80").await.unwrap_err();
        assert!(matches!(err, Error::Write(_)));
        assert!(transport.is_open());
        assert_eq!(tap.closes(), 0);
    }

    #[tokio::test]
    async fn test_read_line_reassembles_partial_reads() {
        let (mut transport, _tap) = scripted(vec![
            ReadStep::Data(b"te".to_vec()),
            ReadStep::Data(b"mp>7".to_vec()),
            ReadStep::Data(b"5\r\n".to_vec()),
        ]);

        assert_eq!(transport.read_line(None).await.unwrap(), "temp>75");
    }

    #[tokio::test]
    async fn test_read_line_keeps_bytes_after_terminator() {
        let (mut transport, _tap) = scripted(vec![ReadStep::Data(b"temp>70\ntemp>71\ntem".to_vec())]);

        assert_eq!(transport.read_line(None).await.unwrap(), "temp>70");
        assert_eq!(transport.read_line(None).await.unwrap(), "temp>71");
    }

    #[tokio::test]
    async fn test_read_line_disconnect_mid_read() {
        let (mut transport, _tap) =
            scripted(vec![ReadStep::DataThenDisconnect(b"temp>7".to_vec())]);

        let err = transport.read_line(None).await.unwrap_err();
        assert!(matches!(err, Error::EndOfStream));
    }

    #[tokio::test]
    async fn test_read_line_end_of_stream() {
        let (mut transport, _tap) = scripted(vec![ReadStep::Eof]);
        assert!(matches!(
            transport.read_line(None).await.unwrap_err(),
            Error::EndOfStream
        ));

        let (mut transport, _tap) = scripted(vec![ReadStep::Data(b" temp>66 ".to_vec()), ReadStep::Eof]);
        assert_eq!(transport.read_line(None).await.unwrap(), "temp>66");
    }

    #[tokio::test]
    async fn test_read_line_error() {
        let (mut transport, _tap) = scripted(vec![ReadStep::Fail]);
        assert!(matches!(
            transport.read_line(None).await.unwrap_err(),
            Error::Read(_)
        ));
    }

    #[tokio::test]
    async fn test_read_line_timeout() {
        let (mut transport, _tap) = scripted(vec![ReadStep::Data(b"temp>".to_vec()), ReadStep::Hang]);

        let err = transport
            .read_line(Some(Duration::from_millis(20)))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout));
    }

    #[tokio::test]
    async fn test_discard_pending_drops_buffered_and_ready_bytes() {
        let (mut transport, _tap) = scripted(vec![
            ReadStep::Data(b"temp>1\ntem".to_vec()),
            ReadStep::Data(b"p>2\ntemp>".to_vec()),
        ]);
        assert_eq!(transport.read_line(None).await.unwrap(), "temp>1");

        assert_eq!(transport.discard_pending(), 1);
        assert_eq!(transport.discard_pending(), 0);
        assert!(transport.is_open());
    }

    #[test]
    fn test_take_line() {
        let mut buffer = BytesMut::from(&b"a>1\n\nb>2"[..]);
        assert_eq!(take_line(&mut buffer).as_deref(), Some("a>1"));
        assert_eq!(take_line(&mut buffer).as_deref(), Some(""));
        assert_eq!(take_line(&mut buffer), None);
        assert_eq!(&buffer[..], b"b>2");
    }
}
