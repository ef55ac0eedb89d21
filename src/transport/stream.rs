//! [`Link`] over any tokio byte stream.

use async_trait::async_trait;
use std::io::ErrorKind;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use super::Link;

/// A link backed by an `AsyncRead + AsyncWrite` stream, such as an RFCOMM
/// socket or an in-memory duplex pipe.
pub struct StreamLink<S> {
    stream: S,
    connected: bool,
}

impl<S> StreamLink<S> {
    /// Wrap an open stream.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            connected: true,
        }
    }

    /// Recover the underlying stream.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

fn is_disconnect(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::NotConnected
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof
    )
}

#[async_trait]
impl<S> Link for StreamLink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn write_all(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await
    }

    async fn read_chunk(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self.stream.read(buf).await {
            Ok(0) => {
                debug!("Stream reached end of data");
                self.connected = false;
                Ok(0)
            }
            Ok(n) => Ok(n),
            Err(e) => {
                if is_disconnect(e.kind()) {
                    self.connected = false;
                }
                Err(e)
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn close(&mut self) -> std::io::Result<()> {
        self.connected = false;
        self.stream.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::uuids::SPP_SERVICE_UUID;
    use crate::transport::{DeviceIdentity, FramedTransport};
    use crate::Error;

    fn identity() -> DeviceIdentity {
        DeviceIdentity {
            name: "ESP32-BT-Theiere".to_string(),
            address: "AA:BB:CC:DD:EE:FF".to_string(),
            service_uuid: SPP_SERVICE_UUID,
        }
    }

    #[tokio::test]
    async fn test_scripted_exchange() {
        let mock = tokio_test::io::Builder::new()
            .write(b"temp>80|motor>UP\n")
            .read(b"temp>6")
            .read(b"4\n")
            .build();

        let mut transport = FramedTransport::from_link(identity(), Box::new(StreamLink::new(mock)));
        transport.write_line("temp>80|motor>UP").await.unwrap();
        assert_eq!(transport.read_line(None).await.unwrap(), "temp>64");
    }

    #[tokio::test]
    async fn test_peer_hangup_is_end_of_stream() {
        let (client, server) = tokio::io::duplex(64);
        let mut transport =
            FramedTransport::from_link(identity(), Box::new(StreamLink::new(client)));

        drop(server);

        let err = transport.read_line(None).await.unwrap_err();
        assert!(matches!(err, Error::EndOfStream));
        assert!(!transport.is_open());
    }

    #[tokio::test]
    async fn test_duplex_roundtrip_with_peer() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut transport =
            FramedTransport::from_link(identity(), Box::new(StreamLink::new(client)));

        let peer = tokio::spawn(async move {
            let mut buf = [0u8; 64];
            let n = server.read(&mut buf).await.unwrap();
            let request = String::from_utf8_lossy(&buf[..n]).into_owned();
            server.write_all(b"temp>91|motor>DOWN\n").await.unwrap();
            request
        });

        transport.write_line("temp>95|motor>DOWN").await.unwrap();
        let reply = transport.read_line(None).await.unwrap();

        assert_eq!(peer.await.unwrap(), "temp>95|motor>DOWN\n");
        assert_eq!(reply, "temp>91|motor>DOWN");
    }
}
