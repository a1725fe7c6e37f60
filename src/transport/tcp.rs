//! TCP transport: one connection per logical stream, optionally over TLS.

use super::{ReceiveChannel, SendChannel, StreamOpener, tls};
use crate::error::TransportError;
use crate::protocol::{self, StreamMessage};
use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_rustls::TlsConnector;

/// Timeout for establishing a connection, TLS handshake included
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for writing and flushing a single message
pub const SEND_TIMEOUT: Duration = Duration::from_secs(2);

/// Byte stream a channel runs over: a plain socket or TLS on top of one
pub trait Connection: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> Connection for T {}

/// Connects to the recording server, one connection per stream
#[derive(Clone)]
pub struct TcpOpener {
    address: String,
    tls: Option<TlsConnector>,
    connect_timeout: Duration,
    send_timeout: Duration,
}

impl TcpOpener {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            tls: None,
            connect_timeout: CONNECT_TIMEOUT,
            send_timeout: SEND_TIMEOUT,
        }
    }

    /// Wrap every stream in TLS, verifying the server against `connector`'s roots
    pub fn with_tls(mut self, connector: TlsConnector) -> Self {
        self.tls = Some(connector);
        self
    }

    pub fn with_timeouts(mut self, connect: Duration, send: Duration) -> Self {
        self.connect_timeout = connect;
        self.send_timeout = send;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn connect(&self) -> Result<Box<dyn Connection>, TransportError> {
        let stream = TcpStream::connect(&self.address)
            .await
            .map_err(|e| TransportError::Connect {
                address: self.address.clone(),
                message: e.to_string(),
            })?;

        // Small frames should not wait for Nagle
        stream.set_nodelay(true)?;

        let Some(connector) = &self.tls else {
            return Ok(Box::new(stream));
        };
        let name = tls::server_name(&self.address)?;
        let stream = connector
            .connect(name, stream)
            .await
            .map_err(|e| TransportError::Connect {
                address: self.address.clone(),
                message: format!("TLS handshake failed: {}", e),
            })?;
        Ok(Box::new(stream))
    }
}

#[async_trait]
impl StreamOpener for TcpOpener {
    async fn open(&self) -> Result<Box<dyn SendChannel>, TransportError> {
        let connection = timeout(self.connect_timeout, self.connect())
            .await
            .map_err(|_| TransportError::Timeout {
                operation: "connect",
                timeout: self.connect_timeout,
            })??;

        tracing::debug!(
            "Opened {} stream to {}",
            if self.tls.is_some() { "TLS" } else { "plain" },
            self.address
        );
        Ok(Box::new(TcpSendChannel {
            writer: Some(BufWriter::new(connection)),
            send_timeout: self.send_timeout,
        }))
    }
}

/// Client side of one connection
///
/// A failed or timed out send may leave part of a frame on the wire, so the
/// connection is dropped and every later call reports `Closed`.
pub struct TcpSendChannel {
    writer: Option<BufWriter<Box<dyn Connection>>>,
    send_timeout: Duration,
}

#[async_trait]
impl SendChannel for TcpSendChannel {
    async fn send(&mut self, message: &StreamMessage) -> Result<(), TransportError> {
        let send_timeout = self.send_timeout;
        let writer = self.writer.as_mut().ok_or(TransportError::Closed)?;
        let result = match timeout(send_timeout, async {
            protocol::write_message(&mut *writer, message).await?;
            writer.flush().await?;
            Ok::<(), TransportError>(())
        })
        .await
        {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout {
                operation: "send",
                timeout: send_timeout,
            }),
        };

        if let Err(e) = &result {
            tracing::warn!("Dropping connection after failed send: {}", e);
            self.writer = None;
        }
        result
    }

    async fn close_send(&mut self) -> Result<(), TransportError> {
        let mut writer = self.writer.take().ok_or(TransportError::Closed)?;
        timeout(self.send_timeout, writer.shutdown())
            .await
            .map_err(|_| TransportError::Timeout {
                operation: "close",
                timeout: self.send_timeout,
            })??;
        Ok(())
    }
}

/// Server side of one accepted connection
pub struct TcpReceiveChannel {
    reader: BufReader<Box<dyn Connection>>,
    peer: SocketAddr,
}

impl TcpReceiveChannel {
    pub fn new(connection: impl Connection + 'static, peer: SocketAddr) -> Self {
        Self {
            reader: BufReader::new(Box::new(connection)),
            peer,
        }
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }
}

#[async_trait]
impl ReceiveChannel for TcpReceiveChannel {
    async fn receive(&mut self) -> Result<Option<StreamMessage>, TransportError> {
        protocol::read_message(&mut self.reader).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_messages_arrive_in_order_then_eof() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let receiver = tokio::spawn(async move {
            let (stream, peer) = listener.accept().await.unwrap();
            let mut channel = TcpReceiveChannel::new(stream, peer);
            let mut received = Vec::new();
            while let Some(message) = channel.receive().await.unwrap() {
                received.push(message);
            }
            received
        });

        let opener = TcpOpener::new(addr.to_string());
        let mut channel = opener.open().await.unwrap();
        let header = StreamMessage::Header {
            channel_count: 2,
            sample_rate: 8000.0,
        };
        let block = StreamMessage::SampleBlock(vec![0.1, 0.2, 0.3, 0.4]);
        channel.send(&header).await.unwrap();
        channel.send(&block).await.unwrap();
        channel.close_send().await.unwrap();

        assert_eq!(receiver.await.unwrap(), vec![header, block]);
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });

        let mut channel = TcpOpener::new(addr.to_string()).open().await.unwrap();
        channel.close_send().await.unwrap();
        let _ = accept.await.unwrap();

        let result = channel.send(&StreamMessage::SampleBlock(vec![0.0])).await;
        assert!(matches!(result, Err(TransportError::Closed)));
        assert!(matches!(channel.close_send().await, Err(TransportError::Closed)));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port nobody listens on
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let result = TcpOpener::new(addr.to_string()).open().await;
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }
    #[tokio::test]
    async fn test_timed_out_send_breaks_the_stream() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });

        let opener = TcpOpener::new(addr.to_string())
            .with_timeouts(Duration::from_secs(2), Duration::from_millis(200));
        let mut channel = opener.open().await.unwrap();
        let (stream, peer) = accept.await.unwrap();

        let header = StreamMessage::Header {
            channel_count: 1,
            sample_rate: 8000.0,
        };
        channel.send(&header).await.unwrap();

        // Nobody reads yet, so a block larger than the socket buffers stalls
        let big = StreamMessage::SampleBlock(vec![1.0; 4_000_000]);
        let result = channel.send(&big).await;
        assert!(
            matches!(result, Err(TransportError::Timeout { operation: "send", .. })),
            "{:?}",
            result
        );

        let small = StreamMessage::SampleBlock(vec![2.0; 1000]);
        assert!(matches!(channel.send(&small).await, Err(TransportError::Closed)));
        assert!(matches!(channel.close_send().await, Err(TransportError::Closed)));

        // The receiver sees the header, then the cut-off frame, and nothing after it
        let mut receiver = TcpReceiveChannel::new(stream, peer);
        assert_eq!(receiver.receive().await.unwrap(), Some(header));
        assert!(receiver.receive().await.is_err());
    }

    #[tokio::test]
    async fn test_messages_arrive_over_tls() {
        let data = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/data");
        let acceptor = tls::server_acceptor(&data.join("server.pem")).unwrap();
        let connector = tls::client_connector(&data.join("ca.pem")).unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let receiver = tokio::spawn(async move {
            let (stream, peer) = listener.accept().await.unwrap();
            let stream = acceptor.accept(stream).await.unwrap();
            let mut channel = TcpReceiveChannel::new(stream, peer);
            let mut received = Vec::new();
            while let Some(message) = channel.receive().await.unwrap() {
                received.push(message);
            }
            received
        });

        let opener = TcpOpener::new(format!("localhost:{}", addr.port())).with_tls(connector);
        let mut channel = opener.open().await.unwrap();
        let block = StreamMessage::SampleBlock(vec![0.5, -0.5]);
        channel.send(&block).await.unwrap();
        channel.close_send().await.unwrap();

        assert_eq!(receiver.await.unwrap(), vec![block]);
    }

    #[tokio::test]
    async fn test_tls_rejects_untrusted_server() {
        let data = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/data");
        let acceptor = tls::server_acceptor(&data.join("server.pem")).unwrap();
        // Signed by a CA the client does not trust
        let connector = tls::client_connector(&data.join("other-ca.pem")).unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let _ = acceptor.accept(stream).await;
        });

        let result = TcpOpener::new(format!("localhost:{}", addr.port()))
            .with_tls(connector)
            .open()
            .await;
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }
}
