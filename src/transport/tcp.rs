//! TCP transport to the appliance controller
//!
//! Uses async tokio tasks for I/O:
//! - RX task: reads from the socket, sends chunks to channel
//! - TX task: receives from channel, writes to the socket
//!
//! Both tasks poll the shutdown flag so `close()` releases the socket
//! promptly even while idle.

use super::{Transport, TransportChannels, TransportEvent};
use crate::constants::{CHANNEL_CAPACITY, READ_BUFFER_SIZE, SHUTDOWN_POLL_MS, TCP_KEEPALIVE_SECS};
use crate::error::{Result, WmpError};
use bytes::Bytes;
use socket2::{SockRef, TcpKeepalive};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// TCP transport for a WMP device
///
/// # Example
///
/// ```ignore
/// let transport = TcpTransport::new("192.168.100.246", 3310, Duration::from_secs(5));
/// let channels = transport.open(shutdown).await?;
/// ```
pub struct TcpTransport {
    host: String,
    port: u16,
    connect_timeout: Duration,
}

impl TcpTransport {
    /// Create a new TCP transport for `host:port`
    pub fn new(host: impl Into<String>, port: u16, connect_timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            connect_timeout,
        }
    }

    fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Transport for TcpTransport {
    async fn open(self, shutdown: Arc<AtomicBool>) -> Result<TransportChannels> {
        let address = self.address();

        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(&address))
            .await
            .map_err(|_| WmpError::ConnectTimeout {
                address: address.clone(),
            })?
            .map_err(|e| WmpError::Connect {
                address: address.clone(),
                source: e,
            })?;

        configure_socket(&stream);

        let (in_tx, in_rx) = mpsc::channel::<TransportEvent>(CHANNEL_CAPACITY);
        let (out_tx, mut out_rx) = mpsc::channel::<Bytes>(CHANNEL_CAPACITY);
        let (mut reader, mut writer) = stream.into_split();
        let poll = Duration::from_millis(SHUTDOWN_POLL_MS);

        // RX task (async)
        let shutdown_rx = shutdown.clone();
        let events = in_tx.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; READ_BUFFER_SIZE];

            while !shutdown_rx.load(Ordering::Relaxed) {
                match tokio::time::timeout(poll, reader.read(&mut buf)).await {
                    Ok(Ok(0)) => {
                        debug!("Peer closed connection");
                        break;
                    }
                    Ok(Ok(n)) => {
                        let data = Bytes::copy_from_slice(&buf[..n]);
                        if events.send(TransportEvent::Data(data)).await.is_err() {
                            // Channel closed
                            break;
                        }
                    }
                    Ok(Err(e)) => {
                        let _ = events
                            .send(TransportEvent::Error(WmpError::Read { source: e }))
                            .await;
                        break;
                    }
                    Err(_) => {
                        // Timeout - allows checking shutdown flag
                    }
                }
            }
        });

        // TX task (async). Holds only a weak sender so `rx` closes as soon
        // as the RX task stops.
        let shutdown_tx = shutdown;
        let error_tx = in_tx.downgrade();
        drop(in_tx);
        tokio::spawn(async move {
            loop {
                match tokio::time::timeout(poll, out_rx.recv()).await {
                    Ok(Some(data)) => {
                        if let Err(e) = writer.write_all(&data).await {
                            warn!("Socket write failed: {}", e);
                            if let Some(events) = error_tx.upgrade() {
                                let _ = events
                                    .send(TransportEvent::Error(WmpError::Write { source: e }))
                                    .await;
                            }
                            break;
                        }
                    }
                    Ok(None) => {
                        // Sender dropped
                        break;
                    }
                    Err(_) => {
                        if shutdown_tx.load(Ordering::Relaxed) {
                            break;
                        }
                    }
                }
            }
            let _ = writer.shutdown().await;
        });

        Ok(TransportChannels {
            rx: in_rx,
            tx: out_tx,
        })
    }

    fn describe(&self) -> String {
        format!("tcp://{}", self.address())
    }
}

/// Low-latency request/reply plus OS-level dead peer detection
fn configure_socket(stream: &TcpStream) {
    let _ = stream.set_nodelay(true);

    let keepalive = TcpKeepalive::new().with_time(Duration::from_secs(TCP_KEEPALIVE_SECS));
    if let Err(e) = SockRef::from(stream).set_tcp_keepalive(&keepalive) {
        debug!("TCP keepalive not set: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_tcp_transport_new() {
        let transport = TcpTransport::new("10.0.0.5", 3310, Duration::from_secs(1));
        assert_eq!(transport.address(), "10.0.0.5:3310");
        assert_eq!(transport.describe(), "tcp://10.0.0.5:3310");
    }

    #[tokio::test]
    async fn test_tcp_transport_roundtrip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let peer = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 16];
            let n = socket.read(&mut buf).await.unwrap();
            assert_eq!(&buf[..n], b"ID\n");
            socket.write_all(b"ACK\r\n").await.unwrap();
        });

        let shutdown = Arc::new(AtomicBool::new(false));
        let transport = TcpTransport::new("127.0.0.1", port, Duration::from_secs(1));
        let mut channels = transport.open(shutdown.clone()).await.unwrap();

        channels.tx.send(Bytes::from_static(b"ID\n")).await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(1), channels.rx.recv())
            .await
            .expect("timeout")
            .expect("channel closed");
        match event {
            TransportEvent::Data(data) => assert_eq!(data.as_ref(), b"ACK\r\n"),
            other => panic!("Expected data, got {:?}", other),
        }

        peer.await.unwrap();

        // Peer closed its side: channel closes
        let end = tokio::time::timeout(Duration::from_secs(1), channels.rx.recv())
            .await
            .expect("timeout");
        assert!(end.is_none());
        shutdown.store(true, Ordering::SeqCst);
    }

    #[tokio::test]
    async fn test_tcp_transport_connect_refused() {
        // Bind then drop to get a port with nothing listening
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let shutdown = Arc::new(AtomicBool::new(false));
        let transport = TcpTransport::new("127.0.0.1", port, Duration::from_secs(1));
        let result = transport.open(shutdown).await;
        assert!(matches!(result, Err(WmpError::Connect { .. })));
    }
}
