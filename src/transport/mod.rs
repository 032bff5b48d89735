//! Transport abstraction for byte-level I/O
//!
//! Separates I/O concerns from protocol logic:
//! - **Transport**: How bytes flow (TCP to the appliance, in-memory in tests)
//! - **Codec/Protocol**: How lines and replies are interpreted (handled by the client)
//!
//! The client never touches a socket directly; it only sees the channels
//! returned by [`Transport::open`].

pub mod tcp;

pub use tcp::TcpTransport;

use bytes::Bytes;
use std::future::Future;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::Result;

/// Event delivered by a running transport
#[derive(Debug)]
pub enum TransportEvent {
    /// Bytes received from the peer (arbitrary segmentation)
    Data(Bytes),
    /// Fatal I/O error; the transport stops after reporting it
    Error(crate::error::WmpError),
}

/// Channels for bidirectional communication with a transport
///
/// The transport owns the underlying socket and communicates via these
/// channels. When the transport stops (peer close, error or shutdown), it
/// closes `rx`. Dropping `tx` asks the transport to close its write side.
pub struct TransportChannels {
    /// Receive inbound data and errors
    ///
    /// Returns `None` when the transport has stopped.
    pub rx: mpsc::Receiver<TransportEvent>,

    /// Send raw bytes to the peer
    pub tx: mpsc::Sender<Bytes>,
}

/// Trait for openable transports
///
/// A transport handles:
/// - Opening/closing the connection
/// - Reading/writing raw bytes
///
/// A transport does NOT handle:
/// - Line framing (that's the codec's job)
/// - Command correlation or keep-alive (that's the client's job)
/// - Reconnection (left to the caller)
///
/// # Lifecycle
///
/// 1. Create transport with its target
/// 2. Await `open()`; it resolves once connected or failed
/// 3. Use returned channels for communication
/// 4. Transport runs until `shutdown` is set, `tx` is dropped, or an error occurs
pub trait Transport: Send + 'static {
    /// Open the connection and start I/O in background
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    fn open(self, shutdown: Arc<AtomicBool>) -> impl Future<Output = Result<TransportChannels>> + Send;

    /// Human-readable peer description for logs
    fn describe(&self) -> String;
}
