//! Centralized error types for the client
//!
//! All client errors are represented by the `WmpError` enum.
//! Use `Result<T>` as shorthand for `std::result::Result<T, WmpError>`.

use std::fmt;
use std::path::PathBuf;

/// All client errors
#[derive(Debug)]
pub enum WmpError {
    // === Transport ===
    /// Failed to open the TCP connection
    Connect {
        address: String,
        source: std::io::Error,
    },
    /// TCP connection did not open in time
    ConnectTimeout { address: String },
    /// Failed to write to the socket
    Write { source: std::io::Error },
    /// Failed to read from the socket
    Read { source: std::io::Error },

    // === Connection ===
    /// Command issued while the connection is not open
    NotConnected,
    /// Connection closed while the command was pending
    ConnectionClosed,

    // === Protocol ===
    /// Peer replied `ERR` to a command
    CommandRejected { command: String },
    /// No reply arrived within the configured command timeout
    CommandTimeout { command: String },
    /// Reply kind does not fit the command that was sent
    UnexpectedReply { command: String, reply: String },
    /// Inbound line exceeded the maximum line length
    FrameTooLong { len: usize, max: usize },
    /// Outgoing command cannot be put on the wire
    InvalidCommandText { reason: String },
    /// Malformed inbound line
    Parse { line: String, reason: String },

    // === Values ===
    /// Wire value of a scaled feature is not an integer
    ValueDecode { feature: String, value: String },
    /// Application value cannot be encoded for the wire
    ValueEncode { feature: String, reason: String },

    // === Config ===
    /// Config file could not be read
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Config file could not be written
    ConfigWrite {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Invalid config value
    ConfigValidation { field: &'static str, reason: String },

    // === Runtime ===
    /// Tokio runtime creation failed
    Runtime { source: std::io::Error },
}

impl WmpError {
    /// True for errors that mean the connection is gone
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            Self::NotConnected | Self::ConnectionClosed | Self::Write { .. } | Self::Read { .. }
        )
    }
}

impl std::error::Error for WmpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Connect { source, .. }
            | Self::Write { source }
            | Self::Read { source }
            | Self::ConfigRead { source, .. }
            | Self::ConfigWrite { source, .. }
            | Self::Runtime { source } => Some(source),
            _ => None,
        }
    }
}

impl fmt::Display for WmpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect { address, source } => {
                write!(f, "Cannot connect to {}: {}", address, source)
            }
            Self::ConnectTimeout { address } => write!(f, "Timed out connecting to {}", address),
            Self::Write { source } => write!(f, "Socket write failed: {}", source),
            Self::Read { source } => write!(f, "Socket read failed: {}", source),
            Self::NotConnected => write!(f, "Not connected"),
            Self::ConnectionClosed => write!(f, "Connection closed"),
            Self::CommandRejected { command } => write!(f, "Device rejected {}", command),
            Self::CommandTimeout { command } => write!(f, "No reply to {}", command),
            Self::UnexpectedReply { command, reply } => {
                write!(f, "Unexpected reply to {}: {}", command, reply)
            }
            Self::FrameTooLong { len, max } => {
                write!(f, "Line too long ({} bytes, max {})", len, max)
            }
            Self::InvalidCommandText { reason } => write!(f, "Invalid command: {}", reason),
            Self::Parse { line, reason } => write!(f, "Cannot parse {:?}: {}", line, reason),
            Self::ValueDecode { feature, value } => {
                write!(f, "Invalid value for {}: {:?}", feature, value)
            }
            Self::ValueEncode { feature, reason } => {
                write!(f, "Cannot encode {}: {}", feature, reason)
            }
            Self::ConfigRead { path, .. } => write!(f, "Config read error: {}", path.display()),
            Self::ConfigWrite { path, .. } => {
                write!(f, "Config write error: {}", path.display())
            }
            Self::ConfigValidation { field, reason } => {
                write!(f, "Invalid {}: {}", field, reason)
            }
            Self::Runtime { .. } => write!(f, "Failed to create runtime"),
        }
    }
}

/// Alias for Result with WmpError
pub type Result<T> = std::result::Result<T, WmpError>;
