//! Application-wide constants
//!
//! Centralized constants to avoid duplication and ensure consistency.

// =============================================================================
// Network
// =============================================================================

/// Default TCP port of the WMP appliance controller
pub const DEFAULT_WMP_PORT: u16 = 3310;

/// Device slot used for feature commands (`GET,1:...`, `SET,1:...`)
pub const DEFAULT_SLOT: u16 = 1;

/// TCP-level keepalive idle time set on the socket (seconds)
pub const TCP_KEEPALIVE_SECS: u64 = 30;

// =============================================================================
// Timing
// =============================================================================

/// Interval between protocol keep-alive pings (milliseconds)
pub const DEFAULT_KEEPALIVE_INTERVAL_MS: u64 = 30_000;

/// Maximum time to wait for the TCP connection to open (milliseconds)
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;

/// Per-command reply timeout (milliseconds, 0 = wait for reply or close)
pub const DEFAULT_COMMAND_TIMEOUT_MS: u64 = 0;

/// Silence after the last `INFO` line that completes an info reply (milliseconds)
pub const DEFAULT_INFO_IDLE_MS: u64 = 500;

/// Poll period for transport tasks checking the shutdown flag (milliseconds)
pub const SHUTDOWN_POLL_MS: u64 = 100;

// =============================================================================
// Buffers
// =============================================================================

/// Longest accepted inbound line, terminator excluded (bytes)
pub const DEFAULT_MAX_LINE_LENGTH: usize = 1024;

/// Maximum `INFO` lines aggregated into one reply
pub const DEFAULT_INFO_MAX_LINES: usize = 64;

/// TCP receive buffer size
pub const READ_BUFFER_SIZE: usize = 4096;

/// Channel capacity for async message passing
pub const CHANNEL_CAPACITY: usize = 256;

/// Notification broadcast capacity (per subscriber backlog)
pub const NOTIFICATION_CAPACITY: usize = 64;
