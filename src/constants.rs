//! Application-wide constants for hubby.
//!
//! Centralizes buffer sizes, wire constants and timing defaults so the
//! connection, config and CLI layers agree on them.

use std::time::Duration;

// ============================================================================
// Wire
// ============================================================================

/// Size of the handshake prefix: `hub_id` as a big-endian `i64`.
pub const HANDSHAKE_LEN: usize = std::mem::size_of::<i64>();

/// Default capacity of the inbound scratch buffer.
///
/// Each read fills at most this many bytes before the chunk is handed to
/// the consumer.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 4096;

// ============================================================================
// Timeouts
// ============================================================================

/// Default connect timeout in seconds.
///
/// Bounds how long [`HubConnection::open`](crate::HubConnection::open) waits
/// for the TCP connect to complete.
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Delay before reissuing a read after a zero-byte completion.
///
/// Only used with [`ZeroReadPolicy::Reissue`](crate::ZeroReadPolicy::Reissue).
/// A closed TCP stream completes every read with zero bytes immediately, so
/// reissuing without a pause would spin the executor.
pub const ZERO_READ_BACKOFF: Duration = Duration::from_millis(50);

// ============================================================================
// Configuration
// ============================================================================

/// Directory name under the platform config dir.
pub const CONFIG_DIR_NAME: &str = "hubby";

/// Config file name inside [`CONFIG_DIR_NAME`].
pub const CONFIG_FILE_NAME: &str = "config.json";

/// Default hub host.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default hub port.
pub const DEFAULT_PORT: u16 = 7100;
