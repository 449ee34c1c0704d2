//! Error types for the hub connection.
//!
//! [`ConnectionError`] covers every failure the connection can hit, both the
//! ones returned synchronously from `open()` and the ones reported to the
//! [`ErrorSink`](crate::ErrorSink) after the connection is live.
//! [`SubmitError`] is returned by `submit_write` when a payload is refused.

use std::fmt;
use std::io;
use std::time::Duration;

/// Lifecycle stage at which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Opening or connecting the socket.
    Connect,
    /// Writing the `hub_id` handshake.
    Handshake,
    /// The background read loop.
    Read,
    /// The write dispatcher.
    Write,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect => write!(f, "connect"),
            Self::Handshake => write!(f, "handshake"),
            Self::Read => write!(f, "read"),
            Self::Write => write!(f, "write"),
        }
    }
}

/// Errors raised by a hub connection.
#[derive(Debug)]
pub enum ConnectionError {
    /// The configuration was rejected before dialling.
    InvalidConfig(String),
    /// The TCP connect failed.
    Connect {
        /// `host:port` that was dialled.
        addr: String,
        /// Underlying I/O error.
        source: io::Error,
    },
    /// The TCP connect did not complete in time.
    ConnectTimeout {
        /// `host:port` that was dialled.
        addr: String,
        /// Configured timeout.
        after: Duration,
    },
    /// Writing the `hub_id` handshake failed.
    Handshake(io::Error),
    /// A read failed; the read loop has stopped.
    Read(io::Error),
    /// The peer closed its side of the stream; the read loop has stopped.
    PeerClosed,
    /// A write failed; the dispatcher has stopped.
    Write {
        /// Underlying I/O error.
        source: io::Error,
        /// Queued payloads discarded because of the failure.
        dropped: usize,
    },
    /// A write did not complete in time; the dispatcher has stopped.
    WriteTimeout {
        /// Configured timeout.
        after: Duration,
        /// Queued payloads discarded because of the failure.
        dropped: usize,
    },
}

impl ConnectionError {
    /// Stage at which this error happened.
    pub fn stage(&self) -> Stage {
        match self {
            Self::InvalidConfig(_) | Self::Connect { .. } | Self::ConnectTimeout { .. } => {
                Stage::Connect
            }
            Self::Handshake(_) => Stage::Handshake,
            Self::Read(_) | Self::PeerClosed => Stage::Read,
            Self::Write { .. } | Self::WriteTimeout { .. } => Stage::Write,
        }
    }

    /// Number of queued payloads discarded by this failure (write errors only).
    pub fn dropped_writes(&self) -> usize {
        match self {
            Self::Write { dropped, .. } | Self::WriteTimeout { dropped, .. } => *dropped,
            _ => 0,
        }
    }
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(reason) => write!(f, "Invalid configuration: {reason}"),
            Self::Connect { addr, source } => write!(f, "Connect to {addr} failed: {source}"),
            Self::ConnectTimeout { addr, after } => {
                write!(f, "Connect to {addr} timed out after {after:?}")
            }
            Self::Handshake(e) => write!(f, "Handshake write failed: {e}"),
            Self::Read(e) => write!(f, "Read failed: {e}"),
            Self::PeerClosed => write!(f, "Peer closed the connection"),
            Self::Write { source, dropped } => {
                write!(f, "Write failed: {source} ({dropped} queued writes dropped)")
            }
            Self::WriteTimeout { after, dropped } => write!(
                f,
                "Write timed out after {after:?} ({dropped} queued writes dropped)"
            ),
        }
    }
}

impl std::error::Error for ConnectionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Connect { source, .. } | Self::Write { source, .. } => Some(source),
            Self::Handshake(e) | Self::Read(e) => Some(e),
            _ => None,
        }
    }
}

/// Reasons a payload can be refused by `submit_write`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitError {
    /// The connection was closed or a previous write failed.
    Closed,
    /// The write queue reached its configured limit.
    QueueFull {
        /// Configured `max_queued_writes`.
        limit: usize,
    },
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "Connection closed"),
            Self::QueueFull { limit } => write!(f, "Write queue full ({limit} pending)"),
        }
    }
}

impl std::error::Error for SubmitError {}
