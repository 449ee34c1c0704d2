//! Hubby - async TCP client for hub servers.
//!
//! Opens a persistent connection to a hub, identifies itself with an 8-byte
//! big-endian `hub_id`, then exchanges opaque bytes:
//!
//! - **Read loop** - a background task delivers every received chunk, in wire
//!   order, to a [`DataHandler`].
//! - **Write dispatcher** - `submit_write` never blocks; at most one write is
//!   on the wire at a time and the rest wait in a FIFO queue.
//! - **Error sink** - connect, handshake, read and write failures are reported
//!   to an [`ErrorSink`].
//!
//! # Modules
//!
//! - [`connection`] - connection lifecycle, handshake, read loop, dispatcher
//! - [`config`] - connection settings, file and env loading
//! - [`error`] - error types
//! - [`constants`] - buffer sizes and timing defaults
//!
//! # Example
//!
//! ```no_run
//! use hubby::{HubConfig, HubConnection, LogSink};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = HubConfig::new("127.0.0.1", 7100, 42, 1);
//! let conn = HubConnection::open(&config, |data: &[u8]| {
//!     println!("received {} bytes", data.len());
//! }, LogSink).await?;
//!
//! conn.submit_write(&b"AAA"[..])?;
//! conn.submit_write(&b"BBB"[..])?;
//! conn.close().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod constants;
pub mod error;

pub use config::{HubConfig, ZeroReadPolicy};
pub use connection::dispatcher::{
    DispatchStatus, DispatcherOptions, Submitted, WireWriter, WriteDispatcher,
};
pub use connection::handler::{DataHandler, ErrorSink, LogSink};
pub use connection::handshake::{decode_hub_id, encode_hub_id};
pub use connection::read_loop::ReadState;
pub use connection::{HubConnection, WriteHandle};
pub use error::{ConnectionError, Stage, SubmitError};
