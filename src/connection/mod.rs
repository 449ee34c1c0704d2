//! Persistent TCP connection to a hub.
//!
//! # Lifecycle
//!
//! ```text
//! HubConnection::open(config, on_data, sink)
//!     │
//!     ├── TcpStream::connect(host:port)        ─fail─► ConnectionError::Connect
//!     ├── write hub_id (8 bytes, big-endian)   ─fail─► ConnectionError::Handshake
//!     ├── split stream
//!     │     ├── read half  ──► read loop task ──► DataHandler::on_data
//!     │     └── write half ──► WriteDispatcher
//!     ▼
//! live: submit_write(bytes) from any thread, any number of times
//!     │
//!     ▼
//! close() / drop ──► read loop aborted, queue discarded, write half shut down
//! ```
//!
//! There is no reconnect: once the read loop or the dispatcher stops, the
//! owner decides whether to open a new connection.

// Rust guideline compliant 2026-02

pub mod dispatcher;
pub mod handler;
pub mod handshake;
pub mod read_loop;

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::HubConfig;
use crate::error::{ConnectionError, SubmitError};
use dispatcher::{DispatchStatus, DispatcherOptions, Submitted, WriteDispatcher};
use handler::{DataHandler, ErrorSink};
use read_loop::{ReadLoopOptions, ReadState};

/// Cloneable handle for submitting writes to a live connection.
pub type WriteHandle = WriteDispatcher<OwnedWriteHalf>;

/// A live connection to a hub.
///
/// Created by [`HubConnection::open`]. Dropping it aborts the read loop and
/// closes the write side (see [`HubConnection::close`] for the awaited form).
pub struct HubConnection {
    hub_id: i64,
    client_id: i64,
    peer_addr: SocketAddr,
    writer: WriteHandle,
    read_task: JoinHandle<()>,
    read_state: watch::Receiver<ReadState>,
}

impl std::fmt::Debug for HubConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubConnection")
            .field("hub_id", &self.hub_id)
            .field("client_id", &self.client_id)
            .field("peer_addr", &self.peer_addr)
            .field("read_state", &self.read_state())
            .field("write_status", &self.writer.status())
            .finish_non_exhaustive()
    }
}

impl HubConnection {
    /// Connect to the hub, send the handshake, and start the read loop.
    ///
    /// The configuration is validated first (see [`HubConfig::validate`]).
    /// Resolves only after the connect and the handshake write have both
    /// completed. On failure no connection exists; the error is returned and
    /// also reported to `sink`.
    pub async fn open<H, S>(
        config: &HubConfig,
        on_data: H,
        sink: S,
    ) -> Result<Self, ConnectionError>
    where
        H: DataHandler,
        S: ErrorSink,
    {
        let sink: Arc<dyn ErrorSink> = Arc::new(sink);
        match Self::establish(config, on_data, Arc::clone(&sink)).await {
            Ok(conn) => Ok(conn),
            Err(e) => {
                log::error!("[Hubby] client {}: {e}", config.client_id);
                sink.report(&e);
                Err(e)
            }
        }
    }

    async fn establish<H: DataHandler>(
        config: &HubConfig,
        on_data: H,
        sink: Arc<dyn ErrorSink>,
    ) -> Result<Self, ConnectionError> {
        config
            .validate()
            .map_err(|e| ConnectionError::InvalidConfig(e.to_string()))?;

        let mut stream = handshake::connect(config).await?;
        let peer_addr = stream.peer_addr().map_err(|source| ConnectionError::Connect {
            addr: config.addr(),
            source,
        })?;

        handshake::send_hub_id(&mut stream, config.hub_id).await?;
        log::info!(
            "[Hubby] client {} connected to {peer_addr} (hub {})",
            config.client_id,
            config.hub_id
        );

        let (read_half, write_half) = stream.into_split();

        let (state_tx, read_state) = watch::channel(ReadState::Idle);
        let read_task = tokio::spawn(read_loop::run(
            read_half,
            on_data,
            Arc::clone(&sink),
            ReadLoopOptions {
                client_id: config.client_id,
                buffer_size: config.read_buffer_size,
                zero_read: config.zero_read,
            },
            state_tx,
        ));

        let writer = WriteDispatcher::with_runtime(
            write_half,
            DispatcherOptions {
                client_id: config.client_id,
                max_queued: config.max_queued_writes,
                write_timeout: config.write_timeout(),
            },
            sink,
            Handle::current(),
        );

        Ok(Self {
            hub_id: config.hub_id,
            client_id: config.client_id,
            peer_addr,
            writer,
            read_task,
            read_state,
        })
    }

    /// Submit bytes for writing. Returns immediately; the bytes reach the
    /// wire after everything accepted before them.
    pub fn submit_write(&self, payload: impl Into<Bytes>) -> Result<Submitted, SubmitError> {
        self.writer.submit(payload)
    }

    /// A cloneable handle for submitting from other tasks or threads.
    pub fn write_handle(&self) -> WriteHandle {
        self.writer.clone()
    }

    /// Identifier sent during the handshake.
    pub fn hub_id(&self) -> i64 {
        self.hub_id
    }

    /// Local client identity.
    pub fn client_id(&self) -> i64 {
        self.client_id
    }

    /// Address of the hub.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Current read loop state.
    pub fn read_state(&self) -> ReadState {
        if self.read_task.is_finished() {
            ReadState::Closed
        } else {
            *self.read_state.borrow()
        }
    }

    /// Whether the read loop is still running.
    pub fn is_reading(&self) -> bool {
        self.read_state() != ReadState::Closed
    }

    /// Current write slot status.
    pub fn write_status(&self) -> DispatchStatus {
        self.writer.status()
    }

    /// Number of writes waiting behind the in-flight one.
    pub fn pending_writes(&self) -> usize {
        self.writer.pending()
    }

    /// Resolves once the read loop has stopped.
    pub async fn read_closed(&self) {
        let mut state = self.read_state.clone();
        // A dropped sender means the task is gone.
        let _ = state.wait_for(|s| *s == ReadState::Closed).await;
    }

    /// Close the connection.
    ///
    /// Stops the read loop, rejects further submissions, discards queued
    /// writes, waits for the in-flight write to finish, and shuts the write
    /// half down. Returns the number of discarded queued writes.
    pub async fn close(self) -> usize {
        self.read_task.abort();
        let dropped = self.writer.close().await;
        log::info!(
            "[Hubby] client {} closed connection to {} ({dropped} queued writes discarded)",
            self.client_id,
            self.peer_addr
        );
        dropped
    }
}

impl Drop for HubConnection {
    fn drop(&mut self) {
        self.read_task.abort();
        self.writer.close_now();
    }
}
