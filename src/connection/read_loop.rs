//! Background read loop.
//!
//! Owns the read half and a single scratch buffer. Every completed read is
//! handed to the [`DataHandler`] as `&buf[..n]` before the next read is
//! issued into the same buffer, so a chunk never carries bytes from an
//! earlier read.
//!
//! ```text
//! Idle ──► ReadPending ──n > 0──► Delivering ──┐
//!              ▲  │                            │
//!              │  └──error / EOF──► Closed     │
//!              └───────────────────────────────┘
//! ```

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::watch;

use super::handler::{DataHandler, ErrorSink};
use crate::config::ZeroReadPolicy;
use crate::constants::ZERO_READ_BACKOFF;
use crate::error::ConnectionError;

/// Observable state of the read loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadState {
    /// Not started yet.
    Idle,
    /// A read is outstanding.
    ReadPending,
    /// A chunk is being handed to the consumer.
    Delivering,
    /// The loop has stopped and will not read again.
    Closed,
}

/// Read loop settings.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ReadLoopOptions {
    pub client_id: i64,
    pub buffer_size: usize,
    pub zero_read: ZeroReadPolicy,
}

/// Run the read loop until a read fails or (with [`ZeroReadPolicy::Stop`])
/// the peer closes the stream.
pub(crate) async fn run<R, H>(
    mut reader: R,
    mut handler: H,
    sink: Arc<dyn ErrorSink>,
    options: ReadLoopOptions,
    state: watch::Sender<ReadState>,
) where
    R: AsyncRead + Unpin,
    H: DataHandler,
{
    let client_id = options.client_id;
    let mut buf = vec![0u8; options.buffer_size];

    loop {
        state.send_replace(ReadState::ReadPending);

        match reader.read(&mut buf).await {
            Ok(0) => match options.zero_read {
                ZeroReadPolicy::Stop => {
                    log::info!("[Hubby] client {client_id}: peer closed the connection");
                    state.send_replace(ReadState::Closed);
                    sink.report(&ConnectionError::PeerClosed);
                    break;
                }
                ZeroReadPolicy::Reissue => {
                    log::debug!("[Hubby] client {client_id}: zero-byte read, reissuing");
                    tokio::time::sleep(ZERO_READ_BACKOFF).await;
                }
            },
            Ok(n) => {
                state.send_replace(ReadState::Delivering);
                let chunk = &buf[..n];
                log::debug!("[Hubby] client {client_id} received {n} bytes of data");
                log::trace!("[Hubby] data: {}", String::from_utf8_lossy(chunk));
                handler.on_data(chunk);
            }
            Err(e) => {
                log::error!("[Hubby] client {client_id}: read error: {e}");
                state.send_replace(ReadState::Closed);
                sink.report(&ConnectionError::Read(e));
                break;
            }
        }
    }
}
