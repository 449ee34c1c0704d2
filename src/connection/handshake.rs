//! Connect and identify to the hub.
//!
//! The handshake is a single write: `hub_id` as a big-endian `i64`. Nothing
//! else may reach the wire before it.

use std::future::Future;
use std::io;
use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::config::HubConfig;
use crate::constants::HANDSHAKE_LEN;
use crate::error::ConnectionError;

/// Encode `hub_id` as the handshake prefix.
pub fn encode_hub_id(hub_id: i64) -> [u8; HANDSHAKE_LEN] {
    hub_id.to_be_bytes()
}

/// Decode a handshake prefix back into a `hub_id`.
pub fn decode_hub_id(prefix: [u8; HANDSHAKE_LEN]) -> i64 {
    i64::from_be_bytes(prefix)
}

/// Connect to `config.addr()`, honoring the configured connect timeout.
pub(crate) async fn connect(config: &HubConfig) -> Result<TcpStream, ConnectionError> {
    let addr = config.addr();
    log::info!("[Hubby] client {} connecting to {addr}", config.client_id);

    let attempt = TcpStream::connect(addr.clone());
    bounded_connect(addr, config.connect_timeout(), attempt).await
}

/// Await a connect attempt, giving up after `timeout` if one is set.
async fn bounded_connect<T, F>(
    addr: String,
    timeout: Option<Duration>,
    attempt: F,
) -> Result<T, ConnectionError>
where
    F: Future<Output = io::Result<T>>,
{
    let result = match timeout {
        Some(after) => match tokio::time::timeout(after, attempt).await {
            Ok(result) => result,
            Err(_elapsed) => return Err(ConnectionError::ConnectTimeout { addr, after }),
        },
        None => attempt.await,
    };

    result.map_err(|source| ConnectionError::Connect { addr, source })
}

/// Write the handshake and wait until it is fully flushed.
pub(crate) async fn send_hub_id<W>(writer: &mut W, hub_id: i64) -> Result<(), ConnectionError>
where
    W: AsyncWrite + Unpin,
{
    writer
        .write_all(&encode_hub_id(hub_id))
        .await
        .map_err(ConnectionError::Handshake)?;
    writer.flush().await.map_err(ConnectionError::Handshake)
}
