//! Consumer and error-sink interfaces for a hub connection.

use crate::error::ConnectionError;

/// Receives inbound chunks from the read loop, in wire order.
///
/// `data` is exactly the bytes returned by one read; its length is the
/// read's byte count. The slice borrows the read loop's scratch buffer, so
/// copy out anything that must outlive the call.
pub trait DataHandler: Send + 'static {
    /// Handle one received chunk.
    fn on_data(&mut self, data: &[u8]);
}

impl<F> DataHandler for F
where
    F: FnMut(&[u8]) + Send + 'static,
{
    fn on_data(&mut self, data: &[u8]) {
        self(data);
    }
}

/// Receives failures that happen after (or while) a connection is opened.
///
/// Called for connect, handshake, read and write failures. Implementations
/// must not block; they are invoked from runtime tasks.
pub trait ErrorSink: Send + Sync + 'static {
    /// Report one failure.
    fn report(&self, error: &ConnectionError);
}

impl<F> ErrorSink for F
where
    F: Fn(&ConnectionError) + Send + Sync + 'static,
{
    fn report(&self, error: &ConnectionError) {
        self(error);
    }
}

/// Error sink that writes failures to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ErrorSink for LogSink {
    fn report(&self, error: &ConnectionError) {
        log::error!("[Hubby] {} failure: {error}", error.stage());
    }
}
