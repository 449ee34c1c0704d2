//! Write dispatcher: ordered, single-flight writes.
//!
//! The transport forbids overlapping writes on one stream, so the dispatcher
//! owns the writer and lends it to exactly one drain task at a time. Holding
//! the writer *is* the in-flight slot:
//!
//! ```text
//! submit(p) ──slot free──► take writer, spawn drain(p)       (Immediate)
//!           └─slot held──► queue.push_back(p)                 (Queued)
//!
//! drain: write ─ok─► queue.pop_front() ─Some─► write ...
//!                                     └None──► park writer (slot free)
//!              └err─► drop queue, report, Failed
//! ```
//!
//! # Ordering
//!
//! A payload is *accepted* when its submitter takes the state lock. The queue
//! is only non-empty while the slot is held, so payloads reach the wire in
//! acceptance order. Two submissions from one caller are accepted in call
//! order. Submissions racing from different threads are accepted in lock
//! acquisition order, which is not otherwise defined.
//!
//! # Failure
//!
//! A failed or timed-out write stops the dispatcher: queued payloads are
//! discarded, the failure (with the discarded count) goes to the error sink,
//! and later submissions get [`SubmitError::Closed`].

// Rust guideline compliant 2026-02

use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::runtime::{Handle, TryCurrentError};
use tokio::task::JoinHandle;

use super::handler::ErrorSink;
use crate::error::{ConnectionError, SubmitError};

/// Write side of the transport.
///
/// `write_payload` must write the whole payload or fail.
#[async_trait]
pub trait WireWriter: Send + 'static {
    /// Write `data` in full.
    async fn write_payload(&mut self, data: &[u8]) -> io::Result<()>;

    /// Close the write direction.
    async fn shutdown(&mut self) -> io::Result<()>;
}

#[async_trait]
impl WireWriter for OwnedWriteHalf {
    async fn write_payload(&mut self, data: &[u8]) -> io::Result<()> {
        self.write_all(data).await?;
        self.flush().await
    }

    async fn shutdown(&mut self) -> io::Result<()> {
        AsyncWriteExt::shutdown(self).await
    }
}

/// How a submission was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submitted {
    /// The slot was free; the write was issued right away.
    Immediate,
    /// A write was in flight; the payload was queued behind it.
    Queued {
        /// 1-based position in the queue at acceptance.
        position: usize,
    },
}

/// Snapshot of the dispatcher's slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStatus {
    /// No write in flight.
    Idle,
    /// One write in flight.
    InFlight,
    /// Closed by the owner.
    Closed,
    /// Stopped by a write failure.
    Failed,
}

/// Dispatcher tuning.
#[derive(Debug, Clone, Copy, Default)]
pub struct DispatcherOptions {
    /// Client identity used in log lines.
    pub client_id: i64,
    /// Maximum queued payloads. `None` is unbounded.
    pub max_queued: Option<usize>,
    /// Per-write timeout. `None` waits forever.
    pub write_timeout: Option<Duration>,
}

enum SlotState<W> {
    /// Writer parked; slot free.
    Idle(W),
    /// A drain task owns the writer.
    InFlight,
    /// Close requested while a write was in flight.
    Closing,
    Closed,
    Failed,
}

struct DispatchInner<W> {
    slot: SlotState<W>,
    queue: VecDeque<Bytes>,
    drain: Option<JoinHandle<()>>,
}

struct Shared<W> {
    inner: Mutex<DispatchInner<W>>,
    runtime: Handle,
    sink: Arc<dyn ErrorSink>,
    options: DispatcherOptions,
}

/// Outcome of a successful write, decided under the lock.
enum AfterWrite<W> {
    Next(W, Bytes),
    Parked,
    Shutdown(W),
}

enum WriteFailure {
    Io(io::Error),
    Timeout(Duration),
}

impl<W: WireWriter> Shared<W> {
    fn lock(&self) -> MutexGuard<'_, DispatchInner<W>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn after_write(&self, writer: W) -> AfterWrite<W> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        match inner.slot {
            SlotState::InFlight => match inner.queue.pop_front() {
                Some(next) => AfterWrite::Next(writer, next),
                None => {
                    inner.slot = SlotState::Idle(writer);
                    AfterWrite::Parked
                }
            },
            SlotState::Closing => {
                inner.slot = SlotState::Closed;
                AfterWrite::Shutdown(writer)
            }
            // Only the drain task moves the slot out of InFlight/Closing.
            SlotState::Idle(_) | SlotState::Closed | SlotState::Failed => {
                AfterWrite::Shutdown(writer)
            }
        }
    }

    /// Mark the dispatcher failed and discard the queue. Returns the discarded count.
    fn fail(&self) -> usize {
        let mut guard = self.lock();
        let inner = &mut *guard;
        inner.slot = match inner.slot {
            SlotState::Closing | SlotState::Closed => SlotState::Closed,
            _ => SlotState::Failed,
        };
        let dropped = inner.queue.len();
        inner.queue.clear();
        dropped
    }

    async fn write_one(&self, writer: &mut W, payload: &[u8]) -> Result<(), WriteFailure> {
        match self.options.write_timeout {
            Some(after) => match tokio::time::timeout(after, writer.write_payload(payload)).await {
                Ok(result) => result.map_err(WriteFailure::Io),
                Err(_elapsed) => Err(WriteFailure::Timeout(after)),
            },
            None => writer.write_payload(payload).await.map_err(WriteFailure::Io),
        }
    }
}

/// Drain task: writes `first`, then keeps draining the queue until it is empty.
async fn drain<W: WireWriter>(shared: Arc<Shared<W>>, mut writer: W, first: Bytes) {
    let client_id = shared.options.client_id;
    let mut payload = first;

    loop {
        if let Err(failure) = shared.write_one(&mut writer, &payload).await {
            let dropped = shared.fail();
            let error = match failure {
                WriteFailure::Io(source) => ConnectionError::Write { source, dropped },
                WriteFailure::Timeout(after) => ConnectionError::WriteTimeout { after, dropped },
            };
            log::error!("[Hubby] client {client_id}: {error}");
            shared.sink.report(&error);
            return;
        }
        log::debug!("[Hubby] client {client_id} sent {} bytes of data", payload.len());

        match shared.after_write(writer) {
            AfterWrite::Next(w, next) => {
                log::debug!("[Hubby] client {client_id}: continuing down write queue");
                writer = w;
                payload = next;
            }
            AfterWrite::Parked => return,
            AfterWrite::Shutdown(mut w) => {
                if let Err(e) = w.shutdown().await {
                    log::debug!("[Hubby] client {client_id}: shutdown after close failed: {e}");
                }
                return;
            }
        }
    }
}

/// Serializes writes onto a single writer.
///
/// Cloning yields another handle to the same dispatcher; any clone may
/// submit from any thread.
pub struct WriteDispatcher<W: WireWriter> {
    shared: Arc<Shared<W>>,
}

impl<W: WireWriter> Clone for WriteDispatcher<W> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<W: WireWriter> std::fmt::Debug for WriteDispatcher<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteDispatcher")
            .field("client_id", &self.shared.options.client_id)
            .field("status", &self.status())
            .field("pending", &self.pending())
            .finish_non_exhaustive()
    }
}

impl<W: WireWriter> WriteDispatcher<W> {
    /// Create a dispatcher owning `writer`, spawning drain tasks on the
    /// current Tokio runtime.
    ///
    /// Fails when called outside a runtime. Once created, `submit` may be
    /// called from any thread.
    pub fn new(
        writer: W,
        options: DispatcherOptions,
        sink: Arc<dyn ErrorSink>,
    ) -> Result<Self, TryCurrentError> {
        let runtime = Handle::try_current()?;
        Ok(Self::with_runtime(writer, options, sink, runtime))
    }

    /// Create a dispatcher owning `writer` that spawns drain tasks on `runtime`.
    pub fn with_runtime(
        writer: W,
        options: DispatcherOptions,
        sink: Arc<dyn ErrorSink>,
        runtime: Handle,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(DispatchInner {
                    slot: SlotState::Idle(writer),
                    queue: VecDeque::new(),
                    drain: None,
                }),
                runtime,
                sink,
                options,
            }),
        }
    }

    /// Submit a payload. Never waits for I/O.
    ///
    /// Empty payloads are accepted and written as no-ops, keeping their place
    /// in the order.
    pub fn submit(&self, payload: impl Into<Bytes>) -> Result<Submitted, SubmitError> {
        let payload = payload.into();
        let client_id = self.shared.options.client_id;
        let mut guard = self.shared.lock();
        let inner = &mut *guard;

        match std::mem::replace(&mut inner.slot, SlotState::InFlight) {
            SlotState::Idle(writer) => {
                let shared = Arc::clone(&self.shared);
                inner.drain = Some(self.shared.runtime.spawn(drain(shared, writer, payload)));
                log::debug!("[Hubby] client {client_id}: write submitted to channel");
                Ok(Submitted::Immediate)
            }
            SlotState::InFlight => {
                if let Some(limit) = self.shared.options.max_queued {
                    if inner.queue.len() >= limit {
                        log::warn!("[Hubby] client {client_id}: write queue full ({limit})");
                        return Err(SubmitError::QueueFull { limit });
                    }
                }
                inner.queue.push_back(payload);
                log::debug!("[Hubby] client {client_id}: queueing incoming write");
                Ok(Submitted::Queued {
                    position: inner.queue.len(),
                })
            }
            other => {
                inner.slot = other;
                Err(SubmitError::Closed)
            }
        }
    }

    /// Current slot status.
    pub fn status(&self) -> DispatchStatus {
        match self.shared.lock().slot {
            SlotState::Idle(_) => DispatchStatus::Idle,
            SlotState::InFlight | SlotState::Closing => DispatchStatus::InFlight,
            SlotState::Closed => DispatchStatus::Closed,
            SlotState::Failed => DispatchStatus::Failed,
        }
    }

    /// Number of payloads waiting behind the in-flight write.
    pub fn pending(&self) -> usize {
        self.shared.lock().queue.len()
    }

    /// Stop accepting writes and discard the queue, without waiting.
    ///
    /// An idle writer is dropped; an in-flight write finishes and its drain
    /// task shuts the writer down. Returns the number of discarded payloads.
    pub fn close_now(&self) -> usize {
        let (dropped, _writer, _drain) = self.begin_close();
        dropped
    }

    /// Stop accepting writes, discard the queue, and wait for the in-flight
    /// write (if any) to finish and the writer to shut down.
    ///
    /// Returns the number of discarded payloads.
    pub async fn close(&self) -> usize {
        let client_id = self.shared.options.client_id;
        let (dropped, writer, drain) = self.begin_close();

        if let Some(mut writer) = writer {
            if let Err(e) = writer.shutdown().await {
                log::debug!("[Hubby] client {client_id}: shutdown failed: {e}");
            }
        }
        if let Some(drain) = drain {
            if let Err(e) = drain.await {
                log::warn!("[Hubby] client {client_id}: drain task ended abnormally: {e}");
            }
        }
        dropped
    }

    fn begin_close(&self) -> (usize, Option<W>, Option<JoinHandle<()>>) {
        let mut guard = self.shared.lock();
        let inner = &mut *guard;
        let (next, writer) = match std::mem::replace(&mut inner.slot, SlotState::Closed) {
            SlotState::Idle(writer) => (SlotState::Closed, Some(writer)),
            SlotState::InFlight | SlotState::Closing => (SlotState::Closing, None),
            SlotState::Closed => (SlotState::Closed, None),
            SlotState::Failed => (SlotState::Failed, None),
        };
        inner.slot = next;

        let dropped = inner.queue.len();
        inner.queue.clear();
        if dropped > 0 {
            log::info!(
                "[Hubby] client {}: discarding {dropped} queued writes on close",
                self.shared.options.client_id
            );
        }
        (dropped, writer, inner.drain.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Stage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    /// Writer whose completions are released by the test.
    struct GatedWriter {
        started: mpsc::UnboundedSender<Vec<u8>>,
        gate: mpsc::UnboundedReceiver<io::Result<()>>,
        written: Arc<Mutex<Vec<u8>>>,
        shutdowns: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl WireWriter for GatedWriter {
        async fn write_payload(&mut self, data: &[u8]) -> io::Result<()> {
            let _ = self.started.send(data.to_vec());
            match self.gate.recv().await {
                Some(Ok(())) => {
                    self.written.lock().unwrap().extend_from_slice(data);
                    Ok(())
                }
                Some(Err(e)) => Err(e),
                None => Err(io::Error::new(io::ErrorKind::BrokenPipe, "gate closed")),
            }
        }

        async fn shutdown(&mut self) -> io::Result<()> {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Harness {
        dispatcher: WriteDispatcher<GatedWriter>,
        started: mpsc::UnboundedReceiver<Vec<u8>>,
        gate: mpsc::UnboundedSender<io::Result<()>>,
        written: Arc<Mutex<Vec<u8>>>,
        shutdowns: Arc<AtomicUsize>,
        errors: mpsc::UnboundedReceiver<(Stage, usize)>,
    }

    impl Harness {
        fn new(options: DispatcherOptions) -> Self {
            let (started_tx, started) = mpsc::unbounded_channel();
            let (gate, gate_rx) = mpsc::unbounded_channel();
            let (err_tx, errors) = mpsc::unbounded_channel();
            let written = Arc::new(Mutex::new(Vec::new()));
            let shutdowns = Arc::new(AtomicUsize::new(0));

            let writer = GatedWriter {
                started: started_tx,
                gate: gate_rx,
                written: Arc::clone(&written),
                shutdowns: Arc::clone(&shutdowns),
            };
            let sink: Arc<dyn ErrorSink> = Arc::new(move |e: &ConnectionError| {
                let _ = err_tx.send((e.stage(), e.dropped_writes()));
            });

            Self {
                dispatcher: WriteDispatcher::new(writer, options, sink).expect("inside runtime"),
                started,
                gate,
                written,
                shutdowns,
                errors,
            }
        }

        async fn next_started(&mut self) -> Vec<u8> {
            tokio::time::timeout(Duration::from_secs(2), self.started.recv())
                .await
                .expect("Timed out waiting for write to start")
                .expect("Writer dropped")
        }

        async fn wait_status(&self, status: DispatchStatus) {
            tokio::time::timeout(Duration::from_secs(2), async {
                while self.dispatcher.status() != status {
                    tokio::task::yield_now().await;
                }
            })
            .await
            .unwrap_or_else(|_| panic!("Timed out waiting for {status:?}"));
        }
    }

    #[tokio::test]
    async fn test_second_write_queued_until_first_completes() {
        let mut h = Harness::new(DispatcherOptions::default());

        assert_eq!(h.dispatcher.submit(&b"first"[..]).unwrap(), Submitted::Immediate);
        assert_eq!(h.next_started().await, b"first");

        assert_eq!(
            h.dispatcher.submit(&b"second"[..]).unwrap(),
            Submitted::Queued { position: 1 }
        );
        assert_eq!(h.dispatcher.status(), DispatchStatus::InFlight);
        assert_eq!(h.dispatcher.pending(), 1);

        // Nothing else may start while the first write is outstanding.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(h.started.try_recv().is_err());

        h.gate.send(Ok(())).unwrap();
        assert_eq!(h.next_started().await, b"second");
        assert_eq!(h.dispatcher.pending(), 0);

        h.gate.send(Ok(())).unwrap();
        h.wait_status(DispatchStatus::Idle).await;
        assert_eq!(&*h.written.lock().unwrap(), b"firstsecond");
    }

    #[tokio::test]
    async fn test_queue_drains_in_fifo_order() {
        let mut h = Harness::new(DispatcherOptions::default());

        h.dispatcher.submit(&b"AAA"[..]).unwrap();
        h.dispatcher.submit(&b"BBB"[..]).unwrap();
        h.dispatcher.submit(&b"CCC"[..]).unwrap();
        assert_eq!(
            h.dispatcher.submit(&b"DDD"[..]).unwrap(),
            Submitted::Queued { position: 3 }
        );

        for expected in [&b"AAA"[..], &b"BBB"[..], &b"CCC"[..], &b"DDD"[..]] {
            assert_eq!(h.next_started().await, expected);
            h.gate.send(Ok(())).unwrap();
        }

        h.wait_status(DispatchStatus::Idle).await;
        assert_eq!(&*h.written.lock().unwrap(), b"AAABBBCCCDDD");
    }

    #[tokio::test]
    async fn test_slot_reused_after_idle() {
        let mut h = Harness::new(DispatcherOptions::default());

        h.dispatcher.submit(&b"one"[..]).unwrap();
        h.next_started().await;
        h.gate.send(Ok(())).unwrap();
        h.wait_status(DispatchStatus::Idle).await;

        assert_eq!(h.dispatcher.submit(&b"two"[..]).unwrap(), Submitted::Immediate);
        assert_eq!(h.next_started().await, b"two");
        h.gate.send(Ok(())).unwrap();
        h.wait_status(DispatchStatus::Idle).await;
        assert_eq!(&*h.written.lock().unwrap(), b"onetwo");
    }

    #[tokio::test]
    async fn test_write_failure_drops_queue_and_reports() {
        let mut h = Harness::new(DispatcherOptions::default());

        h.dispatcher.submit(&b"A"[..]).unwrap();
        h.next_started().await;
        h.dispatcher.submit(&b"B"[..]).unwrap();
        h.dispatcher.submit(&b"C"[..]).unwrap();

        h.gate
            .send(Err(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe")))
            .unwrap();

        let (stage, dropped) = tokio::time::timeout(Duration::from_secs(2), h.errors.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stage, Stage::Write);
        assert_eq!(dropped, 2);
        assert_eq!(h.dispatcher.status(), DispatchStatus::Failed);
        assert_eq!(h.dispatcher.pending(), 0);
        assert_eq!(h.dispatcher.submit(&b"D"[..]), Err(SubmitError::Closed));
        assert!(h.written.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_write_timeout_is_reported() {
        let mut h = Harness::new(DispatcherOptions {
            write_timeout: Some(Duration::from_millis(20)),
            ..DispatcherOptions::default()
        });

        h.dispatcher.submit(&b"stalled"[..]).unwrap();
        h.next_started().await;
        h.dispatcher.submit(&b"behind"[..]).unwrap();

        let (stage, dropped) = tokio::time::timeout(Duration::from_secs(2), h.errors.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stage, Stage::Write);
        assert_eq!(dropped, 1);
        assert_eq!(h.dispatcher.status(), DispatchStatus::Failed);
    }

    #[tokio::test]
    async fn test_queue_limit_rejects_excess() {
        let mut h = Harness::new(DispatcherOptions {
            max_queued: Some(2),
            ..DispatcherOptions::default()
        });

        h.dispatcher.submit(&b"1"[..]).unwrap();
        h.next_started().await;
        h.dispatcher.submit(&b"2"[..]).unwrap();
        h.dispatcher.submit(&b"3"[..]).unwrap();
        assert_eq!(
            h.dispatcher.submit(&b"4"[..]),
            Err(SubmitError::QueueFull { limit: 2 })
        );

        // A rejection leaves the slot held and the queue intact.
        assert_eq!(h.dispatcher.status(), DispatchStatus::InFlight);
        assert_eq!(h.dispatcher.pending(), 2);

        for _ in 0..3 {
            h.gate.send(Ok(())).unwrap();
        }
        h.wait_status(DispatchStatus::Idle).await;
        assert_eq!(&*h.written.lock().unwrap(), b"123");
    }

    #[tokio::test]
    async fn test_close_while_idle_shuts_writer_down() {
        let h = Harness::new(DispatcherOptions::default());

        assert_eq!(h.dispatcher.close().await, 0);
        assert_eq!(h.dispatcher.status(), DispatchStatus::Closed);
        assert_eq!(h.shutdowns.load(Ordering::SeqCst), 1);
        assert_eq!(h.dispatcher.submit(&b"late"[..]), Err(SubmitError::Closed));
    }

    #[tokio::test]
    async fn test_close_while_in_flight_waits_and_discards_queue() {
        let mut h = Harness::new(DispatcherOptions::default());

        h.dispatcher.submit(&b"inflight"[..]).unwrap();
        h.next_started().await;
        h.dispatcher.submit(&b"queued1"[..]).unwrap();
        h.dispatcher.submit(&b"queued2"[..]).unwrap();

        let dispatcher = h.dispatcher.clone();
        let closer = tokio::spawn(async move { dispatcher.close().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!closer.is_finished(), "close must wait for the in-flight write");
        assert_eq!(h.dispatcher.submit(&b"late"[..]), Err(SubmitError::Closed));

        h.gate.send(Ok(())).unwrap();
        let dropped = tokio::time::timeout(Duration::from_secs(2), closer)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(dropped, 2);
        assert_eq!(h.dispatcher.status(), DispatchStatus::Closed);
        assert_eq!(h.shutdowns.load(Ordering::SeqCst), 1);
        assert_eq!(&*h.written.lock().unwrap(), b"inflight");
        assert!(h.started.try_recv().is_err());
    }

    fn detached_writer() -> (
        GatedWriter,
        mpsc::UnboundedSender<io::Result<()>>,
        Arc<Mutex<Vec<u8>>>,
    ) {
        let (started, _) = mpsc::unbounded_channel();
        let (gate, gate_rx) = mpsc::unbounded_channel();
        let written = Arc::new(Mutex::new(Vec::new()));
        let writer = GatedWriter {
            started,
            gate: gate_rx,
            written: Arc::clone(&written),
            shutdowns: Arc::default(),
        };
        (writer, gate, written)
    }

    #[test]
    fn test_new_outside_runtime_is_error() {
        let (writer, _gate, _written) = detached_writer();
        let sink: Arc<dyn ErrorSink> = Arc::new(|_: &ConnectionError| {});

        assert!(WriteDispatcher::new(writer, DispatcherOptions::default(), sink).is_err());
    }

    #[test]
    fn test_with_runtime_accepts_submits_from_plain_thread() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let (writer, gate, written) = detached_writer();
        let sink: Arc<dyn ErrorSink> = Arc::new(|_: &ConnectionError| {});
        let dispatcher = WriteDispatcher::with_runtime(
            writer,
            DispatcherOptions::default(),
            sink,
            runtime.handle().clone(),
        );

        gate.send(Ok(())).unwrap();
        assert_eq!(dispatcher.submit(&b"hello"[..]), Ok(Submitted::Immediate));

        runtime.block_on(async {
            tokio::time::timeout(Duration::from_secs(2), async {
                while dispatcher.status() != DispatchStatus::Idle {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
            })
            .await
            .expect("write never completed");
        });
        assert_eq!(&*written.lock().unwrap(), b"hello");
        assert_eq!(dispatcher.status(), DispatchStatus::Idle);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_submitters_keep_per_caller_order() {
        /// Writer that tracks overlapping writes.
        struct CountingWriter {
            outstanding: Arc<AtomicUsize>,
            max_seen: Arc<AtomicUsize>,
            written: Arc<Mutex<Vec<u8>>>,
        }

        #[async_trait]
        impl WireWriter for CountingWriter {
            async fn write_payload(&mut self, data: &[u8]) -> io::Result<()> {
                let now = self.outstanding.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::task::yield_now().await;
                self.written.lock().unwrap().extend_from_slice(data);
                self.outstanding.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }

            async fn shutdown(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let outstanding = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let written = Arc::new(Mutex::new(Vec::new()));
        let sink: Arc<dyn ErrorSink> = Arc::new(|_: &ConnectionError| {});
        let dispatcher = WriteDispatcher::new(
            CountingWriter {
                outstanding: Arc::clone(&outstanding),
                max_seen: Arc::clone(&max_seen),
                written: Arc::clone(&written),
            },
            DispatcherOptions::default(),
            sink,
        )
        .expect("inside runtime");

        // Each producer thread writes [id, seq] pairs.
        let producers: Vec<_> = (0..4u8)
            .map(|id| {
                let dispatcher = dispatcher.clone();
                std::thread::spawn(move || {
                    for seq in 0..50u8 {
                        dispatcher.submit(vec![id, seq]).unwrap();
                    }
                })
            })
            .collect();
        for p in producers {
            p.join().unwrap();
        }

        tokio::time::timeout(Duration::from_secs(5), async {
            while dispatcher.status() != DispatchStatus::Idle {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);

        let bytes = written.lock().unwrap().clone();
        assert_eq!(bytes.len(), 4 * 50 * 2);
        let mut next_seq = [0u8; 4];
        for pair in bytes.chunks(2) {
            let (id, seq) = (pair[0] as usize, pair[1]);
            assert_eq!(seq, next_seq[id], "producer {id} out of order");
            next_seq[id] += 1;
        }
        assert_eq!(next_seq, [50; 4]);
    }
}
