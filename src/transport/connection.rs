//! WebSocket connection on a dedicated networking thread.
//!
//! A [`Connection`] owns one OS thread running a current-thread tokio
//! runtime. The WebSocket lives on that runtime and nothing else touches
//! it. Every operation is scheduled there as a *unit* and answered
//! through an [`OpHandle`], which async callers (in any runtime) await
//! and synchronous callers [`wait`](OpHandle::wait) on.
//!
//! # Lifecycle
//!
//! | Step | Operation |
//! |------|-----------|
//! | 1 | [`Connection::new`] starts the thread |
//! | 2 | [`Connection::connect`] opens the WebSocket |
//! | 3 | [`Connection::send`] / [`Connection::recv`] move binary frames |
//! | 4 | [`Connection::close_with`] aborts outstanding units, closes the socket, stops the thread |
//!
//! Operations requested after close fail with [`Error::ConnectionClosed`].

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::task::{Context, Poll};
use std::thread::{self, JoinHandle as ThreadHandle, ThreadId};
use std::time::Duration;

use futures_util::future::join_all;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::net::TcpStream;
use tokio::runtime::{Builder, Handle};
use tokio::sync::{Mutex as AsyncMutex, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace, warn};
use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default time allowed for opening the WebSocket.
pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(10);

/// Default time [`Connection::close`] waits for aborted units.
pub const DEFAULT_CLOSE_GRACE: Duration = Duration::from_secs(5);

const THREAD_NAME: &str = "codecraft-net";

/// Control frame payload limit minus the two code bytes.
const MAX_CLOSE_REASON: usize = 123;

// ============================================================================
// Types
// ============================================================================

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// Signal that stops the runtime.
type ShutdownSignal = oneshot::Sender<()>;

// ============================================================================
// OpHandle
// ============================================================================

/// Pending result of an operation scheduled on the networking thread.
///
/// Await it from async code, or call [`OpHandle::wait`] from synchronous
/// code. Dropping it does not cancel the operation.
#[must_use = "an OpHandle does nothing unless awaited or waited on"]
pub struct OpHandle<T> {
    rx: oneshot::Receiver<Result<T>>,
    join: Option<ThreadHandle<()>>,
}

impl<T> OpHandle<T> {
    fn new(rx: oneshot::Receiver<Result<T>>) -> Self {
        Self { rx, join: None }
    }

    /// Creates a handle that is already resolved.
    pub fn ready(result: Result<T>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Self::new(rx)
    }

    /// Blocks the current thread until the operation finishes.
    ///
    /// # Panics
    ///
    /// Panics if called from within an async execution context; await
    /// the handle there instead.
    ///
    /// # Errors
    ///
    /// Returns the operation's error, or [`Error::ConnectionClosed`] if
    /// the operation was aborted.
    pub fn wait(mut self) -> Result<T> {
        let rx = std::mem::replace(&mut self.rx, oneshot::channel().1);
        let result = rx.blocking_recv().unwrap_or(Err(Error::ConnectionClosed));
        self.join_thread();
        result
    }

    fn join_thread(&mut self) {
        if let Some(thread) = self.join.take()
            && thread.join().is_err()
        {
            warn!("Networking thread panicked");
        }
    }
}

impl<T> Future for OpHandle<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let result = match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(result) => result.unwrap_or(Err(Error::ConnectionClosed)),
            Poll::Pending => return Poll::Pending,
        };
        self.join_thread();
        Poll::Ready(result)
    }
}

impl<T> fmt::Debug for OpHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpHandle")
            .field("joins_thread", &self.join.is_some())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Connection
// ============================================================================

/// WebSocket connection driven by its own networking thread.
///
/// Cloning is cheap; clones share the thread and the socket.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

struct Inner {
    runtime: Handle,
    thread_id: ThreadId,
    thread: Mutex<Option<ThreadHandle<()>>>,
    shutdown: Mutex<Option<ShutdownSignal>>,
    teardown: Arc<Mutex<Teardown>>,
    units: Mutex<FxHashMap<u64, JoinHandle<()>>>,
    next_unit: AtomicU64,
    closed: AtomicBool,
    close_grace: Duration,
    sink: AsyncMutex<Option<WsSink>>,
    source: AsyncMutex<Option<WsSource>>,
}

/// Callers waiting for the networking thread to stop.
#[derive(Default)]
struct Teardown {
    finished: bool,
    waiters: Vec<oneshot::Sender<Result<()>>>,
}

impl Teardown {
    fn subscribe(&mut self) -> OpHandle<()> {
        if self.finished {
            return OpHandle::ready(Ok(()));
        }
        let (tx, rx) = oneshot::channel();
        self.waiters.push(tx);
        OpHandle::new(rx)
    }

    fn finish(&mut self) {
        self.finished = true;
        for waiter in self.waiters.drain(..) {
            let _ = waiter.send(Ok(()));
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("closed", &self.is_closed())
            .field("units", &self.inner.units.lock().len())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Starts the networking thread.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the runtime or thread cannot be created.
    pub fn new(close_grace: Duration) -> Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let handle = runtime.handle().clone();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let teardown = Arc::new(Mutex::new(Teardown::default()));

        let finished = Arc::clone(&teardown);
        let thread = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || {
                let _ = runtime.block_on(shutdown_rx);
                drop(runtime);
                trace!("Networking runtime stopped");
                finished.lock().finish();
            })?;

        debug!(thread = THREAD_NAME, "Networking thread started");

        Ok(Self {
            inner: Arc::new(Inner {
                runtime: handle,
                thread_id: thread.thread().id(),
                thread: Mutex::new(Some(thread)),
                shutdown: Mutex::new(Some(shutdown_tx)),
                teardown,
                units: Mutex::new(FxHashMap::default()),
                next_unit: AtomicU64::new(0),
                closed: AtomicBool::new(false),
                close_grace,
                sink: AsyncMutex::new(None),
                source: AsyncMutex::new(None),
            }),
        })
    }

    /// Returns `true` once [`Connection::close`] was called.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Returns the number of tracked units.
    #[cfg(test)]
    pub(crate) fn unit_count(&self) -> usize {
        self.inner.units.lock().len()
    }

    /// Returns `true` if the caller runs on the networking thread.
    #[inline]
    #[must_use]
    pub fn on_network_thread(&self) -> bool {
        thread::current().id() == self.inner.thread_id
    }

    /// Schedules `unit` on the networking thread.
    ///
    /// The unit is tracked until it finishes and is aborted by
    /// [`Connection::close`].
    pub fn schedule<T, F>(&self, unit: F) -> OpHandle<T>
    where
        T: Send + 'static,
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        if self.is_closed() {
            let _ = tx.send(Err(Error::ConnectionClosed));
            return OpHandle::new(rx);
        }

        let id = self.inner.next_unit.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::clone(&self.inner);

        let mut units = self.inner.units.lock();
        let task = self.inner.runtime.spawn(async move {
            let result = unit.await;
            inner.units.lock().remove(&id);
            let _ = tx.send(result);
        });
        units.insert(id, task);

        OpHandle::new(rx)
    }

    /// Opens the WebSocket to `uri`.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionTimeout`] if the handshake exceeds `open_timeout`
    /// - [`Error::Network`] naming the URI for any other failure
    pub fn connect(&self, uri: &Url, open_timeout: Duration) -> OpHandle<()> {
        let this = self.clone();
        let uri = uri.clone();
        self.schedule(async move { this.open(&uri, open_timeout).await })
    }

    /// Sends one binary frame.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] if the socket is not open
    /// - [`Error::WebSocket`] if the write fails
    pub fn send(&self, frame: Vec<u8>) -> OpHandle<()> {
        let this = self.clone();
        self.schedule(async move { this.write_frame(frame).await })
    }

    /// Receives the next binary frame.
    ///
    /// # Errors
    ///
    /// - [`Error::ConnectionClosed`] on remote close or end of stream
    /// - [`Error::Protocol`] for a text frame
    pub fn recv(&self) -> OpHandle<Vec<u8>> {
        let this = self.clone();
        self.schedule(async move { this.read_frame().await })
    }

    /// Closes the connection with a normal close code.
    ///
    /// See [`Connection::close_with`].
    pub fn close(&self) -> OpHandle<()> {
        self.close_with(CloseCode::Normal, "")
    }

    /// Closes the connection and stops the networking thread.
    ///
    /// Outstanding units are aborted and given the close grace period to
    /// unwind. A close frame carrying `code` and `reason` is sent if the
    /// socket is open. Later calls ignore their arguments and resolve when
    /// the first close has stopped the thread.
    pub fn close_with(&self, code: CloseCode, reason: &str) -> OpHandle<()> {
        let mut handle = self.inner.teardown.lock().subscribe();
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return handle;
        }

        let units: Vec<JoinHandle<()>> = self.inner.units.lock().drain().map(|(_, u)| u).collect();
        for unit in &units {
            unit.abort();
        }
        debug!(aborted = units.len(), "Closing connection");

        let inner = Arc::clone(&self.inner);
        let reason = truncate(reason, MAX_CLOSE_REASON).to_string();
        self.inner.runtime.spawn(async move {
            let grace = inner.close_grace;
            if timeout(grace, join_all(units)).await.is_err() {
                warn!(
                    grace_ms = grace.as_millis() as u64,
                    "Units did not stop within close grace period"
                );
            }

            if let Some(mut sink) = inner.sink.lock().await.take() {
                let frame = CloseFrame { code, reason: reason.into() };
                if let Err(e) = sink.send(Message::Close(Some(frame))).await {
                    debug!(error = %e, "Failed to send close frame");
                }
                let _ = sink.close().await;
            }
            inner.source.lock().await.take();

            if let Some(signal) = inner.shutdown.lock().take() {
                let _ = signal.send(());
            }
        });

        if !self.on_network_thread() {
            handle.join = self.inner.thread.lock().take();
        }
        handle
    }

    // ========================================================================
    // Frame I/O (networking thread)
    // ========================================================================

    /// Opens the WebSocket. Must run on the networking thread.
    pub(crate) async fn open(&self, uri: &Url, open_timeout: Duration) -> Result<()> {
        debug!(%uri, "Opening WebSocket");

        let (stream, _) = timeout(open_timeout, connect_async(uri.as_str()))
            .await
            .map_err(|_| Error::connection_timeout(open_timeout.as_millis() as u64))?
            .map_err(|e| Error::network(format!("failed to connect to {uri}: {e}")))?;

        let (sink, source) = stream.split();
        *self.inner.sink.lock().await = Some(sink);
        *self.inner.source.lock().await = Some(source);
        Ok(())
    }

    /// Writes one binary frame. Must run on the networking thread.
    pub(crate) async fn write_frame(&self, frame: Vec<u8>) -> Result<()> {
        let mut sink = self.inner.sink.lock().await;
        let sink = sink.as_mut().ok_or(Error::ConnectionClosed)?;

        trace!(len = frame.len(), "Sending frame");
        sink.send(Message::Binary(frame.into()))
            .await
            .map_err(map_ws_error)
    }

    /// Reads the next binary frame. Must run on the networking thread.
    pub(crate) async fn read_frame(&self) -> Result<Vec<u8>> {
        let mut source = self.inner.source.lock().await;
        let source = source.as_mut().ok_or(Error::ConnectionClosed)?;

        loop {
            match source.next().await {
                Some(Ok(Message::Binary(data))) => {
                    trace!(len = data.len(), "Received frame");
                    return Ok(data.to_vec());
                }
                Some(Ok(Message::Text(_))) => {
                    return Err(Error::protocol("received a text frame"));
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "WebSocket closed by remote");
                    return Err(Error::ConnectionClosed);
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(map_ws_error(e)),
                None => {
                    debug!("WebSocket stream ended");
                    return Err(Error::ConnectionClosed);
                }
            }
        }
    }
}

fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

fn map_ws_error(e: WsError) -> Error {
    match e {
        WsError::ConnectionClosed | WsError::AlreadyClosed => Error::ConnectionClosed,
        other => Error::WebSocket(other),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> Connection {
        Connection::new(Duration::from_millis(200)).unwrap()
    }

    #[test]
    fn test_schedule_and_wait() {
        let conn = connection();
        let value = conn.schedule(async { Ok(41 + 1) }).wait().unwrap();
        assert_eq!(value, 42);
        conn.close().wait().unwrap();
    }

    #[test]
    fn test_units_run_on_network_thread() {
        let conn = connection();
        let probe = conn.clone();
        let on_thread = conn
            .schedule(async move { Ok(probe.on_network_thread()) })
            .wait()
            .unwrap();
        assert!(on_thread);
        assert!(!conn.on_network_thread());
        conn.close().wait().unwrap();
    }

    #[test]
    fn test_send_before_connect_is_closed() {
        let conn = connection();
        assert!(matches!(
            conn.send(vec![1]).wait(),
            Err(Error::ConnectionClosed)
        ));
        conn.close().wait().unwrap();
    }

    #[test]
    fn test_close_aborts_units_and_rejects_new_ones() {
        let conn = connection();
        let stuck = conn.schedule(async {
            std::future::pending::<()>().await;
            Ok(())
        });

        conn.close().wait().unwrap();
        assert!(matches!(stuck.wait(), Err(Error::ConnectionClosed)));
        assert!(matches!(
            conn.schedule(async { Ok(()) }).wait(),
            Err(Error::ConnectionClosed)
        ));
        assert!(conn.close().wait().is_ok());
    }

    #[test]
    fn test_second_close_waits_for_first_teardown() {
        let conn = connection();
        let (started_tx, started_rx) = std::sync::mpsc::channel();
        let finished = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&finished);
        let _busy = conn.schedule(async move {
            let _ = started_tx.send(());
            thread::sleep(Duration::from_millis(300));
            flag.store(true, Ordering::SeqCst);
            Ok(())
        });
        started_rx.recv().unwrap();

        let first = conn.close();
        conn.close().wait().unwrap();
        assert!(finished.load(Ordering::SeqCst));
        first.wait().unwrap();
    }

    #[tokio::test]
    async fn test_await_from_other_runtime() {
        let conn = connection();
        assert_eq!(conn.schedule(async { Ok("hi") }).await.unwrap(), "hi");
        conn.close().await.unwrap();
        assert!(conn.is_closed());
    }

    #[test]
    fn test_truncate_keeps_char_boundary() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ééé", 3), "é");
        assert_eq!(truncate(&"x".repeat(200), MAX_CLOSE_REASON).len(), 123);
    }

    #[test]
    fn test_connect_refused_is_network_error() {
        let conn = connection();
        let uri = Url::parse("ws://127.0.0.1:1").unwrap();
        let result = conn.connect(&uri, Duration::from_secs(2)).wait();
        assert!(matches!(result, Err(Error::Network { .. })));
        conn.close().wait().unwrap();
    }
}
