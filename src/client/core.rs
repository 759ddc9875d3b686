//! Session orchestrator.
//!
//! # States
//!
//! ```text
//! Constructed → Connecting → HandshakeInProgress → Established → Closing → Closed
//!                    └──────────────┴─────► Failed
//! ```
//!
//! # Example
//!
//! ```no_run
//! use codecraft::{Client, SendSystemChatCmd};
//!
//! # async fn example() -> codecraft::Result<()> {
//! let client = Client::builder().uri("ws://localhost:6767").build()?;
//! client.establish().await?;
//!
//! client.run_cmd(SendSystemChatCmd::new("hello")).await?;
//! client.close().await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::error::{Error, Result};
use crate::protocol::{Cmd, CmdRegistry, MsgRegistry, PushMsg};
use crate::registry::{BlockTypes, IdMapCache, RegistryIdMaps};
use crate::transport::{CloseCode, Connection, OpHandle};

use super::builder::ClientBuilder;
use super::current::{self, CurrentGuard};
use super::handshake;
use super::options::ClientOptions;
use super::pending::PendingResults;
use super::queue::{HandlerSlot, MsgQueue, QueueState};
use super::runner::{CmdBatch, CmdRunner};

// ============================================================================
// ClientState
// ============================================================================

/// Lifecycle state of a [`Client`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Built, not connected.
    Constructed,
    /// Opening the WebSocket.
    Connecting,
    /// Negotiating id maps.
    HandshakeInProgress,
    /// Ready for commands.
    Established,
    /// Shutting down.
    Closing,
    /// Shut down.
    Closed,
    /// Establishing failed.
    Failed,
}

// ============================================================================
// Types
// ============================================================================

struct Session {
    maps: Arc<RegistryIdMaps>,
    queue: Arc<MsgQueue>,
    runner: CmdRunner,
}

pub(crate) struct ClientInner {
    options: ClientOptions,
    connection: Connection,
    cmds: Arc<CmdRegistry>,
    msgs: Arc<MsgRegistry>,
    block_types: Arc<BlockTypes>,
    cache: Option<IdMapCache>,
    pending: Arc<PendingResults>,
    handler: HandlerSlot,
    state: Mutex<ClientState>,
    session: Mutex<Option<Session>>,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        if !self.connection.is_closed() {
            debug!(client = %self.options.name, "Client dropped without close");
            let _ = self.connection.close();
        }
    }
}

// ============================================================================
// Client
// ============================================================================

/// Handle to one session with a CodeCraft server.
///
/// Cloning is cheap; clones share the session.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("name", &self.inner.options.name)
            .field("uri", &self.inner.options.uri.as_str())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Client - Construction
// ============================================================================

impl Client {
    /// Creates a configuration builder.
    #[inline]
    #[must_use]
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub(crate) fn new(
        options: ClientOptions,
        cmds: CmdRegistry,
        msgs: MsgRegistry,
        block_types: BlockTypes,
    ) -> Result<Self> {
        let connection = Connection::new(options.close_grace)?;
        let cache = options
            .cache_enabled
            .then(|| IdMapCache::new(options.cache_dir.clone()));

        let inner = Arc::new(ClientInner {
            options,
            connection,
            cmds: Arc::new(cmds),
            msgs: Arc::new(msgs),
            block_types: Arc::new(block_types),
            cache,
            pending: Arc::new(PendingResults::default()),
            handler: HandlerSlot::default(),
            state: Mutex::new(ClientState::Constructed),
            session: Mutex::new(None),
        });
        current::offer_default(&inner);

        debug!(client = %inner.options.name, uri = %inner.options.uri, "Client created");
        Ok(Self { inner })
    }

    pub(crate) fn from_inner(inner: Arc<ClientInner>) -> Self {
        Self { inner }
    }

    /// Returns the current client: the innermost [`Client::enter`]
    /// override, else the first client created.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoCurrentClient`] if no such client is alive.
    pub fn current() -> Result<Self> {
        current::current()
    }

    /// Makes this client current until the guard is dropped.
    #[inline]
    pub fn enter(&self) -> CurrentGuard {
        CurrentGuard::push(&self.inner)
    }

    /// Returns `true` if both handles share one session.
    #[inline]
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

// ============================================================================
// Client - Accessors
// ============================================================================

impl Client {
    /// Returns the client name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.options.name
    }

    /// Returns the configuration.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &ClientOptions {
        &self.inner.options
    }

    /// Returns the lifecycle state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> ClientState {
        *self.inner.state.lock()
    }

    /// Returns the number of commands awaiting a result.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// Returns the id maps negotiated by the handshake.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] before the handshake completed.
    pub fn reg_id_maps(&self) -> Result<Arc<RegistryIdMaps>> {
        self.inner
            .session
            .lock()
            .as_ref()
            .map(|s| Arc::clone(&s.maps))
            .ok_or_else(|| Error::invalid_state("client has no id maps yet"))
    }

    /// Sets the callback for push messages.
    ///
    /// The callback runs on the networking thread.
    pub fn set_msg_handler<F>(&self, handler: F)
    where
        F: Fn(PushMsg) + Send + Sync + 'static,
    {
        *self.inner.handler.lock() = Some(Arc::new(handler));
    }

    /// Removes the push message callback.
    pub fn clear_msg_handler(&self) {
        *self.inner.handler.lock() = None;
    }
}

// ============================================================================
// Client - Lifecycle
// ============================================================================

impl Client {
    /// Connects, runs the handshake and starts receiving.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] unless the client is freshly constructed
    /// - [`Error::Network`] or [`Error::ConnectionTimeout`] if connecting fails
    /// - any decode error of the handshake
    pub fn establish(&self) -> OpHandle<()> {
        {
            let mut state = self.inner.state.lock();
            if *state != ClientState::Constructed {
                return OpHandle::ready(Err(Error::invalid_state(format!(
                    "cannot establish a client in state {:?}",
                    *state
                ))));
            }
            *state = ClientState::Connecting;
        }

        info!(client = %self.name(), uri = %self.inner.options.uri, "Establishing session");

        let this = self.clone();
        self.inner.connection.schedule(async move {
            let started = Instant::now();
            match this.run_establish().await {
                Ok(()) => {
                    info!(
                        client = %this.name(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Session established"
                    );
                    Ok(())
                }
                Err(e) => {
                    error!(client = %this.name(), error = %e, "Failed to establish session");
                    this.fail();
                    Err(e)
                }
            }
        })
    }

    async fn run_establish(&self) -> Result<()> {
        let inner = &self.inner;
        let options = &inner.options;

        inner
            .connection
            .open(&options.uri, options.open_timeout)
            .await?;
        self.advance(ClientState::Connecting, ClientState::HandshakeInProgress)?;

        let maps = handshake::negotiate(
            &inner.connection,
            &options.name,
            inner.cache.as_ref(),
            Arc::clone(&inner.block_types),
        )
        .await?;
        let maps = Arc::new(maps);

        let queue = MsgQueue::new(
            options.name.clone(),
            Arc::clone(&inner.pending),
            Arc::clone(&maps),
            Arc::clone(&inner.msgs),
            Arc::clone(&inner.handler),
        );
        let runner = CmdRunner {
            pending: Arc::clone(&inner.pending),
            maps: Arc::clone(&maps),
            cmds: Arc::clone(&inner.cmds),
            sink: Arc::new(inner.connection.clone()),
            timeout: options.command_timeout,
        };

        let owner = Arc::downgrade(&self.inner);
        queue.start(&inner.connection, move |e| {
            if let Some(inner) = owner.upgrade() {
                let reason = format!("receiver failed: {e}");
                let _ = Client::from_inner(inner).close_with(CloseCode::Error, &reason);
            }
        })?;

        let mut state = inner.state.lock();
        if *state != ClientState::HandshakeInProgress {
            return Err(Error::invalid_state("client was closed while establishing"));
        }
        *inner.session.lock() = Some(Session {
            maps,
            queue,
            runner,
        });
        *state = ClientState::Established;
        Ok(())
    }

    fn advance(&self, from: ClientState, to: ClientState) -> Result<()> {
        let mut state = self.inner.state.lock();
        if *state != from {
            return Err(Error::invalid_state(format!(
                "expected state {from:?}, found {:?}",
                *state
            )));
        }
        *state = to;
        Ok(())
    }

    fn fail(&self) {
        let mut state = self.inner.state.lock();
        if matches!(*state, ClientState::Closing | ClientState::Closed) {
            return;
        }
        *state = ClientState::Failed;
        let _ = self.inner.connection.close();
    }

    /// Closes the session with a normal close code.
    ///
    /// See [`Client::close_with`].
    pub fn close(&self) -> OpHandle<()> {
        self.close_with(CloseCode::Normal, "client closed")
    }

    /// Closes the session.
    ///
    /// Stops the message queue, which fails every pending command with
    /// [`Error::QueueClosed`], then closes the connection with `code` and
    /// `reason`. Calling it again, from any thread, resolves once the
    /// first close has finished tearing the connection down.
    pub fn close_with(&self, code: CloseCode, reason: &str) -> OpHandle<()> {
        let mut state = self.inner.state.lock();
        if matches!(*state, ClientState::Closing | ClientState::Closed) {
            return self.inner.connection.close();
        }
        *state = ClientState::Closing;
        info!(client = %self.name(), code = u16::from(code), reason, "Closing session");

        if let Some(session) = self.inner.session.lock().as_ref() {
            session.queue.stop(reason);
        }
        self.inner
            .pending
            .fail_all(|| Error::queue_closed(reason.to_string()));

        let closing = self.inner.connection.close_with(code, reason);
        *state = ClientState::Closed;
        info!(client = %self.name(), "Session closed");
        closing
    }

    /// Returns the message queue state, if a session exists.
    #[must_use]
    pub fn queue_state(&self) -> Option<QueueState> {
        self.inner.session.lock().as_ref().map(|s| s.queue.state())
    }
}

// ============================================================================
// Client - Commands
// ============================================================================

impl Client {
    fn runner(&self) -> Result<CmdRunner> {
        let state = self.state();
        if state != ClientState::Established {
            return Err(Error::invalid_state(format!(
                "client is {state:?}, not Established"
            )));
        }
        self.inner
            .session
            .lock()
            .as_ref()
            .map(|s| s.runner.clone())
            .ok_or_else(|| Error::invalid_state("client has no session"))
    }

    /// Sends `cmd` in its own frame and awaits its result.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] unless established
    /// - [`Error::Registry`] if the kind is unknown to the client or server
    /// - [`Error::Cmd`] if the server reports a failure
    /// - [`Error::QueueClosed`] if the session ends first
    pub async fn run_cmd<C: Cmd>(&self, cmd: C) -> Result<C::Output> {
        let (sent, waiter) = self.runner()?.submit(cmd)?;
        sent.await?;
        waiter.await
    }

    /// Blocking form of [`Client::run_cmd`] for synchronous callers.
    ///
    /// # Panics
    ///
    /// Panics if called from within an async execution context.
    ///
    /// # Errors
    ///
    /// Same as [`Client::run_cmd`].
    pub fn run_cmd_blocking<C: Cmd>(&self, cmd: C) -> Result<C::Output> {
        let (sent, waiter) = self.runner()?.submit(cmd)?;
        sent.wait()?;
        waiter.wait()
    }

    /// Starts a batch of commands sent as one frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] unless established.
    pub fn batch(&self) -> Result<CmdBatch> {
        Ok(self.runner()?.batch())
    }
}

// ============================================================================
// Tests
// ============================================================================
