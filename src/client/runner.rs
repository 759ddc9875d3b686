//! Command serialization and batching.
//!
//! | Mode | Frames | Entry installed |
//! |------|--------|-----------------|
//! | immediate ([`CmdRunner::submit`]) | one per command | before the send |
//! | batched ([`CmdBatch`]) | one per flush | when the command is added |
//!
//! A batch that is discarded, or dropped without being flushed, sends
//! nothing and cancels every waiter it handed out.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, trace};

use crate::codec::ByteBuf;
use crate::error::{Error, Result};
use crate::identifiers::CmdUid;
use crate::protocol::{Cmd, CmdRegistry, write_cmd};
use crate::registry::RegistryIdMaps;
use crate::transport::{Connection, OpHandle};

use super::pending::{PendingResults, ResultWaiter};

// ============================================================================
// FrameSink
// ============================================================================

/// Destination of outbound frames.
pub(crate) trait FrameSink: Send + Sync {
    /// Sends one frame.
    fn send_frame(&self, frame: Vec<u8>) -> OpHandle<()>;

    /// Fails `uid` with a timeout after `after`, unless it resolved first.
    ///
    /// The default does nothing.
    fn expire(&self, _pending: &Arc<PendingResults>, _uid: CmdUid, _after: Duration) {}
}

impl FrameSink for Connection {
    fn send_frame(&self, frame: Vec<u8>) -> OpHandle<()> {
        self.send(frame)
    }

    fn expire(&self, pending: &Arc<PendingResults>, uid: CmdUid, after: Duration) {
        let Some(settled) = pending.settled(uid) else {
            return;
        };
        let pending = Arc::clone(pending);
        let _timer = self.schedule(async move {
            tokio::select! {
                () = sleep(after) => pending.fail(
                    uid,
                    Error::cancelled(format!("no result within {} ms", after.as_millis())),
                ),
                _ = settled => trace!(%uid, "Command settled before its deadline"),
            }
            Ok(())
        });
    }
}

// ============================================================================
// CmdRunner
// ============================================================================

/// Serializes commands against the session's id maps.
#[derive(Clone)]
pub(crate) struct CmdRunner {
    pub(crate) pending: Arc<PendingResults>,
    pub(crate) maps: Arc<RegistryIdMaps>,
    pub(crate) cmds: Arc<CmdRegistry>,
    pub(crate) sink: Arc<dyn FrameSink>,
    pub(crate) timeout: Option<Duration>,
}

impl fmt::Debug for CmdRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CmdRunner")
            .field("pending", &self.pending)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl CmdRunner {
    /// Writes `cmd` into `buf` and installs its pending entry.
    fn enqueue<C: Cmd>(&self, buf: &mut ByteBuf, cmd: &C) -> Result<ResultWaiter<C::Output>> {
        let kind = cmd.kind();
        if !self.cmds.contains(&kind) {
            return Err(Error::registry(format!(
                "command kind {kind} is not registered"
            )));
        }

        let waiter = self.pending.register::<C>(kind);
        write_cmd(buf, cmd, waiter.uid(), &self.maps)?;

        if let Some(after) = self.timeout {
            self.sink.expire(&self.pending, waiter.uid(), after);
        }
        Ok(waiter)
    }

    /// Sends `cmd` in a frame of its own.
    ///
    /// The pending entry exists before the frame is handed to the sink.
    pub(crate) fn submit<C: Cmd>(&self, cmd: C) -> Result<(OpHandle<()>, ResultWaiter<C::Output>)> {
        let mut buf = ByteBuf::new();
        let waiter = self.enqueue(&mut buf, &cmd)?;
        trace!(uid = %waiter.uid(), len = buf.len(), "Sending command");
        Ok((self.sink.send_frame(buf.into_inner()), waiter))
    }

    /// Starts a batch.
    pub(crate) fn batch(&self) -> CmdBatch {
        CmdBatch {
            runner: self.clone(),
            buf: ByteBuf::new(),
            uids: Vec::new(),
            open: true,
        }
    }
}

// ============================================================================
// CmdBatch
// ============================================================================

/// Commands collected into a single frame.
///
/// # Example
///
/// ```no_run
/// # use codecraft::{Client, SendSystemChatCmd};
/// # async fn example(client: &Client) -> codecraft::Result<()> {
/// let mut batch = client.batch()?;
/// let first = batch.run_cmd(SendSystemChatCmd::new("one"))?;
/// let second = batch.run_cmd(SendSystemChatCmd::new("two"))?;
/// batch.flush().await?;
///
/// first.await?;
/// second.await?;
/// # Ok(())
/// # }
/// ```
#[must_use = "a batch sends nothing until flushed"]
pub struct CmdBatch {
    runner: CmdRunner,
    buf: ByteBuf,
    uids: Vec<CmdUid>,
    open: bool,
}

impl CmdBatch {
    /// Adds `cmd` to the batch and returns its result waiter.
    ///
    /// # Errors
    ///
    /// Returns an encoding error; the batch is left unchanged.
    pub fn run_cmd<C: Cmd>(&mut self, cmd: C) -> Result<ResultWaiter<C::Output>> {
        let waiter = self.runner.enqueue(&mut self.buf, &cmd)?;
        self.uids.push(waiter.uid());
        Ok(waiter)
    }

    /// Returns the number of commands in the batch.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.uids.len()
    }

    /// Returns `true` if no command was added.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.uids.is_empty()
    }

    /// Sends every command in one frame.
    ///
    /// An empty batch sends nothing.
    pub fn flush(mut self) -> OpHandle<()> {
        self.open = false;
        if self.uids.is_empty() {
            return OpHandle::ready(Ok(()));
        }

        debug!(count = self.uids.len(), len = self.buf.len(), "Flushing command batch");
        let frame = std::mem::take(&mut self.buf).into_inner();
        self.runner.sink.send_frame(frame)
    }

    /// Cancels every command in the batch without sending anything.
    pub fn discard(self) {
        drop(self);
    }
}

impl Drop for CmdBatch {
    fn drop(&mut self) {
        if !self.open || self.uids.is_empty() {
            return;
        }

        debug!(count = self.uids.len(), "Discarding command batch");
        for uid in self.uids.drain(..) {
            self.runner
                .pending
                .fail(uid, Error::cancelled("batch was discarded"));
        }
    }
}

impl fmt::Debug for CmdBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CmdBatch")
            .field("commands", &self.uids.len())
            .field("len", &self.buf.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Tests
// ============================================================================
