//! Inbound message demultiplexer.
//!
//! The queue runs as one unit on the networking thread. Each frame is
//! split into messages; command results go to the pending table, every
//! other message to the push handler.
//!
//! # States
//!
//! ```text
//! Idle ──start──► Running ──error / stop──► Stopping ──► Stopped
//! ```
//!
//! Any decode error, unknown id or transport failure is fatal: every
//! pending command fails with [`Error::QueueClosed`] and the owner is
//! told to close the session.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, trace};

use crate::codec::ByteBuf;
use crate::error::{Error, Result};
use crate::protocol::{Msg, MsgRegistry, PushMsg, read_msg};
use crate::registry::RegistryIdMaps;
use crate::transport::Connection;

use super::pending::PendingResults;

// ============================================================================
// Types
// ============================================================================

/// Callback for push messages.
pub type MsgHandler = Arc<dyn Fn(PushMsg) + Send + Sync>;

/// Shared slot holding the current push handler.
pub(crate) type HandlerSlot = Arc<Mutex<Option<MsgHandler>>>;

/// Lifecycle of the message queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    /// Created, not receiving.
    Idle,
    /// Receiving frames.
    Running,
    /// Failing pending commands.
    Stopping,
    /// Done.
    Stopped,
}

// ============================================================================
// MsgQueue
// ============================================================================

pub(crate) struct MsgQueue {
    name: String,
    state: Mutex<QueueState>,
    pending: Arc<PendingResults>,
    maps: Arc<RegistryIdMaps>,
    msgs: Arc<MsgRegistry>,
    handler: HandlerSlot,
}

impl fmt::Debug for MsgQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MsgQueue")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl MsgQueue {
    pub(crate) fn new(
        name: impl Into<String>,
        pending: Arc<PendingResults>,
        maps: Arc<RegistryIdMaps>,
        msgs: Arc<MsgRegistry>,
        handler: HandlerSlot,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            state: Mutex::new(QueueState::Idle),
            pending,
            maps,
            msgs,
            handler,
        })
    }

    pub(crate) fn state(&self) -> QueueState {
        *self.state.lock()
    }

    /// Starts receiving on `conn`. `on_fatal` runs once if the queue fails.
    pub(crate) fn start<F>(self: &Arc<Self>, conn: &Connection, on_fatal: F) -> Result<()>
    where
        F: FnOnce(Error) + Send + 'static,
    {
        {
            let mut state = self.state.lock();
            if *state != QueueState::Idle {
                return Err(Error::invalid_state(format!(
                    "message queue is {state:?}, not Idle"
                )));
            }
            *state = QueueState::Running;
        }

        let queue = Arc::clone(self);
        let source = conn.clone();
        let mut on_fatal = Some(on_fatal);

        let _unit = conn.schedule(async move {
            debug!(client = %queue.name, "Message queue running");
            while queue.state() == QueueState::Running {
                let result = match source.read_frame().await {
                    Ok(frame) => queue.handle_frame(&frame),
                    Err(e) => Err(e),
                };

                if let Err(e) = result {
                    if queue.state() == QueueState::Running {
                        queue.fail(&e);
                        if let Some(on_fatal) = on_fatal.take() {
                            on_fatal(e);
                        }
                    }
                    break;
                }
            }
            Ok(())
        });
        Ok(())
    }

    /// Stops the queue on request of its owner.
    pub(crate) fn stop(&self, reason: &str) {
        {
            let mut state = self.state.lock();
            if matches!(*state, QueueState::Stopping | QueueState::Stopped) {
                return;
            }
            *state = QueueState::Stopping;
        }

        debug!(client = %self.name, reason, "Stopping message queue");
        let reason = reason.to_string();
        self.pending.fail_all(|| Error::queue_closed(reason.clone()));
        *self.state.lock() = QueueState::Stopped;
    }

    fn fail(&self, cause: &Error) {
        *self.state.lock() = QueueState::Stopping;
        error!(client = %self.name, error = %cause, "Message queue failed");

        let reason = cause.to_string();
        self.pending.fail_all(|| Error::queue_closed(reason.clone()));
        *self.state.lock() = QueueState::Stopped;
    }

    /// Dispatches every message in one frame.
    pub(crate) fn handle_frame(&self, frame: &[u8]) -> Result<()> {
        let mut buf = ByteBuf::view(frame);
        while buf.has_remaining() {
            match read_msg(&mut buf, &self.maps, &self.msgs)? {
                Msg::CmdResult(result) => {
                    let uid = result.uid;
                    if !self.pending.resolve(result, &self.maps) {
                        trace!(client = %self.name, %uid, "Result without waiter skipped");
                    }
                }
                Msg::Push(push) => {
                    let handler = self.handler.lock().clone();
                    match handler {
                        Some(handler) => handler(push),
                        None => trace!(client = %self.name, kind = %push.kind, "Unhandled push message"),
                    }
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::DynamicValue;
    use crate::identifiers::CmdUid;
    use crate::protocol::{
        CmdOutcome, CmdResultMsg, MsgDecoder, SetBlockCmd, builtin_msgs, decode_push,
    };
    use crate::resource::ResourceId;

    fn id(s: &str) -> ResourceId {
        ResourceId::parse(s).unwrap()
    }

    fn queue(handler: HandlerSlot) -> Arc<MsgQueue> {
        let mut maps = RegistryIdMaps::new();
        maps.msg_mut().put(0, id("codecraft:cmd_result")).unwrap();
        maps.msg_mut().put(1, id("codecraft:tick")).unwrap();
        maps.freeze();

        let msgs = builtin_msgs()
            .unwrap()
            .register(id("codecraft:tick"), decode_push as MsgDecoder)
            .unwrap()
            .build();

        MsgQueue::new(
            "test",
            Arc::new(PendingResults::default()),
            Arc::new(maps),
            Arc::new(msgs),
            handler,
        )
    }

    fn result_frame(queue: &MsgQueue, uid: u32, ok: bool) -> Vec<u8> {
        let mut payload = ByteBuf::new();
        payload
            .write_dynamic_tuple(&[DynamicValue::Bool(ok)], &queue.maps)
            .unwrap();
        let mut buf = ByteBuf::new();
        CmdResultMsg {
            uid: CmdUid::new(uid),
            outcome: CmdOutcome::Success(payload.into_inner()),
        }
        .write(&mut buf, &queue.maps)
        .unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_results_and_pushes_are_routed() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let slot: HandlerSlot = Arc::default();
        let sink = Arc::clone(&seen);
        *slot.lock() = Some(Arc::new(move |push: PushMsg| sink.lock().push(push.kind)));

        let queue = queue(slot);
        let waiter = queue.pending.register::<SetBlockCmd>(id("codecraft:set_block"));

        let mut frame = result_frame(&queue, 0, true);
        let mut push = ByteBuf::new();
        push.write_varint(1);
        push.write_dynamic_tuple(&[], &queue.maps).unwrap();
        frame.extend_from_slice(push.as_slice());

        queue.handle_frame(&frame).unwrap();
        assert!(waiter.wait().unwrap());
        assert_eq!(*seen.lock(), vec![id("codecraft:tick")]);
    }

    #[test]
    fn test_late_result_is_skipped() {
        let queue = queue(Arc::default());
        let frame = result_frame(&queue, 17, true);
        assert!(queue.handle_frame(&frame).is_ok());
    }

    #[test]
    fn test_unknown_msg_id_is_error() {
        let queue = queue(Arc::default());
        let mut buf = ByteBuf::new();
        buf.write_varint(5);
        assert!(matches!(
            queue.handle_frame(buf.as_slice()),
            Err(Error::UnknownId { .. })
        ));
    }

    #[test]
    fn test_stop_fails_pending() {
        let queue = queue(Arc::default());
        let waiter = queue.pending.register::<SetBlockCmd>(id("codecraft:set_block"));

        queue.stop("client closed");
        assert_eq!(queue.state(), QueueState::Stopped);
        assert!(matches!(waiter.wait(), Err(Error::QueueClosed { .. })));

        queue.stop("again");
        assert_eq!(queue.state(), QueueState::Stopped);
    }

    #[test]
    fn test_transport_failure_is_fatal() {
        let queue = queue(Arc::default());
        let waiter = queue.pending.register::<SetBlockCmd>(id("codecraft:set_block"));
        let conn = Connection::new(std::time::Duration::from_millis(100)).unwrap();

        let (tx, rx) = std::sync::mpsc::channel();
        queue
            .start(&conn, move |e| {
                let _ = tx.send(e.to_string());
            })
            .unwrap();

        let reason = rx.recv().unwrap();
        assert!(reason.contains("closed"));
        assert_eq!(queue.state(), QueueState::Stopped);
        assert!(waiter.wait().unwrap_err().is_cancelled());
        assert!(queue.start(&conn, |_| {}).is_err());
        conn.close().wait().unwrap();
    }
}
