//! Pending command results, keyed by uid.
//!
//! An entry is inserted before its frame leaves the client and removed
//! exactly once: when its result arrives, when its [`ResultWaiter`] is
//! dropped, or when the session tears down. The uid counter lives under
//! the same lock so allocation and insertion cannot interleave.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::codec::ByteBuf;
use crate::error::{Error, Result};
use crate::identifiers::CmdUid;
use crate::protocol::{Cmd, CmdOutcome, CmdResultMsg};
use crate::registry::RegistryIdMaps;
use crate::resource::ResourceId;

// ============================================================================
// Types
// ============================================================================

/// How an entry is settled.
enum Settle<'a> {
    Success {
        payload: &'a [u8],
        maps: &'a RegistryIdMaps,
    },
    Failure(String),
    Abort(Error),
}

type Resolver = Box<dyn for<'a> FnOnce(Settle<'a>) + Send>;

struct Entry {
    kind: ResourceId,
    resolve: Resolver,
    /// Dropped with the entry, which wakes any [`PendingResults::settled`] receiver.
    _settled: Option<oneshot::Sender<()>>,
}

#[derive(Default)]
struct Table {
    next_uid: CmdUid,
    entries: FxHashMap<CmdUid, Entry>,
}

// ============================================================================
// PendingResults
// ============================================================================

/// Table of commands awaiting their result.
#[derive(Default)]
pub(crate) struct PendingResults {
    table: Mutex<Table>,
}

impl fmt::Debug for PendingResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.table.lock();
        f.debug_struct("PendingResults")
            .field("next_uid", &table.next_uid)
            .field("pending", &table.entries.len())
            .finish()
    }
}

impl PendingResults {
    /// Allocates a uid and installs a typed entry for command `C`.
    pub(crate) fn register<C: Cmd>(self: &Arc<Self>, kind: ResourceId) -> ResultWaiter<C::Output> {
        let (tx, rx) = oneshot::channel::<Result<C::Output>>();
        let resolve: Resolver = Box::new(move |settle: Settle<'_>| {
            let result = match settle {
                Settle::Success { payload, maps } => {
                    let mut view = ByteBuf::view(payload);
                    C::parse_result(&mut view, maps)
                }
                Settle::Failure(message) => Err(Error::cmd(message)),
                Settle::Abort(e) => Err(e),
            };
            let _ = tx.send(result);
        });

        let mut table = self.table.lock();
        let uid = table.next_uid;
        table.next_uid = uid.next();
        table.entries.insert(
            uid,
            Entry {
                kind,
                resolve,
                _settled: None,
            },
        );

        ResultWaiter {
            uid,
            rx,
            pending: Arc::downgrade(self),
        }
    }

    /// Settles the entry a result message answers.
    ///
    /// Returns `false` if no entry was waiting (a late result).
    pub(crate) fn resolve(&self, msg: CmdResultMsg, maps: &RegistryIdMaps) -> bool {
        let Some(entry) = self.table.lock().entries.remove(&msg.uid) else {
            return false;
        };

        trace!(uid = %msg.uid, kind = %entry.kind, "Resolving command result");
        match msg.outcome {
            CmdOutcome::Success(payload) => (entry.resolve)(Settle::Success {
                payload: &payload,
                maps,
            }),
            CmdOutcome::Failure(message) => (entry.resolve)(Settle::Failure(message)),
        }
        true
    }

    /// Fails one entry, if still present.
    pub(crate) fn fail(&self, uid: CmdUid, error: Error) {
        if let Some(entry) = self.table.lock().entries.remove(&uid) {
            (entry.resolve)(Settle::Abort(error));
        }
    }

    /// Fails every entry with the error `make` produces.
    pub(crate) fn fail_all(&self, make: impl Fn() -> Error) {
        let drained: Vec<_> = self.table.lock().entries.drain().collect();
        let count = drained.len();

        for (_, entry) in drained {
            (entry.resolve)(Settle::Abort(make()));
        }

        if count > 0 {
            debug!(count, "Failed pending command results");
        }
    }

    /// Returns a receiver that completes once `uid` leaves the table.
    ///
    /// Returns `None` if the entry is already gone.
    pub(crate) fn settled(&self, uid: CmdUid) -> Option<oneshot::Receiver<()>> {
        let mut table = self.table.lock();
        let entry = table.entries.get_mut(&uid)?;
        let (tx, rx) = oneshot::channel();
        entry._settled = Some(tx);
        Some(rx)
    }

    /// Drops an entry without settling it.
    fn forget(&self, uid: CmdUid) {
        self.table.lock().entries.remove(&uid);
    }

    /// Returns the number of pending entries.
    pub(crate) fn len(&self) -> usize {
        self.table.lock().entries.len()
    }
}

// ============================================================================
// ResultWaiter
// ============================================================================

/// Result of one command, delivered when the server answers.
///
/// Await it from async code or call [`ResultWaiter::wait`]. Dropping it
/// withdraws interest: a result arriving later is discarded.
#[must_use = "a ResultWaiter does nothing unless awaited or waited on"]
pub struct ResultWaiter<T> {
    uid: CmdUid,
    rx: oneshot::Receiver<Result<T>>,
    pending: Weak<PendingResults>,
}

impl<T> ResultWaiter<T> {
    /// Returns the uid of the command.
    #[inline]
    #[must_use]
    pub fn uid(&self) -> CmdUid {
        self.uid
    }

    /// Blocks the current thread until the result arrives.
    ///
    /// # Panics
    ///
    /// Panics if called from within an async execution context.
    ///
    /// # Errors
    ///
    /// - [`Error::Cmd`] if the server reported a failure
    /// - [`Error::QueueClosed`] if the session ended first
    /// - [`Error::Cancelled`] if the command was withdrawn
    pub fn wait(mut self) -> Result<T> {
        let rx = std::mem::replace(&mut self.rx, oneshot::channel().1);
        rx.blocking_recv().unwrap_or_else(|_| Err(dropped()))
    }
}

impl<T> Future for ResultWaiter<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|r| r.unwrap_or_else(|_| Err(dropped())))
    }
}

impl<T> Drop for ResultWaiter<T> {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.upgrade() {
            pending.forget(self.uid);
        }
    }
}

impl<T> fmt::Debug for ResultWaiter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultWaiter")
            .field("uid", &self.uid)
            .finish_non_exhaustive()
    }
}

fn dropped() -> Error {
    Error::queue_closed("session ended before the result arrived")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::DynamicValue;
    use crate::protocol::{SendSystemChatCmd, SetBlockCmd};

    fn kind() -> ResourceId {
        ResourceId::parse("codecraft:set_block").unwrap()
    }

    fn success(uid: u32, value: bool) -> CmdResultMsg {
        let mut buf = ByteBuf::new();
        buf.write_dynamic_tuple(&[DynamicValue::Bool(value)], &RegistryIdMaps::new())
            .unwrap();
        CmdResultMsg {
            uid: CmdUid::new(uid),
            outcome: CmdOutcome::Success(buf.into_inner()),
        }
    }

    #[test]
    fn test_uids_are_sequential_from_zero() {
        let pending = Arc::new(PendingResults::default());
        let a = pending.register::<SendSystemChatCmd>(kind());
        let b = pending.register::<SendSystemChatCmd>(kind());
        assert_eq!(a.uid(), CmdUid::new(0));
        assert_eq!(b.uid(), CmdUid::new(1));
        assert_eq!(pending.len(), 2);
    }

    #[test]
    fn test_resolve_parses_typed_result() {
        let pending = Arc::new(PendingResults::default());
        let waiter = pending.register::<SetBlockCmd>(kind());

        assert!(pending.resolve(success(0, true), &RegistryIdMaps::new()));
        assert!(waiter.wait().unwrap());
        assert_eq!(pending.len(), 0);
    }

    #[test]
    fn test_waiter_stays_pending_until_resolved() {
        use tokio_test::{assert_pending, assert_ready, task};

        let pending = Arc::new(PendingResults::default());
        let mut waiter = task::spawn(pending.register::<SetBlockCmd>(kind()));
        assert_pending!(waiter.poll());

        pending.resolve(success(0, false), &RegistryIdMaps::new());
        assert!(waiter.is_woken());
        assert!(!assert_ready!(waiter.poll()).unwrap());
    }

    #[test]
    fn test_failure_reaches_only_its_waiter() {
        let pending = Arc::new(PendingResults::default());
        let first = pending.register::<SetBlockCmd>(kind());
        let second = pending.register::<SetBlockCmd>(kind());

        let failure = CmdResultMsg {
            uid: CmdUid::new(1),
            outcome: CmdOutcome::Failure("no permission".into()),
        };
        assert!(pending.resolve(failure, &RegistryIdMaps::new()));

        let err = second.wait().unwrap_err();
        assert!(err.is_cmd_error());
        assert!(err.to_string().contains("no permission"));
        assert_eq!(pending.len(), 1);
        drop(first);
    }

    #[test]
    fn test_settled_completes_when_entry_leaves() {
        use tokio::sync::oneshot::error::TryRecvError;

        let pending = Arc::new(PendingResults::default());
        let waiter = pending.register::<SetBlockCmd>(kind());
        let mut settled = pending.settled(waiter.uid()).unwrap();
        assert_eq!(settled.try_recv(), Err(TryRecvError::Empty));

        pending.resolve(success(0, true), &RegistryIdMaps::new());
        assert_eq!(settled.try_recv(), Err(TryRecvError::Closed));
        assert!(pending.settled(waiter.uid()).is_none());
    }

    #[test]
    fn test_late_result_is_ignored() {
        let pending = Arc::new(PendingResults::default());
        assert!(!pending.resolve(success(9, true), &RegistryIdMaps::new()));
    }

    #[test]
    fn test_dropped_waiter_removes_entry() {
        let pending = Arc::new(PendingResults::default());
        let waiter = pending.register::<SetBlockCmd>(kind());
        drop(waiter);
        assert_eq!(pending.len(), 0);
        assert!(!pending.resolve(success(0, true), &RegistryIdMaps::new()));
    }

    #[test]
    fn test_fail_all() {
        let pending = Arc::new(PendingResults::default());
        let waiters: Vec<_> = (0..3)
            .map(|_| pending.register::<SetBlockCmd>(kind()))
            .collect();

        pending.fail_all(|| Error::queue_closed("test"));
        assert_eq!(pending.len(), 0);
        for waiter in waiters {
            assert!(matches!(waiter.wait(), Err(Error::QueueClosed { .. })));
        }
    }

    #[tokio::test]
    async fn test_resolve_from_another_thread() {
        let pending = Arc::new(PendingResults::default());
        let waiter = pending.register::<SetBlockCmd>(kind());

        let remote = Arc::clone(&pending);
        std::thread::spawn(move || remote.resolve(success(0, false), &RegistryIdMaps::new()))
            .join()
            .unwrap();

        assert!(!waiter.await.unwrap());
    }
}
