//! Process-wide current client.
//!
//! The first client constructed becomes the default. [`Client::enter`]
//! pushes an override that its guard pops again. Only weak references
//! are kept, so the slot never keeps a client alive.

// ============================================================================
// Imports
// ============================================================================

use std::sync::{Arc, Weak};

use parking_lot::{Mutex, const_mutex};

use crate::error::{Error, Result};

use super::core::{Client, ClientInner};

// ============================================================================
// Slot
// ============================================================================

struct Slot {
    default: Option<Weak<ClientInner>>,
    overrides: Vec<Weak<ClientInner>>,
}

static SLOT: Mutex<Slot> = const_mutex(Slot {
    default: None,
    overrides: Vec::new(),
});

/// Offers `inner` as the default client; kept only if there is none alive.
pub(crate) fn offer_default(inner: &Arc<ClientInner>) {
    let mut slot = SLOT.lock();
    let occupied = slot
        .default
        .as_ref()
        .is_some_and(|d| d.strong_count() > 0);
    if !occupied {
        slot.default = Some(Arc::downgrade(inner));
    }
}

/// Returns the top override, else the default.
pub(crate) fn current() -> Result<Client> {
    let slot = SLOT.lock();
    slot.overrides
        .iter()
        .rev()
        .chain(slot.default.iter())
        .find_map(Weak::upgrade)
        .map(Client::from_inner)
        .ok_or(Error::NoCurrentClient)
}

// ============================================================================
// CurrentGuard
// ============================================================================

/// Keeps a client current until dropped.
///
/// Returned by [`Client::enter`].
#[must_use = "the client stops being current when the guard is dropped"]
#[derive(Debug)]
pub struct CurrentGuard {
    inner: Weak<ClientInner>,
}

impl CurrentGuard {
    pub(crate) fn push(inner: &Arc<ClientInner>) -> Self {
        let weak = Arc::downgrade(inner);
        SLOT.lock().overrides.push(weak.clone());
        Self { inner: weak }
    }
}

impl Drop for CurrentGuard {
    fn drop(&mut self) {
        let mut slot = SLOT.lock();
        if let Some(i) = slot
            .overrides
            .iter()
            .rposition(|w| Weak::ptr_eq(w, &self.inner))
        {
            slot.overrides.remove(i);
        }
    }
}
