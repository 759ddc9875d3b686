//! Type-safe identifiers.
//!
//! Newtype wrappers keep per-session correlation ids from mixing with the
//! integer ids of the registry id maps.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

// ============================================================================
// CmdUid
// ============================================================================

/// Per-session command correlation id.
///
/// Allocated from a counter starting at 0; each serialized command gets
/// exactly one. Results from the server carry it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct CmdUid(u32);

impl CmdUid {
    /// Creates a uid from its raw value.
    #[inline]
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u32(&self) -> u32 {
        self.0
    }

    /// Returns the uid following this one.
    #[inline]
    #[must_use]
    pub(crate) const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    /// Returns the value as written on the wire (a non-negative varint).
    #[inline]
    #[must_use]
    pub(crate) const fn to_wire(self) -> i32 {
        (self.0 & i32::MAX as u32) as i32
    }
}

impl From<u32> for CmdUid {
    #[inline]
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl fmt::Display for CmdUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================
