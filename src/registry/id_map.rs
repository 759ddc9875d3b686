//! Per-session integer ids for registry entries.
//!
//! The server assigns every registry entry a compact integer for the
//! lifetime of a session. [`IdMap`] stores that assignment in both
//! directions and is frozen once the handshake is over.

// ============================================================================
// Imports
// ============================================================================

use std::ops::{Deref, DerefMut};

use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::resource::ResourceId;

// ============================================================================
// IdMap
// ============================================================================

#[derive(Debug, Clone)]
enum Forward {
    Sparse(FxHashMap<i32, ResourceId>),
    Dense(Vec<ResourceId>),
}

/// Bidirectional `i32 <-> ResourceId` map.
///
/// After [`IdMap::freeze`], ids that form exactly `0..len` are stored in
/// a `Vec` for direct indexing.
#[derive(Debug, Clone)]
pub struct IdMap {
    forward: Forward,
    reverse: FxHashMap<ResourceId, i32>,
    frozen: bool,
}

impl Default for IdMap {
    fn default() -> Self {
        Self::new()
    }
}

impl IdMap {
    /// Creates an empty, unfrozen map.
    #[must_use]
    pub fn new() -> Self {
        Self {
            forward: Forward::Sparse(FxHashMap::default()),
            reverse: FxHashMap::default(),
            frozen: false,
        }
    }

    /// Adds one assignment.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidState`] if the map is frozen
    /// - [`Error::Registry`] if `id` or `name` is already assigned
    pub fn put(&mut self, id: i32, name: ResourceId) -> Result<()> {
        let Forward::Sparse(forward) = &mut self.forward else {
            return Err(Error::invalid_state("id map is frozen"));
        };
        if self.frozen {
            return Err(Error::invalid_state("id map is frozen"));
        }
        if let Some(existing) = forward.get(&id) {
            return Err(Error::registry(format!("id {id} is taken by {existing}")));
        }
        if let Some(existing) = self.reverse.get(&name) {
            return Err(Error::registry(format!("{name} already has id {existing}")));
        }

        forward.insert(id, name.clone());
        self.reverse.insert(name, id);
        Ok(())
    }

    /// Freezes the map. Calling it again does nothing.
    pub fn freeze(&mut self) {
        if self.frozen {
            return;
        }
        self.frozen = true;

        let Forward::Sparse(forward) = &mut self.forward else {
            return;
        };
        let len = forward.len();
        let dense = forward
            .keys()
            .all(|&id| usize::try_from(id).is_ok_and(|i| i < len));
        if !dense {
            return;
        }

        let mut slots: Vec<Option<ResourceId>> = vec![None; len];
        for (id, name) in forward.drain() {
            slots[id as usize] = Some(name);
        }
        self.forward = Forward::Dense(slots.into_iter().flatten().collect());
    }

    /// Returns the name assigned to `id`.
    #[must_use]
    pub fn name_of(&self, id: i32) -> Option<&ResourceId> {
        match &self.forward {
            Forward::Sparse(map) => map.get(&id),
            Forward::Dense(names) => usize::try_from(id).ok().and_then(|i| names.get(i)),
        }
    }

    /// Returns the id assigned to `name`.
    #[inline]
    #[must_use]
    pub fn id_of(&self, name: &ResourceId) -> Option<i32> {
        self.reverse.get(name).copied()
    }

    /// Returns the number of assignments.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.reverse.len()
    }

    /// Returns `true` if nothing is assigned.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reverse.is_empty()
    }

    /// Returns `true` once [`IdMap::freeze`] was called.
    #[inline]
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Returns `true` if the forward table is a dense vector.
    #[inline]
    #[must_use]
    pub fn is_dense(&self) -> bool {
        matches!(self.forward, Forward::Dense(_))
    }

    /// Iterates `(id, name)` pairs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (i32, &ResourceId)> {
        self.reverse.iter().map(|(name, &id)| (id, name))
    }

    /// Returns `(id, name)` pairs sorted by id.
    #[must_use]
    pub fn sorted(&self) -> Vec<(i32, &ResourceId)> {
        let mut pairs: Vec<_> = self.iter().collect();
        pairs.sort_unstable_by_key(|(id, _)| *id);
        pairs
    }
}

// ============================================================================
// RegistryIdMap
// ============================================================================

/// An [`IdMap`] tagged with the name of the registry it covers.
#[derive(Debug, Clone)]
pub struct RegistryIdMap {
    registry: ResourceId,
    map: IdMap,
}

impl RegistryIdMap {
    /// Creates an empty map for `registry`.
    #[must_use]
    pub fn new(registry: ResourceId) -> Self {
        Self {
            registry,
            map: IdMap::new(),
        }
    }

    /// Returns the registry name.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &ResourceId {
        &self.registry
    }
}

impl Deref for RegistryIdMap {
    type Target = IdMap;

    fn deref(&self) -> &IdMap {
        &self.map
    }
}

impl DerefMut for RegistryIdMap {
    fn deref_mut(&mut self) -> &mut IdMap {
        &mut self.map
    }
}

// ============================================================================
// Tests
// ============================================================================
