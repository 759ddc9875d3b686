//! Static registries keyed by resource id.
//!
//! A [`Registry`] is filled once through a [`RegistryBuilder`] during
//! startup and is read-only afterwards.
//!
//! # Example
//!
//! ```
//! use codecraft::{Registry, ResourceId};
//!
//! let registry = Registry::builder(ResourceId::codecraft("demo")?)
//!     .register(ResourceId::codecraft("a")?, 1)?
//!     .register(ResourceId::codecraft("b")?, 2)?
//!     .build();
//!
//! assert_eq!(registry.get(&ResourceId::codecraft("b")?), Some(&2));
//! # Ok::<(), codecraft::Error>(())
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use rustc_hash::FxHashMap;

use crate::error::{Error, Result};
use crate::resource::ResourceId;

// ============================================================================
// Registry
// ============================================================================

/// Append-only mapping from resource id to entry, in registration order.
#[derive(Clone)]
pub struct Registry<E> {
    name: ResourceId,
    entries: Vec<(ResourceId, E)>,
    index: FxHashMap<ResourceId, usize>,
}

impl<E> Registry<E> {
    /// Starts building a registry named `name`.
    #[inline]
    #[must_use]
    pub fn builder(name: ResourceId) -> RegistryBuilder<E> {
        RegistryBuilder {
            registry: Self::empty(name),
        }
    }

    /// Creates a registry with no entries.
    #[must_use]
    pub fn empty(name: ResourceId) -> Self {
        Self {
            name,
            entries: Vec::new(),
            index: FxHashMap::default(),
        }
    }

    /// Returns the registry name.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &ResourceId {
        &self.name
    }

    /// Returns the entry registered under `id`.
    #[inline]
    #[must_use]
    pub fn get(&self, id: &ResourceId) -> Option<&E> {
        self.index.get(id).map(|&i| &self.entries[i].1)
    }

    /// Returns `true` if `id` is registered.
    #[inline]
    #[must_use]
    pub fn contains(&self, id: &ResourceId) -> bool {
        self.index.contains_key(id)
    }

    /// Returns the number of entries.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&ResourceId, &E)> {
        self.entries.iter().map(|(id, e)| (id, e))
    }

    /// Iterates ids in registration order.
    pub fn ids(&self) -> impl Iterator<Item = &ResourceId> {
        self.entries.iter().map(|(id, _)| id)
    }
}

impl<E: PartialEq> Registry<E> {
    /// Returns the id `entry` is registered under.
    #[must_use]
    pub fn id_of(&self, entry: &E) -> Option<&ResourceId> {
        self.entries
            .iter()
            .find(|(_, e)| e == entry)
            .map(|(id, _)| id)
    }
}

impl<E> fmt::Debug for Registry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("name", &self.name)
            .field("len", &self.entries.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// RegistryBuilder
// ============================================================================

/// Builder for a [`Registry`].
///
/// Use [`Registry::builder`] to create one.
pub struct RegistryBuilder<E> {
    registry: Registry<E>,
}

impl<E> RegistryBuilder<E> {
    /// Registers `entry` under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Registry`] if `id` is already registered.
    pub fn register(mut self, id: ResourceId, entry: E) -> Result<Self> {
        self.insert(id, entry)?;
        Ok(self)
    }

    /// In-place form of [`RegistryBuilder::register`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Registry`] if `id` is already registered.
    pub fn insert(&mut self, id: ResourceId, entry: E) -> Result<()> {
        let registry = &mut self.registry;
        if registry.index.contains_key(&id) {
            return Err(Error::registry(format!(
                "{id} is already registered in {}",
                registry.name
            )));
        }
        registry.index.insert(id.clone(), registry.entries.len());
        registry.entries.push((id, entry));
        Ok(())
    }

    /// Finishes the registry.
    #[inline]
    #[must_use]
    pub fn build(self) -> Registry<E> {
        self.registry
    }
}

impl<E> fmt::Debug for RegistryBuilder<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RegistryBuilder").field(&self.registry).finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
