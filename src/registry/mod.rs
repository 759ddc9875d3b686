//! Static registries and per-session id maps.
//!
//! | Type | Lifetime | Purpose |
//! |------|----------|---------|
//! | [`Registry`] | process | entries known to this build, keyed by [`ResourceId`](crate::ResourceId) |
//! | [`IdMap`] | session | integer ids the server assigned |
//! | [`RegistryIdMaps`] | session | the six synchronized id maps |
//! | [`IdMapCache`] | disk | id maps keyed by content hash |

// ============================================================================
// Submodules
// ============================================================================

mod cache;
mod id_map;
mod id_maps;
mod table;

// ============================================================================
// Re-exports
// ============================================================================

pub use cache::{DEFAULT_CACHE_DIR, IdMapCache, cache_key};
pub use id_map::{IdMap, RegistryIdMap};
pub use id_maps::{
    BLOCK_REGISTRY, BlockTypes, CMD_REGISTRY, ENTITY_REGISTRY, ITEM_REGISTRY, MSG_REGISTRY,
    RegistryIdMaps, WORLD_REGISTRY,
};
pub use table::{Registry, RegistryBuilder};
