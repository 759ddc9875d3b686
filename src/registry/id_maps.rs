//! The six id maps a session negotiates.
//!
//! | Domain | Registry name |
//! |--------|---------------|
//! | commands | `codecraft:cmd` |
//! | messages | `codecraft:msg` |
//! | blocks | `minecraft:block` |
//! | items | `minecraft:item` |
//! | entities | `minecraft:entity_type` |
//! | worlds | `minecraft:dimension` |
//!
//! # Sync Packet
//!
//! ```text
//! resource id (registry name) | varint n | n × (varint id, resource id)
//! ```
//!
//! A sync frame holds any number of packets back to back.

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::block::BlockType;
use crate::codec::ByteBuf;
use crate::error::{Error, Result};
use crate::resource::ResourceId;

use super::id_map::RegistryIdMap;
use super::table::Registry;

// ============================================================================
// Constants
// ============================================================================

/// Registry name of the command id map.
pub const CMD_REGISTRY: (&str, &str) = ("codecraft", "cmd");
/// Registry name of the message id map.
pub const MSG_REGISTRY: (&str, &str) = ("codecraft", "msg");
/// Registry name of the block id map.
pub const BLOCK_REGISTRY: (&str, &str) = ("minecraft", "block");
/// Registry name of the item id map.
pub const ITEM_REGISTRY: (&str, &str) = ("minecraft", "item");
/// Registry name of the entity id map.
pub const ENTITY_REGISTRY: (&str, &str) = ("minecraft", "entity_type");
/// Registry name of the world id map.
pub const WORLD_REGISTRY: (&str, &str) = ("minecraft", "dimension");

/// Block types known to the client build.
pub type BlockTypes = Registry<Arc<BlockType>>;

/// Cache file layout: registry name to (entry name to id).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub(crate) struct CacheTables(BTreeMap<ResourceId, BTreeMap<ResourceId, i32>>);

// ============================================================================
// RegistryIdMaps
// ============================================================================

/// Per-session id maps for every synchronized registry.
#[derive(Clone)]
pub struct RegistryIdMaps {
    cmd: RegistryIdMap,
    msg: RegistryIdMap,
    block: RegistryIdMap,
    item: RegistryIdMap,
    entity: RegistryIdMap,
    world: RegistryIdMap,
    block_types: Arc<BlockTypes>,
}

impl Default for RegistryIdMaps {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryIdMaps {
    /// Creates six empty, unfrozen maps and no declared block types.
    #[must_use]
    pub fn new() -> Self {
        let block_types = Registry::empty(registry_name(BLOCK_REGISTRY));
        Self::with_block_types(Arc::new(block_types))
    }

    /// Creates six empty maps resolving declared block properties from
    /// `block_types`.
    #[must_use]
    pub fn with_block_types(block_types: Arc<BlockTypes>) -> Self {
        Self {
            cmd: RegistryIdMap::new(registry_name(CMD_REGISTRY)),
            msg: RegistryIdMap::new(registry_name(MSG_REGISTRY)),
            block: RegistryIdMap::new(registry_name(BLOCK_REGISTRY)),
            item: RegistryIdMap::new(registry_name(ITEM_REGISTRY)),
            entity: RegistryIdMap::new(registry_name(ENTITY_REGISTRY)),
            world: RegistryIdMap::new(registry_name(WORLD_REGISTRY)),
            block_types,
        }
    }

    /// Command ids.
    #[inline]
    #[must_use]
    pub fn cmd(&self) -> &RegistryIdMap {
        &self.cmd
    }

    /// Message ids.
    #[inline]
    #[must_use]
    pub fn msg(&self) -> &RegistryIdMap {
        &self.msg
    }

    /// Block ids.
    #[inline]
    #[must_use]
    pub fn block(&self) -> &RegistryIdMap {
        &self.block
    }

    /// Item ids.
    #[inline]
    #[must_use]
    pub fn item(&self) -> &RegistryIdMap {
        &self.item
    }

    /// Entity type ids.
    #[inline]
    #[must_use]
    pub fn entity(&self) -> &RegistryIdMap {
        &self.entity
    }

    /// World (dimension) ids.
    #[inline]
    #[must_use]
    pub fn world(&self) -> &RegistryIdMap {
        &self.world
    }

    /// Returns the map for a registry name.
    #[must_use]
    pub fn get(&self, registry: &ResourceId) -> Option<&RegistryIdMap> {
        self.iter().find(|m| m.registry() == registry)
    }

    /// Returns the map for a registry name, mutably.
    pub fn get_mut(&mut self, registry: &ResourceId) -> Option<&mut RegistryIdMap> {
        self.iter_mut().find(|m| m.registry() == registry)
    }

    /// Command ids, mutably.
    #[inline]
    pub fn cmd_mut(&mut self) -> &mut RegistryIdMap {
        &mut self.cmd
    }

    /// Message ids, mutably.
    #[inline]
    pub fn msg_mut(&mut self) -> &mut RegistryIdMap {
        &mut self.msg
    }

    /// Block ids, mutably.
    #[inline]
    pub fn block_mut(&mut self) -> &mut RegistryIdMap {
        &mut self.block
    }

    /// World ids, mutably.
    #[inline]
    pub fn world_mut(&mut self) -> &mut RegistryIdMap {
        &mut self.world
    }

    /// Iterates the six maps.
    pub fn iter(&self) -> impl Iterator<Item = &RegistryIdMap> {
        [
            &self.cmd,
            &self.msg,
            &self.block,
            &self.item,
            &self.entity,
            &self.world,
        ]
        .into_iter()
    }

    fn iter_mut(&mut self) -> impl Iterator<Item = &mut RegistryIdMap> {
        [
            &mut self.cmd,
            &mut self.msg,
            &mut self.block,
            &mut self.item,
            &mut self.entity,
            &mut self.world,
        ]
        .into_iter()
    }

    /// Freezes every map.
    pub fn freeze(&mut self) {
        self.iter_mut().for_each(|m| m.freeze());
    }

    /// Returns `true` if every map is frozen.
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.iter().all(|m| m.is_frozen())
    }

    /// Returns the declared type of a block, or an undeclared one.
    #[must_use]
    pub fn block_type(&self, id: &ResourceId) -> Arc<BlockType> {
        self.block_types
            .get(id)
            .cloned()
            .unwrap_or_else(|| Arc::new(BlockType::new(id.clone())))
    }

    /// Returns the declared block types.
    #[inline]
    #[must_use]
    pub fn block_types(&self) -> &Arc<BlockTypes> {
        &self.block_types
    }

    // ========================================================================
    // Sync Packets
    // ========================================================================

    /// Reads sync packets until `buf` is exhausted.
    ///
    /// Packets for registries this client does not track are skipped.
    ///
    /// # Errors
    ///
    /// Any decode error, or [`Error::Registry`] for a duplicate id/name.
    pub fn read_sync_packets<S: AsRef<[u8]>>(&mut self, buf: &mut ByteBuf<S>) -> Result<()> {
        while buf.has_remaining() {
            self.read_sync_packet(buf)?;
        }
        Ok(())
    }

    /// Reads one sync packet.
    ///
    /// # Errors
    ///
    /// Any decode error, or [`Error::Registry`] for a duplicate id/name.
    pub fn read_sync_packet<S: AsRef<[u8]>>(&mut self, buf: &mut ByteBuf<S>) -> Result<()> {
        let name = buf.read_resource_id()?;
        let count = buf.read_varint()?;
        let count = usize::try_from(count)
            .map_err(|_| Error::protocol(format!("negative entry count {count} for {name}")))?;

        debug!(registry = %name, count, "Reading registry id map");

        let mut target = self.get_mut(&name);
        if target.is_none() {
            warn!(registry = %name, "Sync packet for unknown registry, skipping");
        }

        for _ in 0..count {
            let id = buf.read_varint()?;
            let entry = buf.read_resource_id()?;
            if let Some(map) = target.as_deref_mut() {
                map.put(id, entry)?;
            }
        }
        Ok(())
    }

    /// Writes every map as sync packets, ids ascending.
    pub fn write_sync_packets(&self, buf: &mut ByteBuf) {
        for map in self.iter() {
            buf.write_resource_id(map.registry());
            buf.write_varint(map.len() as i32);
            for (id, name) in map.sorted() {
                buf.write_varint(id);
                buf.write_resource_id(name);
            }
        }
    }

    // ========================================================================
    // Cache Tables
    // ========================================================================

    pub(crate) fn to_tables(&self) -> CacheTables {
        let tables = self
            .iter()
            .map(|map| {
                let entries = map.iter().map(|(id, name)| (name.clone(), id)).collect();
                (map.registry().clone(), entries)
            })
            .collect();
        CacheTables(tables)
    }

    pub(crate) fn from_tables(tables: &CacheTables, block_types: Arc<BlockTypes>) -> Result<Self> {
        let mut maps = Self::with_block_types(block_types);
        for map in maps.iter_mut() {
            let entries = tables.0.get(map.registry()).ok_or_else(|| {
                Error::invalid_data(format!("cache has no table for {}", map.registry()))
            })?;
            for (name, &id) in entries {
                map.put(id, name.clone())?;
            }
        }
        maps.freeze();
        Ok(maps)
    }
}

impl fmt::Debug for RegistryIdMaps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("RegistryIdMaps");
        for map in self.iter() {
            s.field(map.registry().path(), &map.len());
        }
        s.finish_non_exhaustive()
    }
}

fn registry_name((namespace, path): (&'static str, &'static str)) -> ResourceId {
    ResourceId::from_static(namespace, path)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ResourceId {
        ResourceId::parse(s).unwrap()
    }

    fn sample() -> RegistryIdMaps {
        let mut maps = RegistryIdMaps::new();
        maps.cmd_mut().put(0, id("codecraft:send_system_chat")).unwrap();
        maps.cmd_mut().put(1, id("codecraft:set_block")).unwrap();
        maps.msg_mut().put(0, id("codecraft:cmd_result")).unwrap();
        maps.block_mut().put(0, id("air")).unwrap();
        maps.block_mut().put(1, id("stone")).unwrap();
        maps.world_mut().put(0, id("overworld")).unwrap();
        maps
    }

    #[test]
    fn test_registry_names() {
        let maps = RegistryIdMaps::new();
        let names: Vec<_> = maps.iter().map(|m| m.registry().to_string()).collect();
        assert_eq!(
            names,
            vec![
                "codecraft:cmd",
                "codecraft:msg",
                "minecraft:block",
                "minecraft:item",
                "minecraft:entity_type",
                "minecraft:dimension",
            ]
        );
    }

    #[test]
    fn test_sync_packets_round_trip() {
        let source = sample();
        let mut buf = ByteBuf::new();
        source.write_sync_packets(&mut buf);

        let mut maps = RegistryIdMaps::new();
        maps.read_sync_packets(&mut buf).unwrap();
        maps.freeze();

        assert!(maps.is_frozen());
        assert_eq!(maps.cmd().id_of(&id("codecraft:set_block")), Some(1));
        assert_eq!(maps.block().name_of(1), Some(&id("stone")));
        assert!(maps.item().is_empty());
    }

    #[test]
    fn test_unknown_registry_is_skipped() {
        let mut buf = ByteBuf::new();
        buf.write_resource_id(&id("minecraft:biome"));
        buf.write_varint(1);
        buf.write_varint(0);
        buf.write_resource_id(&id("plains"));
        buf.write_resource_id(&id("minecraft:item"));
        buf.write_varint(1);
        buf.write_varint(4);
        buf.write_resource_id(&id("stick"));

        let mut maps = RegistryIdMaps::new();
        maps.read_sync_packets(&mut buf).unwrap();
        assert_eq!(maps.item().name_of(4), Some(&id("stick")));
        assert_eq!(maps.iter().map(|m| m.len()).sum::<usize>(), 1);
    }

    #[test]
    fn test_truncated_packet_fails() {
        let mut buf = ByteBuf::new();
        buf.write_resource_id(&id("minecraft:item"));
        buf.write_varint(2);
        buf.write_varint(0);
        buf.write_resource_id(&id("stick"));

        let mut maps = RegistryIdMaps::new();
        assert!(maps.read_sync_packets(&mut buf).is_err());
    }

    #[test]
    fn test_tables_round_trip() {
        let tables = sample().to_tables();
        let maps = RegistryIdMaps::from_tables(&tables, RegistryIdMaps::new().block_types().clone())
            .unwrap();
        assert!(maps.is_frozen());
        assert_eq!(maps.world().id_of(&id("overworld")), Some(0));
        assert_eq!(maps.to_tables(), tables);
    }

    #[test]
    fn test_tables_serialize_as_nested_objects() {
        let json = serde_json::to_value(sample().to_tables()).unwrap();
        assert_eq!(json["minecraft:dimension"]["minecraft:overworld"], 0);

        let tables: CacheTables = serde_json::from_value(json).unwrap();
        assert_eq!(tables, sample().to_tables());
    }

    #[test]
    fn test_tables_missing_domain() {
        let mut tables = sample().to_tables();
        tables.0.remove(&id("minecraft:entity_type"));
        let result = RegistryIdMaps::from_tables(&tables, RegistryIdMaps::new().block_types().clone());
        assert!(result.is_err());
    }

    #[test]
    fn test_block_type_fallback() {
        let maps = RegistryIdMaps::new();
        let kind = maps.block_type(&id("stone"));
        assert_eq!(kind.id(), &id("stone"));
        assert_eq!(kind.properties().count(), 0);
    }
}
