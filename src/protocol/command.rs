//! Commands sent to the server.
//!
//! # Frame Layout
//!
//! ```text
//! varint cmd id (cmd id map) | varint uid | payload
//! ```
//!
//! A frame may hold several commands back to back; the server splits
//! them by reading each payload in full.
//!
//! # Built-in Commands
//!
//! | Kind | Type | Output |
//! |------|------|--------|
//! | `codecraft:send_system_chat` | [`SendSystemChatCmd`] | `()` |
//! | `codecraft:set_block` | [`SetBlockCmd`] | `bool` |
//! | `codecraft:get_block` | [`GetBlockCmd`] | `(Block, Option<Nbt>)` |

// ============================================================================
// Imports
// ============================================================================

use std::any::type_name;

use bitflags::bitflags;

use crate::block::Block;
use crate::codec::{ByteBuf, DynamicValue, Nbt, Vec3i};
use crate::error::{Error, Result};
use crate::identifiers::CmdUid;
use crate::registry::{CMD_REGISTRY, Registry, RegistryIdMaps};
use crate::resource::ResourceId;

// ============================================================================
// Cmd
// ============================================================================

/// A command the server can execute.
///
/// Implementors write their payload and decode the success payload of
/// the matching result. The uid and command id are written by the
/// runner, never by the command.
pub trait Cmd: Send + 'static {
    /// Value produced by a successful result.
    type Output: Send + 'static;

    /// Returns the command kind, as registered in `codecraft:cmd`.
    fn kind(&self) -> ResourceId;

    /// Writes the command-specific payload.
    ///
    /// # Errors
    ///
    /// Returns an error if a value cannot be encoded, e.g. an id the
    /// session's id maps do not know.
    fn write_payload(&self, buf: &mut ByteBuf, maps: &RegistryIdMaps) -> Result<()>;

    /// Decodes the success payload of this command's result.
    ///
    /// # Errors
    ///
    /// Returns a decode error if the payload does not match `Output`.
    fn parse_result(buf: &mut ByteBuf<&[u8]>, maps: &RegistryIdMaps) -> Result<Self::Output>
    where
        Self: Sized;
}

/// Writes one command (id, uid, payload) into `buf`.
///
/// Nothing is appended when encoding fails.
pub(crate) fn write_cmd<C: Cmd>(
    buf: &mut ByteBuf,
    cmd: &C,
    uid: CmdUid,
    maps: &RegistryIdMaps,
) -> Result<()> {
    let mut scratch = ByteBuf::new();
    scratch.write_id_mapped(maps.cmd(), &cmd.kind())?;
    scratch.write_varint(uid.to_wire());
    cmd.write_payload(&mut scratch, maps)?;
    buf.write_bytes(scratch.as_slice());
    Ok(())
}

// ============================================================================
// Command Registry
// ============================================================================

/// Entry of the command registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CmdEntry {
    type_name: &'static str,
}

impl CmdEntry {
    /// Creates the entry for command type `C`.
    #[inline]
    #[must_use]
    pub fn of<C: Cmd>() -> Self {
        Self {
            type_name: type_name::<C>(),
        }
    }

    /// Returns the Rust type name of the command.
    #[inline]
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

/// Registry of command kinds known to this build.
pub type CmdRegistry = Registry<CmdEntry>;

/// Kind of [`SendSystemChatCmd`].
pub const SEND_SYSTEM_CHAT: (&str, &str) = ("codecraft", "send_system_chat");
/// Kind of [`SetBlockCmd`].
pub const SET_BLOCK: (&str, &str) = ("codecraft", "set_block");
/// Kind of [`GetBlockCmd`].
pub const GET_BLOCK: (&str, &str) = ("codecraft", "get_block");

/// Returns a builder pre-filled with the built-in commands.
///
/// # Errors
///
/// Never fails for the built-in set; the signature follows
/// [`crate::RegistryBuilder::register`].
pub fn builtin_cmds() -> Result<crate::registry::RegistryBuilder<CmdEntry>> {
    let (namespace, path) = CMD_REGISTRY;
    Registry::builder(ResourceId::from_static(namespace, path))
        .register(kind(SEND_SYSTEM_CHAT), CmdEntry::of::<SendSystemChatCmd>())?
        .register(kind(SET_BLOCK), CmdEntry::of::<SetBlockCmd>())?
        .register(kind(GET_BLOCK), CmdEntry::of::<GetBlockCmd>())
}

fn kind((namespace, path): (&'static str, &'static str)) -> ResourceId {
    ResourceId::from_static(namespace, path)
}

// ============================================================================
// SendSystemChatCmd
// ============================================================================

/// Broadcasts a system chat message to every player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendSystemChatCmd {
    message: String,
}

impl SendSystemChatCmd {
    /// Creates the command.
    #[inline]
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Returns the message text.
    #[inline]
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl Cmd for SendSystemChatCmd {
    type Output = ();

    fn kind(&self) -> ResourceId {
        kind(SEND_SYSTEM_CHAT)
    }

    fn write_payload(&self, buf: &mut ByteBuf, _maps: &RegistryIdMaps) -> Result<()> {
        buf.write_string(&self.message);
        Ok(())
    }

    fn parse_result(_buf: &mut ByteBuf<&[u8]>, _maps: &RegistryIdMaps) -> Result<()> {
        Ok(())
    }
}

// ============================================================================
// SetBlockFlags
// ============================================================================

bitflags! {
    /// Flag byte of [`SetBlockCmd`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SetBlockFlags: u8 {
        /// Send the full block state instead of the bare block id.
        const SET_STATE = 1;
        /// Apply block entity NBT.
        const SET_NBT = 1 << 1;
        /// Run on the server tick thread.
        const ON_TICK = 1 << 2;
        /// Notify neighbours.
        const BLOCK_UPDATE = 1 << 3;
        /// Only replace air.
        const KEEP = 1 << 4;
        /// Destroy the previous block first.
        const DESTROY = 1 << 5;
        /// Drop the destroyed block as an item.
        const DROP_ITEM = 1 << 6;
    }
}

// ============================================================================
// SetBlockCmd
// ============================================================================

/// Places a block in a world.
///
/// The result is `true` if the server changed anything.
#[derive(Debug, Clone, PartialEq)]
pub struct SetBlockCmd {
    world: ResourceId,
    pos: Vec3i,
    block: Block,
    flags: SetBlockFlags,
}

impl SetBlockCmd {
    /// Creates the command.
    #[must_use]
    pub fn new(world: ResourceId, pos: Vec3i, block: Block, flags: SetBlockFlags) -> Self {
        Self {
            world,
            pos,
            block,
            flags,
        }
    }

    /// Returns the flags.
    #[inline]
    #[must_use]
    pub fn flags(&self) -> SetBlockFlags {
        self.flags
    }
}

impl Cmd for SetBlockCmd {
    type Output = bool;

    fn kind(&self) -> ResourceId {
        kind(SET_BLOCK)
    }

    fn write_payload(&self, buf: &mut ByteBuf, maps: &RegistryIdMaps) -> Result<()> {
        buf.write_id_mapped(maps.world(), &self.world)?;
        buf.write_vec3i(&self.pos);
        buf.write_u8(self.flags.bits());

        if self.flags.contains(SetBlockFlags::SET_STATE) {
            buf.write_block_state(&self.block, maps)
        } else {
            buf.write_id_mapped(maps.block(), self.block.id())
        }
    }

    fn parse_result(buf: &mut ByteBuf<&[u8]>, maps: &RegistryIdMaps) -> Result<bool> {
        let values = buf.read_dynamic_tuple(maps)?;
        values
            .first()
            .and_then(DynamicValue::as_bool)
            .ok_or_else(|| Error::invalid_data("set_block result is not a bool"))
    }
}

// ============================================================================
// GetBlockCmd
// ============================================================================

/// Reads the block state at a position, optionally with its block entity
/// NBT.
///
/// The result tuple is the block state, followed, when NBT was asked
/// for, by a presence flag and the tag itself if present.
#[derive(Debug, Clone, PartialEq)]
pub struct GetBlockCmd {
    world: ResourceId,
    pos: Vec3i,
    nbt: bool,
}

impl GetBlockCmd {
    /// Creates the command.
    #[must_use]
    pub fn new(world: ResourceId, pos: Vec3i, nbt: bool) -> Self {
        Self { world, pos, nbt }
    }

    /// Returns `true` if block entity NBT is requested.
    #[inline]
    #[must_use]
    pub fn wants_nbt(&self) -> bool {
        self.nbt
    }
}

impl Cmd for GetBlockCmd {
    type Output = (Block, Option<Nbt>);

    fn kind(&self) -> ResourceId {
        kind(GET_BLOCK)
    }

    fn write_payload(&self, buf: &mut ByteBuf, maps: &RegistryIdMaps) -> Result<()> {
        buf.write_id_mapped(maps.world(), &self.world)?;
        buf.write_vec3i(&self.pos);
        buf.write_bool(self.nbt);
        Ok(())
    }

    fn parse_result(
        buf: &mut ByteBuf<&[u8]>,
        maps: &RegistryIdMaps,
    ) -> Result<(Block, Option<Nbt>)> {
        let mut values = buf.read_dynamic_tuple(maps)?.into_iter();
        let Some(DynamicValue::BlockState(block)) = values.next() else {
            return Err(Error::invalid_data("get_block result has no block state"));
        };

        let nbt = match (values.next(), values.next(), values.next()) {
            (None, None, None) | (Some(DynamicValue::Bool(false)), None, None) => None,
            (Some(DynamicValue::Bool(true)), Some(DynamicValue::Nbt(tag)), None) => tag,
            _ => return Err(Error::invalid_data("get_block result has a malformed NBT part")),
        };
        Ok((block, nbt))
    }
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

    fn maps() -> RegistryIdMaps {
        let mut maps = RegistryIdMaps::new();
        maps.cmd_mut().put(4, id("codecraft:send_system_chat")).unwrap();
        maps.cmd_mut().put(5, id("codecraft:set_block")).unwrap();
        maps.cmd_mut().put(6, id("codecraft:get_block")).unwrap();
        maps.block_mut().put(0, id("air")).unwrap();
        maps.block_mut().put(1, id("stone")).unwrap();
        maps.world_mut().put(2, id("overworld")).unwrap();
        maps.freeze();
        maps
    }

    #[test]
    fn test_builtin_registry() {
        let registry = builtin_cmds().unwrap().build();
        assert_eq!(registry.name().to_string(), "codecraft:cmd");
        assert_eq!(
            registry.id_of(&CmdEntry::of::<SetBlockCmd>()),
            Some(&id("codecraft:set_block"))
        );
        assert_eq!(
            registry.id_of(&CmdEntry::of::<GetBlockCmd>()),
            Some(&id("codecraft:get_block"))
        );
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn test_chat_frame_layout() {
        let mut buf = ByteBuf::new();
        let cmd = SendSystemChatCmd::new("hi");
        write_cmd(&mut buf, &cmd, CmdUid::new(3), &maps()).unwrap();
        assert_eq!(buf.as_slice(), &[0x08, 0x06, 0x02, b'h', b'i']);
    }

    #[test]
    fn test_set_block_bare_id() {
        let cmd = SetBlockCmd::new(
            id("overworld"),
            Vec3i::new(1, -1, 0),
            Block::new(id("stone")),
            SetBlockFlags::BLOCK_UPDATE,
        );
        let mut buf = ByteBuf::new();
        cmd.write_payload(&mut buf, &maps()).unwrap();

        assert_eq!(buf.read_varint().unwrap(), 2);
        assert_eq!(buf.read_vec3i().unwrap(), Vec3i::new(1, -1, 0));
        assert_eq!(buf.read_u8().unwrap(), 8);
        assert_eq!(buf.read_varint().unwrap(), 1);
        assert!(!buf.has_remaining());
    }

    #[test]
    fn test_set_block_with_state() {
        let maps = maps();
        let cmd = SetBlockCmd::new(
            id("overworld"),
            Vec3i::new(0, 64, 0),
            Block::new(id("stone")),
            SetBlockFlags::SET_STATE | SetBlockFlags::KEEP,
        );
        let mut buf = ByteBuf::new();
        cmd.write_payload(&mut buf, &maps).unwrap();

        buf.read_varint().unwrap();
        buf.read_vec3i().unwrap();
        assert_eq!(buf.read_u8().unwrap(), 17);
        assert_eq!(buf.read_block_state(&maps).unwrap().id(), &id("stone"));
    }

    #[test]
    fn test_unmapped_world_writes_nothing() {
        let cmd = SetBlockCmd::new(
            id("the_nether"),
            Vec3i::new(0, 0, 0),
            Block::new(id("stone")),
            SetBlockFlags::empty(),
        );
        let mut buf = ByteBuf::new();
        assert!(write_cmd(&mut buf, &cmd, CmdUid::new(0), &maps()).is_err());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_set_block_result() {
        let maps = maps();
        let mut buf = ByteBuf::new();
        buf.write_dynamic_tuple(&[DynamicValue::Bool(true)], &maps)
            .unwrap();
        let mut view = ByteBuf::view(buf.as_slice());
        assert!(SetBlockCmd::parse_result(&mut view, &maps).unwrap());

        let mut buf = ByteBuf::new();
        buf.write_dynamic_tuple(&[], &maps).unwrap();
        let mut view = ByteBuf::view(buf.as_slice());
        assert!(SetBlockCmd::parse_result(&mut view, &maps).is_err());
    }

    #[test]
    fn test_flags() {
        let mut flags = SetBlockFlags::SET_STATE | SetBlockFlags::DESTROY;
        assert!(flags.contains(SetBlockFlags::DESTROY));
        flags.set(SetBlockFlags::DESTROY, false);
        flags |= SetBlockFlags::DROP_ITEM;
        assert_eq!(flags.bits(), 65);
        assert_eq!(format!("{flags:?}"), "SetBlockFlags(SET_STATE | DROP_ITEM)");
    }

    fn get_block_result(
        values: &[DynamicValue],
        maps: &RegistryIdMaps,
    ) -> Result<(Block, Option<Nbt>)> {
        let mut buf = ByteBuf::new();
        buf.write_dynamic_tuple(values, maps).unwrap();
        let mut view = ByteBuf::view(buf.as_slice());
        GetBlockCmd::parse_result(&mut view, maps)
    }

    #[test]
    fn test_get_block_frame_layout() {
        let cmd = GetBlockCmd::new(id("overworld"), Vec3i::new(3, 70, -2), true);
        let mut buf = ByteBuf::new();
        write_cmd(&mut buf, &cmd, CmdUid::new(0), &maps()).unwrap();

        assert_eq!(buf.read_varint().unwrap(), 6);
        assert_eq!(buf.read_varint().unwrap(), 0);
        assert_eq!(buf.read_varint().unwrap(), 2);
        assert_eq!(buf.read_vec3i().unwrap(), Vec3i::new(3, 70, -2));
        assert!(buf.read_bool().unwrap());
        assert!(!buf.has_remaining());
    }

    #[test]
    fn test_get_block_result_with_nbt() {
        let maps = maps();
        let stone = Block::new(id("stone"));
        let mut tag = crate::codec::NbtCompound::new();
        tag.insert("Items".to_string(), Nbt::List(Vec::new()));

        let (block, nbt) = get_block_result(
            &[
                DynamicValue::BlockState(stone.clone()),
                DynamicValue::Bool(true),
                DynamicValue::Nbt(Some(Nbt::Compound(tag.clone()))),
            ],
            &maps,
        )
        .unwrap();
        assert_eq!(block.id(), stone.id());
        assert_eq!(nbt, Some(Nbt::Compound(tag)));
    }

    #[test]
    fn test_get_block_result_without_nbt() {
        let maps = maps();
        let air = DynamicValue::BlockState(Block::new(id("air")));

        let (block, nbt) = get_block_result(&[air.clone()], &maps).unwrap();
        assert_eq!(block.id(), &id("air"));
        assert_eq!(nbt, None);

        let (_, nbt) = get_block_result(&[air.clone(), DynamicValue::Bool(false)], &maps).unwrap();
        assert_eq!(nbt, None);

        assert!(get_block_result(&[air, DynamicValue::Bool(true)], &maps).is_err());
        assert!(get_block_result(&[DynamicValue::Bool(true)], &maps).is_err());
    }
}
