//! Dimensions, block placement and block reads.
//!
//! # Example
//!
//! ```no_run
//! use codecraft::{Block, Client, ResourceId, SetBlockOptions, World};
//! use codecraft::codec::Vec3i;
//!
//! # async fn example(client: &Client) -> codecraft::Result<()> {
//! let stone = Block::new(ResourceId::parse("stone")?);
//! let changed = World::overworld()
//!     .set_block(client, Vec3i::new(0, 64, 0), stone, SetBlockOptions::default())
//!     .await?;
//!
//! let (block, nbt) = World::overworld()
//!     .get_block(client, Vec3i::new(0, 64, 0), false)
//!     .await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use crate::block::Block;
use crate::client::Client;
use crate::codec::{Nbt, Vec3i};
use crate::error::Result;
use crate::protocol::{GetBlockCmd, SetBlockCmd, SetBlockFlags};
use crate::resource::ResourceId;

// ============================================================================
// SetBlockOptions
// ============================================================================

/// Placement behavior of [`World::set_block`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SetBlockOptions {
    /// Notify neighbouring blocks. Ignored when `silent`.
    pub update: bool,
    /// Suppress neighbour updates entirely.
    pub silent: bool,
    /// Only place into air.
    pub keep: bool,
    /// Break the old block first.
    pub destroy: bool,
    /// Drop the old block as an item. Needs `destroy`.
    pub drop_item: bool,
    /// Send the full block state instead of the bare block id.
    pub set_state: bool,
    /// Run on the server tick thread.
    pub on_tick: bool,
}

impl Default for SetBlockOptions {
    fn default() -> Self {
        Self {
            update: true,
            silent: false,
            keep: false,
            destroy: false,
            drop_item: false,
            set_state: true,
            on_tick: false,
        }
    }
}

impl SetBlockOptions {
    /// Returns the flag byte these options describe.
    #[must_use]
    pub fn flags(&self) -> SetBlockFlags {
        let mut flags = SetBlockFlags::empty();
        flags.set(SetBlockFlags::BLOCK_UPDATE, self.update && !self.silent);
        flags.set(SetBlockFlags::KEEP, self.keep);
        flags.set(SetBlockFlags::DESTROY, self.destroy);
        flags.set(SetBlockFlags::DROP_ITEM, self.destroy && self.drop_item);
        flags.set(SetBlockFlags::SET_STATE, self.set_state);
        flags.set(SetBlockFlags::ON_TICK, self.on_tick);
        flags
    }
}

// ============================================================================
// World
// ============================================================================

/// A dimension, addressed through the session's world id map.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct World {
    id: ResourceId,
}

impl World {
    /// Creates a handle for the dimension `id`.
    #[inline]
    #[must_use]
    pub fn new(id: ResourceId) -> Self {
        Self { id }
    }

    /// Returns `minecraft:overworld`.
    #[inline]
    #[must_use]
    pub fn overworld() -> Self {
        Self::new(ResourceId::from_static("minecraft", "overworld"))
    }

    /// Returns the dimension id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    /// Builds the command [`World::set_block`] sends.
    #[must_use]
    pub fn set_block_cmd(&self, pos: Vec3i, block: Block, options: SetBlockOptions) -> SetBlockCmd {
        SetBlockCmd::new(self.id.clone(), pos, block, options.flags())
    }

    /// Places `block` at `pos`.
    ///
    /// Returns `true` if the server changed anything.
    ///
    /// # Errors
    ///
    /// Same as [`Client::run_cmd`].
    pub async fn set_block(
        &self,
        client: &Client,
        pos: Vec3i,
        block: Block,
        options: SetBlockOptions,
    ) -> Result<bool> {
        client.run_cmd(self.set_block_cmd(pos, block, options)).await
    }

    /// Blocking form of [`World::set_block`].
    ///
    /// # Errors
    ///
    /// Same as [`Client::run_cmd`].
    pub fn set_block_blocking(
        &self,
        client: &Client,
        pos: Vec3i,
        block: Block,
        options: SetBlockOptions,
    ) -> Result<bool> {
        client.run_cmd_blocking(self.set_block_cmd(pos, block, options))
    }

    /// Reads the block at `pos`.
    ///
    /// With `nbt`, the block entity's NBT is returned too, or `None` if
    /// the block has no block entity.
    ///
    /// # Errors
    ///
    /// Same as [`Client::run_cmd`].
    pub async fn get_block(
        &self,
        client: &Client,
        pos: Vec3i,
        nbt: bool,
    ) -> Result<(Block, Option<Nbt>)> {
        client.run_cmd(GetBlockCmd::new(self.id.clone(), pos, nbt)).await
    }

    /// Blocking form of [`World::get_block`].
    ///
    /// # Errors
    ///
    /// Same as [`Client::run_cmd`].
    pub fn get_block_blocking(
        &self,
        client: &Client,
        pos: Vec3i,
        nbt: bool,
    ) -> Result<(Block, Option<Nbt>)> {
        client.run_cmd_blocking(GetBlockCmd::new(self.id.clone(), pos, nbt))
    }
}

impl Default for World {
    fn default() -> Self {
        Self::overworld()
    }
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "World({})", self.id)
    }
}

// ============================================================================
// Tests
// ============================================================================
