//! Binary wire codec.
//!
//! | Module | Description |
//! |--------|-------------|
//! | `buf` | [`ByteBuf`], fixed-width and var-length numbers, strings, ids |
//! | `geometry` | vectors and affine transforms |
//! | `nbt` | named binary tag trees |
//! | `dynamic` | tagged self-describing values |
//!
//! Block states are encoded by [`crate::block`].

// ============================================================================
// Submodules
// ============================================================================

mod buf;
mod dynamic;
mod geometry;
mod nbt;

// ============================================================================
// Re-exports
// ============================================================================

pub use buf::{
    ByteBuf, VARINT_MAX_BYTES, VARLONG_MAX_BYTES, uvarint_len, uvarlong_len, varint_len,
    varlong_len,
};
pub use dynamic::{DynamicValue, PrimitiveTag};
pub use geometry::{
    Transform2d, Transform2f, Transform3d, Transform3f, Vec2d, Vec2f, Vec2i, Vec3d, Vec3f, Vec3i,
};
pub use nbt::{MAX_DEPTH as NBT_MAX_DEPTH, Nbt, NbtCompound};
