//! Self-describing values.
//!
//! A dynamic value is one type tag byte followed by the value in the
//! layout of that type. Command results and push messages use them so
//! they can be decoded without knowing the command that produced them.
//!
//! # Tag Catalog
//!
//! | Tags | Types |
//! |------|-------|
//! | 1–6 | byte, short, int, long, varint, varlong |
//! | 7–12 | ubyte, ushort, uint, ulong, uvarint, uvarlong |
//! | 13–15 | float, double, bool |
//! | 16–30 | arrays of the above, same order |
//! | 31–40 | vec2i/f/d, vec3i/f/d, transform2f/d, transform3f/d |
//! | 41–47 | blob, string, resource id, uuid, nbt, block state, fluid state |
//!
//! Tag `0` is reserved. Fluid states have a tag but cannot be decoded.

// ============================================================================
// Imports
// ============================================================================

use uuid::Uuid;

use crate::block::Block;
use crate::codec::{
    ByteBuf, Nbt, Transform2d, Transform2f, Transform3d, Transform3f, Vec2d, Vec2f, Vec2i, Vec3d,
    Vec3f, Vec3i,
};
use crate::error::{Error, Result};
use crate::registry::RegistryIdMaps;
use crate::resource::ResourceId;

// ============================================================================
// Catalog
// ============================================================================

macro_rules! catalog {
    (@write $buf:ident, $write:ident, $v:ident, copy) => { $buf.$write(*$v) };
    (@write $buf:ident, $write:ident, $v:ident, by_ref) => { $buf.$write($v) };

    ($(
        $variant:ident($ty:ty) = $tag:literal, $read:ident, $write:ident, $mode:ident;
    )*) => {
        /// Type tag of a dynamic value.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum PrimitiveTag {
            $(
                #[allow(missing_docs)]
                $variant = $tag,
            )*
            /// Optional NBT tag.
            Nbt = 45,
            /// Block state record.
            BlockState = 46,
            /// Fluid state record (not decodable).
            FluidState = 47,
        }

        impl TryFrom<u8> for PrimitiveTag {
            type Error = Error;

            fn try_from(tag: u8) -> Result<Self> {
                match tag {
                    $($tag => Ok(Self::$variant),)*
                    45 => Ok(Self::Nbt),
                    46 => Ok(Self::BlockState),
                    47 => Ok(Self::FluidState),
                    _ => Err(Error::UnknownTypeTag { tag }),
                }
            }
        }

        /// A value paired with its type tag.
        #[derive(Debug, Clone, PartialEq)]
        pub enum DynamicValue {
            $(
                #[allow(missing_docs)]
                $variant($ty),
            )*
            /// NBT tag; `None` when the server sent type `0`.
            Nbt(Option<Nbt>),
            /// Block state.
            BlockState(Block),
        }

        impl DynamicValue {
            /// Returns the type tag of this value.
            #[must_use]
            pub fn tag(&self) -> PrimitiveTag {
                match self {
                    $(Self::$variant(_) => PrimitiveTag::$variant,)*
                    Self::Nbt(_) => PrimitiveTag::Nbt,
                    Self::BlockState(_) => PrimitiveTag::BlockState,
                }
            }
        }

        impl<S: AsRef<[u8]>> ByteBuf<S> {
            /// Reads a tag byte and the value it announces.
            ///
            /// # Errors
            ///
            /// - [`Error::UnknownTypeTag`] for a tag outside the catalog
            /// - [`Error::InvalidData`] for a fluid state
            /// - any error of the announced type's decoder
            pub fn read_dynamic(&mut self, maps: &RegistryIdMaps) -> Result<DynamicValue> {
                self.read_atomic(|buf| {
                    let tag = PrimitiveTag::try_from(buf.read_u8()?)?;
                    Ok(match tag {
                        $(PrimitiveTag::$variant => DynamicValue::$variant(buf.$read()?),)*
                        PrimitiveTag::Nbt => DynamicValue::Nbt(buf.read_nbt()?),
                        PrimitiveTag::BlockState => {
                            DynamicValue::BlockState(buf.read_block_state(maps)?)
                        }
                        PrimitiveTag::FluidState => {
                            return Err(Error::invalid_data("fluid state values are not supported"));
                        }
                    })
                })
            }
        }

        impl ByteBuf {
            /// Writes the tag byte of `value` and then the value.
            ///
            /// # Errors
            ///
            /// Fails only for values whose encoding can fail: NBT (see
            /// [`ByteBuf::write_nbt`]) and block states (see
            /// [`ByteBuf::write_block_state`]).
            pub fn write_dynamic(&mut self, value: &DynamicValue, maps: &RegistryIdMaps) -> Result<()> {
                self.write_u8(value.tag() as u8);
                match value {
                    $(DynamicValue::$variant(v) => catalog!(@write self, $write, v, $mode),)*
                    DynamicValue::Nbt(tag) => self.write_nbt(tag.as_ref())?,
                    DynamicValue::BlockState(block) => self.write_block_state(block, maps)?,
                }
                Ok(())
            }
        }
    };
}

catalog! {
    Byte(i8) = 1, read_i8, write_i8, copy;
    Short(i16) = 2, read_i16, write_i16, copy;
    Int(i32) = 3, read_i32, write_i32, copy;
    Long(i64) = 4, read_i64, write_i64, copy;
    VarInt(i32) = 5, read_varint, write_varint, copy;
    VarLong(i64) = 6, read_varlong, write_varlong, copy;
    UByte(u8) = 7, read_u8, write_u8, copy;
    UShort(u16) = 8, read_u16, write_u16, copy;
    UInt(u32) = 9, read_u32, write_u32, copy;
    ULong(u64) = 10, read_u64, write_u64, copy;
    UVarInt(u32) = 11, read_uvarint, write_uvarint, copy;
    UVarLong(u64) = 12, read_uvarlong, write_uvarlong, copy;
    Float(f32) = 13, read_f32, write_f32, copy;
    Double(f64) = 14, read_f64, write_f64, copy;
    Bool(bool) = 15, read_bool, write_bool, copy;
    ByteArray(Vec<i8>) = 16, read_i8_array, write_i8_array, by_ref;
    ShortArray(Vec<i16>) = 17, read_i16_array, write_i16_array, by_ref;
    IntArray(Vec<i32>) = 18, read_i32_array, write_i32_array, by_ref;
    LongArray(Vec<i64>) = 19, read_i64_array, write_i64_array, by_ref;
    VarIntArray(Vec<i32>) = 20, read_varint_array, write_varint_array, by_ref;
    VarLongArray(Vec<i64>) = 21, read_varlong_array, write_varlong_array, by_ref;
    UByteArray(Vec<u8>) = 22, read_u8_array, write_u8_array, by_ref;
    UShortArray(Vec<u16>) = 23, read_u16_array, write_u16_array, by_ref;
    UIntArray(Vec<u32>) = 24, read_u32_array, write_u32_array, by_ref;
    ULongArray(Vec<u64>) = 25, read_u64_array, write_u64_array, by_ref;
    UVarIntArray(Vec<u32>) = 26, read_uvarint_array, write_uvarint_array, by_ref;
    UVarLongArray(Vec<u64>) = 27, read_uvarlong_array, write_uvarlong_array, by_ref;
    FloatArray(Vec<f32>) = 28, read_f32_array, write_f32_array, by_ref;
    DoubleArray(Vec<f64>) = 29, read_f64_array, write_f64_array, by_ref;
    BoolArray(Vec<bool>) = 30, read_bool_array, write_bool_array, by_ref;
    Vec2i(Vec2i) = 31, read_vec2i, write_vec2i, by_ref;
    Vec2f(Vec2f) = 32, read_vec2f, write_vec2f, by_ref;
    Vec2d(Vec2d) = 33, read_vec2d, write_vec2d, by_ref;
    Vec3i(Vec3i) = 34, read_vec3i, write_vec3i, by_ref;
    Vec3f(Vec3f) = 35, read_vec3f, write_vec3f, by_ref;
    Vec3d(Vec3d) = 36, read_vec3d, write_vec3d, by_ref;
    Transform2f(Transform2f) = 37, read_transform2f, write_transform2f, by_ref;
    Transform2d(Transform2d) = 38, read_transform2d, write_transform2d, by_ref;
    Transform3f(Transform3f) = 39, read_transform3f, write_transform3f, by_ref;
    Transform3d(Transform3d) = 40, read_transform3d, write_transform3d, by_ref;
    Blob(Vec<u8>) = 41, read_blob, write_blob, by_ref;
    String(String) = 42, read_string, write_string, by_ref;
    ResourceId(ResourceId) = 43, read_resource_id, write_resource_id, by_ref;
    Uuid(Uuid) = 44, read_uuid, write_uuid, by_ref;
}

// ============================================================================
// DynamicValue - Accessors
// ============================================================================

impl DynamicValue {
    /// Returns the value if this is a bool.
    #[inline]
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns any signed or unsigned integer scalar widened to `i64`.
    ///
    /// `None` for non-integers and for `u64` values above `i64::MAX`.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::Byte(v) => Some(i64::from(v)),
            Self::Short(v) => Some(i64::from(v)),
            Self::Int(v) | Self::VarInt(v) => Some(i64::from(v)),
            Self::Long(v) | Self::VarLong(v) => Some(v),
            Self::UByte(v) => Some(i64::from(v)),
            Self::UShort(v) => Some(i64::from(v)),
            Self::UInt(v) | Self::UVarInt(v) => Some(i64::from(v)),
            Self::ULong(v) | Self::UVarLong(v) => i64::try_from(v).ok(),
            _ => None,
        }
    }

    /// Returns the value if this is a float or double.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::Float(v) => Some(f64::from(v)),
            Self::Double(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the text if this is a string.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the id if this is a resource id.
    #[inline]
    #[must_use]
    pub fn as_resource_id(&self) -> Option<&ResourceId> {
        match self {
            Self::ResourceId(id) => Some(id),
            _ => None,
        }
    }

    /// Returns the block if this is a block state.
    #[inline]
    #[must_use]
    pub fn as_block(&self) -> Option<&Block> {
        match self {
            Self::BlockState(block) => Some(block),
            _ => None,
        }
    }
}

// ============================================================================
// Tuples
// ============================================================================

impl<S: AsRef<[u8]>> ByteBuf<S> {
    /// Reads a var-length count followed by that many dynamic values.
    ///
    /// This is the default layout of a successful command result.
    ///
    /// # Errors
    ///
    /// Any [`ByteBuf::read_dynamic`] error, or [`Error::InvalidData`] for
    /// a negative count.
    pub fn read_dynamic_tuple(&mut self, maps: &RegistryIdMaps) -> Result<Vec<DynamicValue>> {
        self.read_atomic(|buf| {
            let count = buf.read_varint()?;
            let count = usize::try_from(count)
                .map_err(|_| Error::invalid_data(format!("negative value count {count}")))?;
            let mut values = Vec::with_capacity(count.min(buf.remaining()));
            for _ in 0..count {
                values.push(buf.read_dynamic(maps)?);
            }
            Ok(values)
        })
    }
}

impl ByteBuf {
    /// Writes a var-length count followed by each dynamic value.
    ///
    /// # Errors
    ///
    /// Any [`ByteBuf::write_dynamic`] error.
    pub fn write_dynamic_tuple(&mut self, values: &[DynamicValue], maps: &RegistryIdMaps) -> Result<()> {
        self.write_varint(values.len() as i32);
        values.iter().try_for_each(|v| self.write_dynamic(v, maps))
    }
}

// ============================================================================
// Tests
// ============================================================================
