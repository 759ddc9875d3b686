//! Named Binary Tag values.
//!
//! Tags travel in network form: one type byte followed by the payload,
//! with no root name. Type `0` stands for "no tag".
//!
//! Payloads follow the usual big-endian layout. Strings carry a `u16`
//! byte length, arrays and lists an `i32` element count.

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;

use crate::codec::ByteBuf;
use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Nesting limit for lists and compounds.
pub const MAX_DEPTH: usize = 512;

const TAG_END: u8 = 0;
const TAG_BYTE: u8 = 1;
const TAG_SHORT: u8 = 2;
const TAG_INT: u8 = 3;
const TAG_LONG: u8 = 4;
const TAG_FLOAT: u8 = 5;
const TAG_DOUBLE: u8 = 6;
const TAG_BYTE_ARRAY: u8 = 7;
const TAG_STRING: u8 = 8;
const TAG_LIST: u8 = 9;
const TAG_COMPOUND: u8 = 10;
const TAG_INT_ARRAY: u8 = 11;
const TAG_LONG_ARRAY: u8 = 12;

// ============================================================================
// Nbt
// ============================================================================

/// Compound payload: names to tags, kept in name order.
pub type NbtCompound = BTreeMap<String, Nbt>;

/// One NBT tag.
///
/// Lists are homogeneous; an empty list is written with element type
/// `End`.
#[derive(Debug, Clone, PartialEq)]
pub enum Nbt {
    /// Signed byte.
    Byte(i8),
    /// Signed 16-bit integer.
    Short(i16),
    /// Signed 32-bit integer.
    Int(i32),
    /// Signed 64-bit integer.
    Long(i64),
    /// Single-precision float.
    Float(f32),
    /// Double-precision float.
    Double(f64),
    /// Byte array.
    ByteArray(Vec<i8>),
    /// UTF-8 string.
    String(String),
    /// Homogeneous list.
    List(Vec<Nbt>),
    /// Named children.
    Compound(NbtCompound),
    /// Int array.
    IntArray(Vec<i32>),
    /// Long array.
    LongArray(Vec<i64>),
}

impl Nbt {
    /// Returns the tag type byte.
    #[inline]
    #[must_use]
    pub fn type_id(&self) -> u8 {
        match self {
            Self::Byte(_) => TAG_BYTE,
            Self::Short(_) => TAG_SHORT,
            Self::Int(_) => TAG_INT,
            Self::Long(_) => TAG_LONG,
            Self::Float(_) => TAG_FLOAT,
            Self::Double(_) => TAG_DOUBLE,
            Self::ByteArray(_) => TAG_BYTE_ARRAY,
            Self::String(_) => TAG_STRING,
            Self::List(_) => TAG_LIST,
            Self::Compound(_) => TAG_COMPOUND,
            Self::IntArray(_) => TAG_INT_ARRAY,
            Self::LongArray(_) => TAG_LONG_ARRAY,
        }
    }

    /// Returns the children if this is a compound.
    #[inline]
    #[must_use]
    pub fn as_compound(&self) -> Option<&NbtCompound> {
        match self {
            Self::Compound(map) => Some(map),
            _ => None,
        }
    }

    /// Returns the string if this is a string tag.
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

// ============================================================================
// ByteBuf - NBT
// ============================================================================

impl<S: AsRef<[u8]>> ByteBuf<S> {
    /// Reads a type byte and the tag that follows; `None` for type `0`.
    ///
    /// # Errors
    ///
    /// - [`Error::Underflow`] if the buffer is exhausted
    /// - [`Error::InvalidData`] for unknown tag types, mixed lists,
    ///   negative lengths or nesting deeper than [`MAX_DEPTH`]
    pub fn read_nbt(&mut self) -> Result<Option<Nbt>> {
        self.read_atomic(|buf| match buf.read_u8()? {
            TAG_END => Ok(None),
            tag => buf.read_nbt_payload(tag, 0).map(Some),
        })
    }

    fn read_nbt_string(&mut self) -> Result<String> {
        let len = usize::from(self.read_u16()?);
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| Error::invalid_data(format!("invalid NBT string: {e}")))
    }

    fn read_nbt_len(&mut self, min_size: usize) -> Result<usize> {
        let len = self.read_i32()?;
        let len = usize::try_from(len)
            .map_err(|_| Error::invalid_data(format!("negative NBT length {len}")))?;
        let needed = len.saturating_mul(min_size);
        if needed > self.remaining() {
            return Err(Error::underflow(needed, self.remaining()));
        }
        Ok(len)
    }

    fn read_nbt_payload(&mut self, tag: u8, depth: usize) -> Result<Nbt> {
        if depth > MAX_DEPTH {
            return Err(Error::invalid_data("NBT nested too deeply"));
        }

        Ok(match tag {
            TAG_BYTE => Nbt::Byte(self.read_i8()?),
            TAG_SHORT => Nbt::Short(self.read_i16()?),
            TAG_INT => Nbt::Int(self.read_i32()?),
            TAG_LONG => Nbt::Long(self.read_i64()?),
            TAG_FLOAT => Nbt::Float(self.read_f32()?),
            TAG_DOUBLE => Nbt::Double(self.read_f64()?),
            TAG_BYTE_ARRAY => {
                let len = self.read_nbt_len(1)?;
                Nbt::ByteArray(self.read_bytes(len)?.iter().map(|&b| b as i8).collect())
            }
            TAG_STRING => Nbt::String(self.read_nbt_string()?),
            TAG_LIST => {
                let element = self.read_u8()?;
                let len = self.read_nbt_len(0)?;
                if element == TAG_END && len > 0 {
                    return Err(Error::invalid_data("non-empty NBT list of End"));
                }
                let mut items = Vec::with_capacity(len.min(self.remaining()));
                for _ in 0..len {
                    items.push(self.read_nbt_payload(element, depth + 1)?);
                }
                Nbt::List(items)
            }
            TAG_COMPOUND => {
                let mut map = NbtCompound::new();
                loop {
                    let child = self.read_u8()?;
                    if child == TAG_END {
                        break;
                    }
                    let name = self.read_nbt_string()?;
                    let value = self.read_nbt_payload(child, depth + 1)?;
                    map.insert(name, value);
                }
                Nbt::Compound(map)
            }
            TAG_INT_ARRAY => {
                let len = self.read_nbt_len(4)?;
                Nbt::IntArray((0..len).map(|_| self.read_i32()).collect::<Result<_>>()?)
            }
            TAG_LONG_ARRAY => {
                let len = self.read_nbt_len(8)?;
                Nbt::LongArray((0..len).map(|_| self.read_i64()).collect::<Result<_>>()?)
            }
            other => return Err(Error::invalid_data(format!("unknown NBT tag type {other}"))),
        })
    }
}

impl ByteBuf {
    /// Writes a type byte and the tag payload; `None` writes type `0`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidData`] for a heterogeneous list or a
    /// string longer than `u16::MAX` bytes. The buffer may hold a partial
    /// tag in that case.
    pub fn write_nbt(&mut self, tag: Option<&Nbt>) -> Result<()> {
        match tag {
            None => {
                self.write_u8(TAG_END);
                Ok(())
            }
            Some(tag) => {
                self.write_u8(tag.type_id());
                self.write_nbt_payload(tag)
            }
        }
    }

    fn write_nbt_string(&mut self, value: &str) -> Result<()> {
        let len = u16::try_from(value.len())
            .map_err(|_| Error::invalid_data("NBT string longer than 65535 bytes"))?;
        self.write_u16(len);
        self.write_bytes(value.as_bytes());
        Ok(())
    }

    fn write_nbt_len(&mut self, len: usize) -> Result<()> {
        let len = i32::try_from(len).map_err(|_| Error::invalid_data("NBT array too long"))?;
        self.write_i32(len);
        Ok(())
    }

    fn write_nbt_payload(&mut self, tag: &Nbt) -> Result<()> {
        match tag {
            Nbt::Byte(v) => self.write_i8(*v),
            Nbt::Short(v) => self.write_i16(*v),
            Nbt::Int(v) => self.write_i32(*v),
            Nbt::Long(v) => self.write_i64(*v),
            Nbt::Float(v) => self.write_f32(*v),
            Nbt::Double(v) => self.write_f64(*v),
            Nbt::ByteArray(values) => {
                self.write_nbt_len(values.len())?;
                values.iter().for_each(|v| self.write_i8(*v));
            }
            Nbt::String(s) => self.write_nbt_string(s)?,
            Nbt::List(items) => {
                let element = items.first().map_or(TAG_END, Nbt::type_id);
                if items.iter().any(|item| item.type_id() != element) {
                    return Err(Error::invalid_data("NBT list elements differ in type"));
                }
                self.write_u8(element);
                self.write_nbt_len(items.len())?;
                for item in items {
                    self.write_nbt_payload(item)?;
                }
            }
            Nbt::Compound(map) => {
                for (name, value) in map {
                    self.write_u8(value.type_id());
                    self.write_nbt_string(name)?;
                    self.write_nbt_payload(value)?;
                }
                self.write_u8(TAG_END);
            }
            Nbt::IntArray(values) => {
                self.write_nbt_len(values.len())?;
                values.iter().for_each(|v| self.write_i32(*v));
            }
            Nbt::LongArray(values) => {
                self.write_nbt_len(values.len())?;
                values.iter().for_each(|v| self.write_i64(*v));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
