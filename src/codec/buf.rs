//! Growable byte buffer with a read cursor.
//!
//! [`ByteBuf`] is generic over its storage: `ByteBuf<Vec<u8>>` owns and
//! grows, `ByteBuf<&[u8]>` is a read-only view created by
//! [`ByteBuf::view`] or [`ByteBuf::slice`]. Only the owning form exposes
//! write operations.
//!
//! All multi-byte fixed-width numbers are big-endian. Var-length numbers
//! use 7-bit groups with the high bit as continuation marker.
//!
//! A read that fails never moves the cursor.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::ops::{Bound, RangeBounds};

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::registry::RegistryIdMap;
use crate::resource::ResourceId;

// ============================================================================
// Constants
// ============================================================================

/// Maximum encoded length of a 32-bit var-length integer.
pub const VARINT_MAX_BYTES: usize = 5;

/// Maximum encoded length of a 64-bit var-length integer.
pub const VARLONG_MAX_BYTES: usize = 10;

const SEGMENT_BITS: u8 = 0x7F;
const CONTINUE_BIT: u8 = 0x80;

// ============================================================================
// Length Helpers
// ============================================================================

/// Returns the encoded length of an unsigned 32-bit var-length integer.
#[inline]
#[must_use]
pub const fn uvarint_len(value: u32) -> usize {
    uvarlong_len(value as u64)
}

/// Returns the encoded length of an unsigned 64-bit var-length integer.
#[inline]
#[must_use]
pub const fn uvarlong_len(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    if bits == 0 { 1 } else { bits.div_ceil(7) }
}

/// Returns the encoded length of a signed 32-bit var-length integer.
#[inline]
#[must_use]
pub const fn varint_len(value: i32) -> usize {
    uvarint_len((value as u32).rotate_left(1))
}

/// Returns the encoded length of a signed 64-bit var-length integer.
#[inline]
#[must_use]
pub const fn varlong_len(value: i64) -> usize {
    uvarlong_len((value as u64).rotate_left(1))
}

// ============================================================================
// ByteBuf
// ============================================================================

/// Byte buffer with a write extent and a read cursor.
///
/// Writes append at the extent; reads advance the cursor and never pass
/// the extent.
///
/// # Example
///
/// ```
/// use codecraft::ByteBuf;
///
/// let mut buf = ByteBuf::new();
/// buf.write_varint(-3);
/// buf.write_string("hi");
///
/// assert_eq!(buf.read_varint()?, -3);
/// assert_eq!(buf.read_string()?, "hi");
/// assert_eq!(buf.remaining(), 0);
/// # Ok::<(), codecraft::Error>(())
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct ByteBuf<S = Vec<u8>> {
    data: S,
    pos: usize,
}

impl Default for ByteBuf {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: AsRef<[u8]>> fmt::Debug for ByteBuf<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteBuf")
            .field("len", &self.len())
            .field("pos", &self.pos)
            .finish_non_exhaustive()
    }
}

impl From<Vec<u8>> for ByteBuf {
    #[inline]
    fn from(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }
}

// ============================================================================
// ByteBuf - Construction (owned)
// ============================================================================

impl ByteBuf {
    /// Creates an empty buffer.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            pos: 0,
        }
    }

    /// Creates an empty buffer with room for `capacity` bytes.
    #[inline]
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            pos: 0,
        }
    }

    /// Empties the buffer and rewinds the cursor.
    #[inline]
    pub fn clear(&mut self) {
        self.data.clear();
        self.pos = 0;
    }
}

// ============================================================================
// ByteBuf - Construction (view)
// ============================================================================

impl<'a> ByteBuf<&'a [u8]> {
    /// Creates a read-only view over `data`.
    #[inline]
    #[must_use]
    pub fn view(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
}

// ============================================================================
// ByteBuf - Accessors
// ============================================================================

impl<S: AsRef<[u8]>> ByteBuf<S> {
    /// Returns the number of written bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.as_ref().len()
    }

    /// Returns `true` if nothing was written.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the number of bytes left to read.
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.len() - self.pos
    }

    /// Returns `true` if unread bytes remain.
    #[inline]
    #[must_use]
    pub fn has_remaining(&self) -> bool {
        self.pos < self.len()
    }

    /// Returns the read cursor.
    #[inline]
    #[must_use]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Returns all written bytes.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        self.data.as_ref()
    }

    /// Returns the bytes between the cursor and the extent.
    #[inline]
    #[must_use]
    pub fn unread(&self) -> &[u8] {
        &self.data.as_ref()[self.pos..]
    }

    /// Rewinds the read cursor to the start.
    #[inline]
    pub fn reset_read(&mut self) {
        self.pos = 0;
    }

    /// Consumes the buffer, returning its storage.
    #[inline]
    #[must_use]
    pub fn into_inner(self) -> S {
        self.data
    }

    /// Returns a read-only view over `range` of the written bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Underflow`] if the range ends past the extent.
    pub fn slice(&self, range: impl RangeBounds<usize>) -> Result<ByteBuf<&[u8]>> {
        let len = self.len();
        let start = match range.start_bound() {
            Bound::Included(&n) => n,
            Bound::Excluded(&n) => n.saturating_add(1),
            Bound::Unbounded => 0,
        };
        let end = match range.end_bound() {
            Bound::Included(&n) => n.saturating_add(1),
            Bound::Excluded(&n) => n,
            Bound::Unbounded => len,
        };

        if end > len || start > end {
            return Err(Error::underflow(end.saturating_sub(start), len.saturating_sub(start)));
        }

        Ok(ByteBuf::view(&self.data.as_ref()[start..end]))
    }

    /// Runs a composite read, rewinding the cursor if it fails.
    ///
    /// # Errors
    ///
    /// Returns whatever `read` returns.
    pub fn read_atomic<T>(&mut self, read: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let start = self.pos;
        let result = read(self);
        if result.is_err() {
            self.pos = start;
        }
        result
    }

    /// Advances the cursor by `n` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Underflow`] if fewer than `n` bytes remain.
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }

    fn take(&mut self, n: usize) -> Result<&[u8]> {
        let remaining = self.remaining();
        if n > remaining {
            return Err(Error::underflow(n, remaining));
        }
        let start = self.pos;
        self.pos += n;
        Ok(&self.data.as_ref()[start..start + n])
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let bytes = self.take(N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    /// Reads `n` raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Underflow`] if fewer than `n` bytes remain.
    pub fn read_bytes(&mut self, n: usize) -> Result<&[u8]> {
        self.take(n)
    }

    /// Reads an element count and checks that at least `min_size` bytes
    /// per element remain.
    fn read_count(&mut self, min_size: usize) -> Result<usize> {
        let count = self.read_uvarint()? as usize;
        let needed = count.saturating_mul(min_size);
        let remaining = self.remaining();
        if needed > remaining {
            return Err(Error::underflow(needed, remaining));
        }
        Ok(count)
    }
}

// ============================================================================
// ByteBuf - Write Primitives
// ============================================================================

impl ByteBuf {
    /// Appends raw bytes with no prefix.
    #[inline]
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Writes a collection length as an unsigned var-length integer.
    #[inline]
    pub(crate) fn write_len(&mut self, len: usize) {
        debug_assert!(u32::try_from(len).is_ok(), "length exceeds u32");
        self.write_uvarint(len as u32);
    }
}

// ============================================================================
// Fixed-width Numbers
// ============================================================================

macro_rules! fixed_width {
    ($($ty:ty => $read:ident, $write:ident, $read_arr:ident, $write_arr:ident;)*) => {
        impl<S: AsRef<[u8]>> ByteBuf<S> {
            $(
                #[doc = concat!("Reads a big-endian `", stringify!($ty), "`.")]
                ///
                /// # Errors
                ///
                /// Returns [`Error::Underflow`] if the buffer is exhausted.
                #[inline]
                pub fn $read(&mut self) -> Result<$ty> {
                    Ok(<$ty>::from_be_bytes(self.read_array()?))
                }

                #[doc = concat!("Reads a count-prefixed array of big-endian `", stringify!($ty), "`.")]
                ///
                /// # Errors
                ///
                /// Returns [`Error::Underflow`] if the buffer is exhausted.
                pub fn $read_arr(&mut self) -> Result<Vec<$ty>> {
                    self.read_atomic(|buf| {
                        let count = buf.read_count(size_of::<$ty>())?;
                        let mut out = Vec::with_capacity(count);
                        for _ in 0..count {
                            out.push(buf.$read()?);
                        }
                        Ok(out)
                    })
                }
            )*
        }

        impl ByteBuf {
            $(
                #[doc = concat!("Writes a big-endian `", stringify!($ty), "`.")]
                #[inline]
                pub fn $write(&mut self, value: $ty) {
                    self.data.extend_from_slice(&value.to_be_bytes());
                }

                #[doc = concat!("Writes a count-prefixed array of big-endian `", stringify!($ty), "`.")]
                pub fn $write_arr(&mut self, values: &[$ty]) {
                    self.write_len(values.len());
                    self.data.reserve(values.len() * size_of::<$ty>());
                    for value in values {
                        self.$write(*value);
                    }
                }
            )*
        }
    };
}

fixed_width! {
    i8 => read_i8, write_i8, read_i8_array, write_i8_array;
    i16 => read_i16, write_i16, read_i16_array, write_i16_array;
    i32 => read_i32, write_i32, read_i32_array, write_i32_array;
    i64 => read_i64, write_i64, read_i64_array, write_i64_array;
    u8 => read_u8, write_u8, read_u8_array, write_u8_array;
    u16 => read_u16, write_u16, read_u16_array, write_u16_array;
    u32 => read_u32, write_u32, read_u32_array, write_u32_array;
    u64 => read_u64, write_u64, read_u64_array, write_u64_array;
    f32 => read_f32, write_f32, read_f32_array, write_f32_array;
    f64 => read_f64, write_f64, read_f64_array, write_f64_array;
}

// ============================================================================
// Var-length Numbers
// ============================================================================

impl<S: AsRef<[u8]>> ByteBuf<S> {
    /// Decodes at most `max_bytes` groups into a value of `bits` bits.
    fn read_var(&mut self, max_bytes: usize, bits: u32) -> Result<u64> {
        let bytes = &self.data.as_ref()[self.pos..];
        let mut value = 0u64;

        for i in 0..max_bytes {
            let Some(&byte) = bytes.get(i) else {
                return Err(Error::underflow(i + 1, bytes.len()));
            };
            let shift = 7 * i as u32;
            let segment = u64::from(byte & SEGMENT_BITS);
            if bits - shift < 7 && segment >> (bits - shift) != 0 {
                return Err(Error::invalid_data(format!(
                    "var-length integer exceeds {bits} bits"
                )));
            }
            value |= segment << shift;
            if byte & CONTINUE_BIT == 0 {
                self.pos += i + 1;
                return Ok(value);
            }
        }

        Err(Error::VarIntTooLong { max_bytes })
    }

    /// Reads an unsigned 32-bit var-length integer.
    ///
    /// # Errors
    ///
    /// - [`Error::Underflow`] if the buffer ends mid-number
    /// - [`Error::VarIntTooLong`] if the 5th byte has the continuation bit
    /// - [`Error::InvalidData`] if the 5th byte sets bits above bit 31
    #[inline]
    pub fn read_uvarint(&mut self) -> Result<u32> {
        self.read_var(VARINT_MAX_BYTES, u32::BITS).map(|v| v as u32)
    }

    /// Reads a signed 32-bit var-length integer.
    ///
    /// # Errors
    ///
    /// Same as [`ByteBuf::read_uvarint`].
    #[inline]
    pub fn read_varint(&mut self) -> Result<i32> {
        self.read_uvarint().map(|v| v.rotate_right(1) as i32)
    }

    /// Reads an unsigned 64-bit var-length integer.
    ///
    /// # Errors
    ///
    /// - [`Error::Underflow`] if the buffer ends mid-number
    /// - [`Error::VarIntTooLong`] if the 10th byte has the continuation bit
    /// - [`Error::InvalidData`] if the 10th byte sets bits above bit 63
    #[inline]
    pub fn read_uvarlong(&mut self) -> Result<u64> {
        self.read_var(VARLONG_MAX_BYTES, u64::BITS)
    }

    /// Reads a signed 64-bit var-length integer.
    ///
    /// # Errors
    ///
    /// Same as [`ByteBuf::read_uvarlong`].
    #[inline]
    pub fn read_varlong(&mut self) -> Result<i64> {
        self.read_uvarlong().map(|v| v.rotate_right(1) as i64)
    }

    /// Reads a count-prefixed array of signed 32-bit var-length integers.
    ///
    /// # Errors
    ///
    /// Any var-length decode error.
    pub fn read_varint_array(&mut self) -> Result<Vec<i32>> {
        self.read_atomic(|buf| {
            let count = buf.read_count(1)?;
            (0..count).map(|_| buf.read_varint()).collect()
        })
    }

    /// Reads a count-prefixed array of signed 64-bit var-length integers.
    ///
    /// # Errors
    ///
    /// Any var-length decode error.
    pub fn read_varlong_array(&mut self) -> Result<Vec<i64>> {
        self.read_atomic(|buf| {
            let count = buf.read_count(1)?;
            (0..count).map(|_| buf.read_varlong()).collect()
        })
    }

    /// Reads a count-prefixed array of unsigned 32-bit var-length integers.
    ///
    /// # Errors
    ///
    /// Any var-length decode error.
    pub fn read_uvarint_array(&mut self) -> Result<Vec<u32>> {
        self.read_atomic(|buf| {
            let count = buf.read_count(1)?;
            (0..count).map(|_| buf.read_uvarint()).collect()
        })
    }

    /// Reads a count-prefixed array of unsigned 64-bit var-length integers.
    ///
    /// # Errors
    ///
    /// Any var-length decode error.
    pub fn read_uvarlong_array(&mut self) -> Result<Vec<u64>> {
        self.read_atomic(|buf| {
            let count = buf.read_count(1)?;
            (0..count).map(|_| buf.read_uvarlong()).collect()
        })
    }
}

impl ByteBuf {
    /// Writes an unsigned 64-bit var-length integer.
    pub fn write_uvarlong(&mut self, mut value: u64) {
        loop {
            let byte = (value as u8) & SEGMENT_BITS;
            value >>= 7;
            if value == 0 {
                self.data.push(byte);
                return;
            }
            self.data.push(byte | CONTINUE_BIT);
        }
    }

    /// Writes an unsigned 32-bit var-length integer.
    #[inline]
    pub fn write_uvarint(&mut self, value: u32) {
        self.write_uvarlong(u64::from(value));
    }

    /// Writes a signed 32-bit var-length integer.
    ///
    /// The bit pattern is rotated left by one so the sign bit travels in
    /// bit 0.
    #[inline]
    pub fn write_varint(&mut self, value: i32) {
        self.write_uvarint((value as u32).rotate_left(1));
    }

    /// Writes a signed 64-bit var-length integer.
    #[inline]
    pub fn write_varlong(&mut self, value: i64) {
        self.write_uvarlong((value as u64).rotate_left(1));
    }

    /// Writes a count-prefixed array of signed 32-bit var-length integers.
    pub fn write_varint_array(&mut self, values: &[i32]) {
        self.write_len(values.len());
        values.iter().for_each(|v| self.write_varint(*v));
    }

    /// Writes a count-prefixed array of signed 64-bit var-length integers.
    pub fn write_varlong_array(&mut self, values: &[i64]) {
        self.write_len(values.len());
        values.iter().for_each(|v| self.write_varlong(*v));
    }

    /// Writes a count-prefixed array of unsigned 32-bit var-length integers.
    pub fn write_uvarint_array(&mut self, values: &[u32]) {
        self.write_len(values.len());
        values.iter().for_each(|v| self.write_uvarint(*v));
    }

    /// Writes a count-prefixed array of unsigned 64-bit var-length integers.
    pub fn write_uvarlong_array(&mut self, values: &[u64]) {
        self.write_len(values.len());
        values.iter().for_each(|v| self.write_uvarlong(*v));
    }
}

// ============================================================================
// Bool, Strings, Blobs
// ============================================================================

impl<S: AsRef<[u8]>> ByteBuf<S> {
    /// Reads a bool. Only the bytes `0` and `1` are accepted.
    ///
    /// # Errors
    ///
    /// - [`Error::Underflow`] if the buffer is exhausted
    /// - [`Error::InvalidData`] for any other byte
    pub fn read_bool(&mut self) -> Result<bool> {
        self.read_atomic(|buf| match buf.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(Error::invalid_data(format!("invalid bool byte {other}"))),
        })
    }

    /// Reads a count-prefixed array of bools.
    ///
    /// # Errors
    ///
    /// Same as [`ByteBuf::read_bool`].
    pub fn read_bool_array(&mut self) -> Result<Vec<bool>> {
        self.read_atomic(|buf| {
            let count = buf.read_count(1)?;
            (0..count).map(|_| buf.read_bool()).collect()
        })
    }

    /// Reads a length-prefixed UTF-8 string.
    ///
    /// # Errors
    ///
    /// - [`Error::Underflow`] if the buffer is exhausted
    /// - [`Error::InvalidData`] if the bytes are not UTF-8
    pub fn read_string(&mut self) -> Result<String> {
        self.read_atomic(|buf| {
            let len = buf.read_uvarint()? as usize;
            let bytes = buf.take(len)?;
            String::from_utf8(bytes.to_vec())
                .map_err(|e| Error::invalid_data(format!("invalid UTF-8 string: {e}")))
        })
    }

    /// Reads a length-prefixed ASCII string.
    ///
    /// # Errors
    ///
    /// - [`Error::Underflow`] if the buffer is exhausted
    /// - [`Error::InvalidData`] if a byte is outside ASCII
    pub fn read_ascii(&mut self) -> Result<String> {
        self.read_atomic(|buf| {
            let len = buf.read_uvarint()? as usize;
            let bytes = buf.take(len)?;
            if !bytes.is_ascii() {
                return Err(Error::invalid_data("non-ASCII byte in ASCII string"));
            }
            Ok(bytes.iter().map(|&b| char::from(b)).collect())
        })
    }

    /// Reads a length-prefixed blob.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Underflow`] if the buffer is exhausted.
    pub fn read_blob(&mut self) -> Result<Vec<u8>> {
        self.read_atomic(|buf| {
            let len = buf.read_uvarint()? as usize;
            buf.take(len).map(<[u8]>::to_vec)
        })
    }
}

impl ByteBuf {
    /// Writes a bool as one byte.
    #[inline]
    pub fn write_bool(&mut self, value: bool) {
        self.data.push(u8::from(value));
    }

    /// Writes a count-prefixed array of bools.
    pub fn write_bool_array(&mut self, values: &[bool]) {
        self.write_len(values.len());
        values.iter().for_each(|v| self.write_bool(*v));
    }

    /// Writes a length-prefixed UTF-8 string.
    pub fn write_string(&mut self, value: &str) {
        self.write_len(value.len());
        self.write_bytes(value.as_bytes());
    }

    /// Writes a length-prefixed ASCII string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidData`] if `value` is not ASCII. Nothing is
    /// written in that case.
    pub fn write_ascii(&mut self, value: &str) -> Result<()> {
        if !value.is_ascii() {
            return Err(Error::invalid_data(format!("not ASCII: {value:?}")));
        }
        self.write_string(value);
        Ok(())
    }

    /// Writes a length-prefixed blob.
    pub fn write_blob(&mut self, value: &[u8]) {
        self.write_len(value.len());
        self.write_bytes(value);
    }
}

// ============================================================================
// Identifiers
// ============================================================================

impl<S: AsRef<[u8]>> ByteBuf<S> {
    /// Reads a UUID as two big-endian `u64` halves, high first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Underflow`] if fewer than 16 bytes remain.
    pub fn read_uuid(&mut self) -> Result<Uuid> {
        self.read_array::<16>().map(Uuid::from_bytes)
    }

    /// Reads a resource id as namespace then path.
    ///
    /// # Errors
    ///
    /// - [`Error::Underflow`] if the buffer is exhausted
    /// - [`Error::InvalidData`] if either part fails validation
    pub fn read_resource_id(&mut self) -> Result<ResourceId> {
        self.read_atomic(|buf| {
            let namespace = buf.read_ascii()?;
            let path = buf.read_ascii()?;
            ResourceId::new(namespace, path).map_err(|e| Error::invalid_data(e.to_string()))
        })
    }

    /// Reads a var-length id and resolves it through `map`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownId`] if the id is not in the map.
    pub fn read_id_mapped(&mut self, map: &RegistryIdMap) -> Result<ResourceId> {
        self.read_atomic(|buf| {
            let id = buf.read_varint()?;
            map.name_of(id)
                .cloned()
                .ok_or_else(|| Error::unknown_id(map.registry().clone(), id))
        })
    }
}

impl ByteBuf {
    /// Writes a UUID as two big-endian `u64` halves, high first.
    #[inline]
    pub fn write_uuid(&mut self, value: &Uuid) {
        self.write_bytes(value.as_bytes());
    }

    /// Writes a resource id as namespace then path.
    pub fn write_resource_id(&mut self, value: &ResourceId) {
        self.write_string(value.namespace());
        self.write_string(value.path());
    }

    /// Writes the var-length id `map` assigns to `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Registry`] if `name` has no id in this session.
    pub fn write_id_mapped(&mut self, map: &RegistryIdMap, name: &ResourceId) -> Result<()> {
        let id = map.id_of(name).ok_or_else(|| {
            Error::registry(format!("{name} has no id in {}", map.registry()))
        })?;
        self.write_varint(id);
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
