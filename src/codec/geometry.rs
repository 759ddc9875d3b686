//! Fixed-layout geometry values.
//!
//! Vectors and affine transforms travel as plain tuples of big-endian
//! components with no prefix.
//!
//! | Type | Layout |
//! |------|--------|
//! | `Vec2i` / `Vec2f` / `Vec2d` | 2 × i32 / f32 / f64 |
//! | `Vec3i` / `Vec3f` / `Vec3d` | 3 × i32 / f32 / f64 |
//! | `Transform2f` / `Transform2d` | 6 × f32 / f64 |
//! | `Transform3f` / `Transform3d` | 12 × f32 / f64 |

// ============================================================================
// Imports
// ============================================================================

use crate::codec::ByteBuf;
use crate::error::Result;

// ============================================================================
// Vectors
// ============================================================================

macro_rules! vector {
    ($(
        $(#[$meta:meta])*
        $name:ident($ty:ty, $read_one:ident, $write_one:ident) { $($field:ident),+ }
        => $read:ident, $write:ident;
    )*) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Default)]
            pub struct $name {
                $(
                    #[allow(missing_docs)]
                    pub $field: $ty,
                )+
            }

            impl $name {
                #[doc = concat!("Creates a new `", stringify!($name), "`.")]
                #[inline]
                #[must_use]
                pub const fn new($($field: $ty),+) -> Self {
                    Self { $($field),+ }
                }
            }

            impl<S: AsRef<[u8]>> ByteBuf<S> {
                #[doc = concat!("Reads a `", stringify!($name), "`.")]
                ///
                /// # Errors
                ///
                /// Returns [`crate::Error::Underflow`] if the buffer is exhausted.
                pub fn $read(&mut self) -> Result<$name> {
                    self.read_atomic(|buf| {
                        Ok($name { $($field: buf.$read_one()?),+ })
                    })
                }
            }

            impl ByteBuf {
                #[doc = concat!("Writes a `", stringify!($name), "`.")]
                pub fn $write(&mut self, value: &$name) {
                    $(self.$write_one(value.$field);)+
                }
            }
        )*
    };
}

vector! {
    /// Integer 2D vector.
    Vec2i(i32, read_i32, write_i32) { x, y } => read_vec2i, write_vec2i;
    /// Single-precision 2D vector.
    Vec2f(f32, read_f32, write_f32) { x, y } => read_vec2f, write_vec2f;
    /// Double-precision 2D vector.
    Vec2d(f64, read_f64, write_f64) { x, y } => read_vec2d, write_vec2d;
    /// Integer 3D vector, also used for block positions.
    Vec3i(i32, read_i32, write_i32) { x, y, z } => read_vec3i, write_vec3i;
    /// Single-precision 3D vector.
    Vec3f(f32, read_f32, write_f32) { x, y, z } => read_vec3f, write_vec3f;
    /// Double-precision 3D vector.
    Vec3d(f64, read_f64, write_f64) { x, y, z } => read_vec3d, write_vec3d;
}

// ============================================================================
// Transforms
// ============================================================================

macro_rules! transform {
    ($(
        $(#[$meta:meta])*
        $name:ident([$ty:ty; $n:literal], $read_one:ident, $write_one:ident)
        => $read:ident, $write:ident;
    )*) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq)]
            pub struct $name(pub [$ty; $n]);

            impl Default for $name {
                fn default() -> Self {
                    Self([0.0; $n])
                }
            }

            impl<S: AsRef<[u8]>> ByteBuf<S> {
                #[doc = concat!("Reads a `", stringify!($name), "`.")]
                ///
                /// # Errors
                ///
                /// Returns [`crate::Error::Underflow`] if the buffer is exhausted.
                pub fn $read(&mut self) -> Result<$name> {
                    self.read_atomic(|buf| {
                        let mut out = [0.0; $n];
                        for slot in &mut out {
                            *slot = buf.$read_one()?;
                        }
                        Ok($name(out))
                    })
                }
            }

            impl ByteBuf {
                #[doc = concat!("Writes a `", stringify!($name), "`.")]
                pub fn $write(&mut self, value: &$name) {
                    value.0.iter().for_each(|c| self.$write_one(*c));
                }
            }
        )*
    };
}

transform! {
    /// 2D affine transform, single precision, row-major 2×3.
    Transform2f([f32; 6], read_f32, write_f32) => read_transform2f, write_transform2f;
    /// 2D affine transform, double precision, row-major 2×3.
    Transform2d([f64; 6], read_f64, write_f64) => read_transform2d, write_transform2d;
    /// 3D affine transform, single precision, row-major 3×4.
    Transform3f([f32; 12], read_f32, write_f32) => read_transform3f, write_transform3f;
    /// 3D affine transform, double precision, row-major 3×4.
    Transform3d([f64; 12], read_f64, write_f64) => read_transform3d, write_transform3d;
}

// ============================================================================
// Tests
// ============================================================================
