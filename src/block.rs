//! Block states and their properties.
//!
//! A [`Block`] is a block id plus assigned property values. Which
//! properties exist, and how their values serialize, is described by
//! [`PropertyDescriptor`]s: a static set shared per block type
//! ([`BlockType`]) plus an optional per-instance overlay for properties
//! the client learned about at runtime.
//!
//! # Wire Layout
//!
//! ```text
//! varint block id (block id map) | varint n | n × (string name, string value)
//! ```
//!
//! Values are always sent as text; the descriptor converts.

// ============================================================================
// Imports
// ============================================================================

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::codec::ByteBuf;
use crate::error::{Error, Result};
use crate::registry::RegistryIdMaps;
use crate::resource::ResourceId;

// ============================================================================
// PropertyDescriptor
// ============================================================================

/// Shape of one block property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyDescriptor {
    /// `true` / `false`.
    Boolean,
    /// Integer in `min..=max`.
    Integer {
        /// Smallest allowed value.
        min: i32,
        /// Largest allowed value.
        max: i32,
    },
    /// One of a fixed set of lowercase names.
    Enum {
        /// Allowed names.
        values: Vec<String>,
    },
}

impl PropertyDescriptor {
    /// Creates an enum descriptor from names.
    #[must_use]
    pub fn enumeration<I, V>(values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        Self::Enum {
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Guesses a descriptor from a value the server sent for an
    /// undeclared property.
    #[must_use]
    pub fn infer(text: &str) -> Self {
        if text == "true" || text == "false" {
            Self::Boolean
        } else if let Ok(n) = text.parse::<i32>() {
            Self::Integer { min: n, max: n }
        } else {
            Self::Enum {
                values: vec![text.to_string()],
            }
        }
    }

    /// Returns `true` if `value` is allowed by this descriptor.
    #[must_use]
    pub fn accepts(&self, value: &PropertyValue) -> bool {
        match (self, value) {
            (Self::Boolean, PropertyValue::Bool(_)) => true,
            (Self::Integer { min, max }, PropertyValue::Int(n)) => (*min..=*max).contains(n),
            (Self::Enum { values }, PropertyValue::Enum(name)) => values.contains(name),
            _ => false,
        }
    }

    /// Converts a value to its wire text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidData`] if the value does not fit.
    pub fn serialize(&self, value: &PropertyValue) -> Result<String> {
        if !self.accepts(value) {
            return Err(Error::invalid_data(format!(
                "value {value} does not fit property {self:?}"
            )));
        }
        Ok(value.to_string())
    }

    /// Parses wire text into a value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidData`] if the text does not fit.
    pub fn deserialize(&self, text: &str) -> Result<PropertyValue> {
        let value = match self {
            Self::Boolean => match text {
                "true" => PropertyValue::Bool(true),
                "false" => PropertyValue::Bool(false),
                _ => return Err(Error::invalid_data(format!("not a boolean: {text:?}"))),
            },
            Self::Integer { .. } => PropertyValue::Int(
                text.parse()
                    .map_err(|_| Error::invalid_data(format!("not an integer: {text:?}")))?,
            ),
            Self::Enum { .. } => PropertyValue::Enum(text.to_string()),
        };

        if !self.accepts(&value) {
            return Err(Error::invalid_data(format!(
                "value {text:?} does not fit property {self:?}"
            )));
        }
        Ok(value)
    }

    /// Widens this descriptor so it also accepts `value`.
    fn widen(&mut self, value: &PropertyValue) {
        match (self, value) {
            (Self::Integer { min, max }, PropertyValue::Int(n)) => {
                *min = (*min).min(*n);
                *max = (*max).max(*n);
            }
            (Self::Enum { values }, PropertyValue::Enum(name)) if !values.contains(name) => {
                values.push(name.clone());
            }
            _ => {}
        }
    }
}

// ============================================================================
// PropertyValue
// ============================================================================

/// Value of one block property.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyValue {
    /// Boolean property value.
    Bool(bool),
    /// Integer property value.
    Int(i32),
    /// Enum property value (its name).
    Enum(String),
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Enum(v) => f.write_str(v),
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::Enum(value.to_string())
    }
}

// ============================================================================
// BlockType
// ============================================================================

/// Declared properties of one block kind.
///
/// Shared between all [`Block`]s of that kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockType {
    id: ResourceId,
    properties: BTreeMap<String, PropertyDescriptor>,
}

impl BlockType {
    /// Creates a block type with no declared properties.
    #[must_use]
    pub fn new(id: ResourceId) -> Self {
        Self {
            id,
            properties: BTreeMap::new(),
        }
    }

    /// Declares a property.
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, descriptor: PropertyDescriptor) -> Self {
        self.properties.insert(name.into(), descriptor);
        self
    }

    /// Returns the block id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    /// Returns the declared descriptor for `name`.
    #[inline]
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.get(name)
    }

    /// Iterates declared properties in name order.
    pub fn properties(&self) -> impl Iterator<Item = (&str, &PropertyDescriptor)> {
        self.properties.iter().map(|(k, v)| (k.as_str(), v))
    }
}

// ============================================================================
// Block
// ============================================================================

/// A block state: block kind plus assigned property values.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use codecraft::{Block, BlockType, PropertyDescriptor, ResourceId};
///
/// let slab = Arc::new(
///     BlockType::new(ResourceId::parse("oak_slab")?)
///         .with_property("type", PropertyDescriptor::enumeration(["top", "bottom", "double"]))
///         .with_property("waterlogged", PropertyDescriptor::Boolean),
/// );
///
/// let block = Block::of(slab).with("type", "top")?.with("waterlogged", false)?;
/// assert_eq!(block.assigned().count(), 2);
/// # Ok::<(), codecraft::Error>(())
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Block {
    kind: Arc<BlockType>,
    overlay: BTreeMap<String, PropertyDescriptor>,
    values: BTreeMap<String, PropertyValue>,
}

impl Block {
    /// Creates a block with no declared properties.
    #[must_use]
    pub fn new(id: ResourceId) -> Self {
        Self::of(Arc::new(BlockType::new(id)))
    }

    /// Creates a block of a declared kind with no assigned values.
    #[must_use]
    pub fn of(kind: Arc<BlockType>) -> Self {
        Self {
            kind,
            overlay: BTreeMap::new(),
            values: BTreeMap::new(),
        }
    }

    /// Returns the block id.
    #[inline]
    #[must_use]
    pub fn id(&self) -> &ResourceId {
        self.kind.id()
    }

    /// Returns the shared block type.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> &Arc<BlockType> {
        &self.kind
    }

    /// Returns the descriptor for `name`; the overlay wins over declared.
    #[must_use]
    pub fn descriptor(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.overlay
            .get(name)
            .or_else(|| self.kind.property(name))
    }

    /// Adds a property to this instance only.
    pub fn declare(&mut self, name: impl Into<String>, descriptor: PropertyDescriptor) {
        self.overlay.insert(name.into(), descriptor);
    }

    /// Assigns a property value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidData`] if the property is unknown or the
    /// value does not fit its descriptor.
    pub fn set(&mut self, name: &str, value: impl Into<PropertyValue>) -> Result<()> {
        let value = value.into();
        let Some(descriptor) = self.descriptor(name) else {
            return Err(Error::invalid_data(format!(
                "block {} has no property {name:?}",
                self.id()
            )));
        };
        if !descriptor.accepts(&value) {
            return Err(Error::invalid_data(format!(
                "value {value} does not fit property {name:?} of {}",
                self.id()
            )));
        }
        self.values.insert(name.to_string(), value);
        Ok(())
    }

    /// Builder form of [`Block::set`].
    ///
    /// # Errors
    ///
    /// Same as [`Block::set`].
    pub fn with(mut self, name: &str, value: impl Into<PropertyValue>) -> Result<Self> {
        self.set(name, value)?;
        Ok(self)
    }

    /// Returns the assigned value of `name`.
    #[inline]
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.values.get(name)
    }

    /// Removes an assigned value.
    pub fn unset(&mut self, name: &str) -> Option<PropertyValue> {
        self.values.remove(name)
    }

    /// Iterates assigned properties in name order.
    pub fn assigned(&self) -> impl Iterator<Item = (&str, &PropertyValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("id", self.id())
            .field("values", &self.values)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())?;
        if self.values.is_empty() {
            return Ok(());
        }
        f.write_str("[")?;
        for (i, (name, value)) in self.assigned().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{name}={value}")?;
        }
        f.write_str("]")
    }
}

// ============================================================================
// ByteBuf - Block State
// ============================================================================

impl<S: AsRef<[u8]>> ByteBuf<S> {
    /// Reads a block state.
    ///
    /// Declared properties come from the block types known to `maps`;
    /// properties the client has never heard of get a descriptor
    /// inferred from their text.
    ///
    /// # Errors
    ///
    /// - [`Error::UnknownId`] if the block id is not in the session
    /// - [`Error::InvalidData`] if a value does not fit its descriptor
    pub fn read_block_state(&mut self, maps: &RegistryIdMaps) -> Result<Block> {
        self.read_atomic(|buf| {
            let id = buf.read_id_mapped(maps.block())?;
            let mut block = Block::of(maps.block_type(&id));

            let count = buf.read_varint()?;
            let count = usize::try_from(count)
                .map_err(|_| Error::invalid_data(format!("negative property count {count}")))?;

            for _ in 0..count {
                let name = buf.read_string()?;
                let text = buf.read_string()?;

                let value = match block.descriptor(&name) {
                    Some(descriptor) => descriptor.deserialize(&text)?,
                    None => {
                        let descriptor = PropertyDescriptor::infer(&text);
                        let value = descriptor.deserialize(&text)?;
                        block.declare(name.clone(), descriptor);
                        value
                    }
                };

                if let Some(overlay) = block.overlay.get_mut(&name) {
                    overlay.widen(&value);
                }
                block.values.insert(name, value);
            }

            Ok(block)
        })
    }
}

impl ByteBuf {
    /// Writes a block state with its assigned properties.
    ///
    /// # Errors
    ///
    /// - [`Error::Registry`] if the block id has no id this session
    /// - [`Error::InvalidData`] if a value no longer fits its descriptor
    pub fn write_block_state(&mut self, block: &Block, maps: &RegistryIdMaps) -> Result<()> {
        let mut payload = ByteBuf::new();
        payload.write_id_mapped(maps.block(), block.id())?;
        payload.write_varint(block.values.len() as i32);
        for (name, value) in block.assigned() {
            let descriptor = block.descriptor(name).ok_or_else(|| {
                Error::invalid_data(format!("block {} has no property {name:?}", block.id()))
            })?;
            payload.write_string(name);
            payload.write_string(&descriptor.serialize(value)?);
        }
        self.write_bytes(payload.as_slice());
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
