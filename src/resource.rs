//! Namespaced resource identifiers.
//!
//! Every registry entry, registry name, command kind and message kind is
//! named by a [`ResourceId`] of the form `namespace:path`.
//!
//! # Validation
//!
//! | Part | Allowed characters |
//! |------|--------------------|
//! | namespace | `a-z 0-9 _ . - /` |
//! | path | `a-z 0-9 _ . -` |
//!
//! A bare `path` gets the default namespace `minecraft`.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Namespace used when a string carries no `namespace:` prefix.
pub const DEFAULT_NAMESPACE: &str = "minecraft";

/// Namespace of ids owned by the CodeCraft server mod.
pub const CODECRAFT_NAMESPACE: &str = "codecraft";

static NAMESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9_.\-/]+$").expect("valid namespace regex"));

static PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9_.\-]+$").expect("valid path regex"));

// ============================================================================
// ResourceId
// ============================================================================

/// A validated `namespace:path` identifier.
///
/// # Example
///
/// ```
/// use codecraft::ResourceId;
///
/// let id: ResourceId = "stone".parse()?;
/// assert_eq!(id.to_string(), "minecraft:stone");
/// assert_eq!(ResourceId::codecraft("cmd")?.namespace(), "codecraft");
/// # Ok::<(), codecraft::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId {
    namespace: String,
    path: String,
}

impl ResourceId {
    /// Creates an id from its two parts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidResourceId`] if either part is empty or
    /// contains a forbidden character.
    pub fn new(namespace: impl Into<String>, path: impl Into<String>) -> Result<Self> {
        let namespace = namespace.into();
        let path = path.into();
        validate(&namespace, &path)?;
        Ok(Self { namespace, path })
    }

    /// Creates an id in the default `minecraft` namespace.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidResourceId`] if `path` is invalid.
    #[inline]
    pub fn minecraft(path: impl Into<String>) -> Result<Self> {
        Self::new(DEFAULT_NAMESPACE, path)
    }

    /// Creates an id in the `codecraft` namespace.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidResourceId`] if `path` is invalid.
    #[inline]
    pub fn codecraft(path: impl Into<String>) -> Result<Self> {
        Self::new(CODECRAFT_NAMESPACE, path)
    }

    /// Parses `namespace:path` or a bare `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidResourceId`] for more than one `:` or
    /// forbidden characters.
    pub fn parse(value: &str) -> Result<Self> {
        let mut parts = value.split(':');
        let first = parts.next().unwrap_or_default();

        match (parts.next(), parts.next()) {
            (None, _) => Self::new(DEFAULT_NAMESPACE, first)
                .map_err(|_| Error::invalid_resource_id(value, "invalid path")),
            (Some(path), None) => {
                Self::new(first, path).map_err(|e| match e {
                    Error::InvalidResourceId { reason, .. } => {
                        Error::invalid_resource_id(value, reason)
                    }
                    other => other,
                })
            }
            (Some(_), Some(_)) => Err(Error::invalid_resource_id(
                value,
                "more than one ':' separator",
            )),
        }
    }

    /// Builds an id from parts known to be valid.
    pub(crate) fn from_static(namespace: &'static str, path: &'static str) -> Self {
        debug_assert!(validate(namespace, path).is_ok());
        Self {
            namespace: namespace.to_string(),
            path: path.to_string(),
        }
    }

    /// Returns the namespace.
    #[inline]
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Returns the path.
    #[inline]
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

fn validate(namespace: &str, path: &str) -> Result<()> {
    if !NAMESPACE_RE.is_match(namespace) {
        let full = format!("{namespace}:{path}");
        return Err(Error::invalid_resource_id(full, "invalid namespace"));
    }
    if !PATH_RE.is_match(path) {
        let full = format!("{namespace}:{path}");
        return Err(Error::invalid_resource_id(full, "invalid path"));
    }
    Ok(())
}

// ============================================================================
// Trait Implementations
// ============================================================================

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.path)
    }
}

impl FromStr for ResourceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for ResourceId {
    type Error = Error;

    fn try_from(value: &str) -> Result<Self> {
        Self::parse(value)
    }
}

impl Serialize for ResourceId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ResourceId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Tests
// ============================================================================
