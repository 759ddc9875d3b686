//! On-disk cache of negotiated id maps.
//!
//! Files live at `<dir>/<KEY>.json`, where `KEY` is the upper-case hex of
//! the content hash the server announces. A file is only accepted when
//! every domain of [`RegistryIdMaps`] is present.

// ============================================================================
// Imports
// ============================================================================

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::error::Result;

use super::id_maps::{BlockTypes, CacheTables, RegistryIdMaps};

// ============================================================================
// Constants
// ============================================================================

/// Default cache directory, relative to the working directory.
pub const DEFAULT_CACHE_DIR: &str = ".codecraft/registryIdMapCache";

// ============================================================================
// IdMapCache
// ============================================================================

/// Directory of cached id maps.
#[derive(Debug, Clone)]
pub struct IdMapCache {
    dir: PathBuf,
}

impl IdMapCache {
    /// Creates a cache rooted at `dir`. Nothing is touched on disk.
    #[inline]
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the cache directory.
    #[inline]
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Returns the file path for `key`.
    #[must_use]
    pub fn path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    /// Loads and freezes the maps stored under `key`.
    ///
    /// Returns `None` when the file is missing or unusable.
    #[must_use]
    pub fn load(&self, key: &str, block_types: Arc<BlockTypes>) -> Option<RegistryIdMaps> {
        match self.try_load(key, block_types) {
            Ok(maps) => {
                debug!(key, "Registry id map cache hit");
                Some(maps)
            }
            Err(e) => {
                debug!(key, error = %e, "Registry id map cache miss");
                None
            }
        }
    }

    fn try_load(&self, key: &str, block_types: Arc<BlockTypes>) -> Result<RegistryIdMaps> {
        let text = fs::read_to_string(self.path(key))?;
        let tables: CacheTables = serde_json::from_str(&text)?;
        RegistryIdMaps::from_tables(&tables, block_types)
    }

    /// Writes `maps` under `key`.
    ///
    /// The file is written next to its final path and renamed into place.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Io`] or [`crate::Error::Json`] on failure.
    pub fn store(&self, key: &str, maps: &RegistryIdMaps) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        let json = serde_json::to_string_pretty(&maps.to_tables())?;
        let path = self.path(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &path)?;

        debug!(key, path = %path.display(), "Stored registry id map cache");
        Ok(())
    }
}

impl Default for IdMapCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_DIR)
    }
}

/// Formats a content hash as an upper-case hex cache key.
#[must_use]
pub fn cache_key(hash: &[u8]) -> String {
    hash.iter().fold(String::with_capacity(hash.len() * 2), |mut key, b| {
        let _ = write!(key, "{b:02X}");
        key
    })
}

// ============================================================================
// Tests
// ============================================================================
