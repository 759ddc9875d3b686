//! Client configuration.
//!
//! | Option | Default |
//! |--------|---------|
//! | `name` | `"codecraft"` |
//! | `open_timeout` | 10 s |
//! | `close_grace` | 5 s |
//! | `cache_dir` | `.codecraft/registryIdMapCache` |
//! | `cache_enabled` | `true` |
//! | `command_timeout` | none |

// ============================================================================
// Imports
// ============================================================================

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::error::{Error, Result};
use crate::registry::DEFAULT_CACHE_DIR;
use crate::transport::{DEFAULT_CLOSE_GRACE, DEFAULT_OPEN_TIMEOUT};

// ============================================================================
// Constants
// ============================================================================

/// Default client name, used in log fields.
pub const DEFAULT_CLIENT_NAME: &str = "codecraft";

// ============================================================================
// ClientOptions
// ============================================================================

/// Validated client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    /// Server WebSocket URI (`ws` or `wss`).
    pub uri: Url,

    /// Name carried in log fields.
    pub name: String,

    /// Time allowed for opening the WebSocket.
    pub open_timeout: Duration,

    /// Time close waits for in-flight operations.
    pub close_grace: Duration,

    /// Directory of the id map cache.
    pub cache_dir: PathBuf,

    /// Whether the id map cache is read and written.
    pub cache_enabled: bool,

    /// Fail commands that get no result within this time.
    pub command_timeout: Option<Duration>,
}

impl ClientOptions {
    /// Creates options for `uri` with every other value at its default.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `uri` does not parse or is not `ws`/`wss`.
    pub fn new(uri: &str) -> Result<Self> {
        Ok(Self {
            uri: parse_uri(uri)?,
            name: DEFAULT_CLIENT_NAME.to_string(),
            open_timeout: DEFAULT_OPEN_TIMEOUT,
            close_grace: DEFAULT_CLOSE_GRACE,
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            cache_enabled: true,
            command_timeout: None,
        })
    }

    /// Checks values that can be set directly on the public fields.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an invalid value.
    pub fn validate(&self) -> Result<()> {
        check_scheme(&self.uri)?;
        if self.name.is_empty() {
            return Err(Error::config("client name must not be empty"));
        }
        if self.open_timeout.is_zero() {
            return Err(Error::config("open timeout must be positive"));
        }
        if self.command_timeout.is_some_and(|t| t.is_zero()) {
            return Err(Error::config("command timeout must be positive"));
        }
        Ok(())
    }
}

fn parse_uri(uri: &str) -> Result<Url> {
    let url =
        Url::parse(uri).map_err(|e| Error::config(format!("invalid server URI \"{uri}\": {e}")))?;
    check_scheme(&url)?;
    Ok(url)
}

fn check_scheme(url: &Url) -> Result<()> {
    match url.scheme() {
        "ws" | "wss" => Ok(()),
        other => Err(Error::config(format!(
            "server URI must use ws or wss, not \"{other}\""
        ))),
    }
}

// ============================================================================
// Tests
// ============================================================================
