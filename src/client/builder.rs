//! Builder for [`Client`].
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use codecraft::Client;
//!
//! # fn example() -> codecraft::Result<()> {
//! let client = Client::builder()
//!     .uri("ws://localhost:6767")
//!     .name("builder")
//!     .open_timeout(Duration::from_secs(3))
//!     .build()?;
//!
//! client.establish().wait()?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::block::BlockType;
use crate::error::{Error, Result};
use crate::protocol::{Cmd, CmdEntry, MsgDecoder, builtin_cmds, builtin_msgs, decode_push};
use crate::registry::{BLOCK_REGISTRY, Registry};
use crate::resource::ResourceId;

use super::core::Client;
use super::options::ClientOptions;

// ============================================================================
// ClientBuilder
// ============================================================================

/// Builder for configuring a [`Client`].
///
/// Use [`Client::builder()`] to create one.
#[derive(Debug, Default, Clone)]
pub struct ClientBuilder {
    uri: Option<String>,
    name: Option<String>,
    open_timeout: Option<Duration>,
    close_grace: Option<Duration>,
    cache_dir: Option<PathBuf>,
    no_cache: bool,
    command_timeout: Option<Duration>,
    cmds: Vec<(ResourceId, CmdEntry)>,
    push_msgs: Vec<ResourceId>,
    block_types: Vec<Arc<BlockType>>,
}

impl ClientBuilder {
    /// Creates an empty builder.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the server URI (`ws://` or `wss://`).
    #[inline]
    #[must_use]
    pub fn uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Sets the name carried in log fields.
    #[inline]
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the time allowed for opening the WebSocket.
    #[inline]
    #[must_use]
    pub fn open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = Some(timeout);
        self
    }

    /// Sets how long close waits for in-flight operations.
    #[inline]
    #[must_use]
    pub fn close_grace(mut self, grace: Duration) -> Self {
        self.close_grace = Some(grace);
        self
    }

    /// Sets the id map cache directory.
    #[inline]
    #[must_use]
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Disables the id map cache; every handshake requests the maps.
    #[inline]
    #[must_use]
    pub fn no_cache(mut self) -> Self {
        self.no_cache = true;
        self
    }

    /// Fails commands that get no result within `timeout`.
    #[inline]
    #[must_use]
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    /// Registers an extra command kind implemented by `C`.
    #[inline]
    #[must_use]
    pub fn cmd<C: Cmd>(mut self, kind: ResourceId) -> Self {
        self.cmds.push((kind, CmdEntry::of::<C>()));
        self
    }

    /// Registers a push message kind whose body is a dynamic tuple.
    #[inline]
    #[must_use]
    pub fn push_msg(mut self, kind: ResourceId) -> Self {
        self.push_msgs.push(kind);
        self
    }

    /// Declares a block type, used to type block state properties.
    #[inline]
    #[must_use]
    pub fn block_type(mut self, kind: Arc<BlockType>) -> Self {
        self.block_types.push(kind);
        self
    }

    /// Validates the configuration and creates the client.
    ///
    /// The networking thread starts here; nothing is connected until
    /// [`Client::establish`].
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the URI is missing or invalid
    /// - [`Error::Registry`] if a kind is registered twice
    /// - [`Error::Io`] if the networking thread cannot start
    pub fn build(self) -> Result<Client> {
        let options = self.options()?;

        let mut cmds = builtin_cmds()?;
        for (kind, entry) in self.cmds {
            cmds.insert(kind, entry)?;
        }

        let mut msgs = builtin_msgs()?;
        for kind in self.push_msgs {
            msgs.insert(kind, decode_push as MsgDecoder)?;
        }

        let (namespace, path) = BLOCK_REGISTRY;
        let mut block_types = Registry::builder(ResourceId::from_static(namespace, path));
        for kind in self.block_types {
            block_types.insert(kind.id().clone(), kind)?;
        }

        Client::new(options, cmds.build(), msgs.build(), block_types.build())
    }

    fn options(&self) -> Result<ClientOptions> {
        let uri = self.uri.as_deref().ok_or_else(|| {
            Error::config(
                "Server URI is required. Use .uri() to set it.\n\
                 Example: Client::builder().uri(\"ws://localhost:6767\")",
            )
        })?;

        let mut options = ClientOptions::new(uri)?;
        if let Some(name) = &self.name {
            options.name.clone_from(name);
        }
        if let Some(timeout) = self.open_timeout {
            options.open_timeout = timeout;
        }
        if let Some(grace) = self.close_grace {
            options.close_grace = grace;
        }
        if let Some(dir) = &self.cache_dir {
            options.cache_dir.clone_from(dir);
        }
        options.cache_enabled = !self.no_cache;
        options.command_timeout = self.command_timeout;

        options.validate()?;
        Ok(options)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::SendSystemChatCmd;

    #[test]
    fn test_options_from_builder() {
        let options = ClientBuilder::new()
            .uri("ws://localhost:6767")
            .name("worker")
            .close_grace(Duration::from_secs(1))
            .cache_dir("/tmp/cc")
            .no_cache()
            .command_timeout(Duration::from_secs(30))
            .options()
            .unwrap();

        assert_eq!(options.name, "worker");
        assert_eq!(options.close_grace, Duration::from_secs(1));
        assert_eq!(options.cache_dir, PathBuf::from("/tmp/cc"));
        assert!(!options.cache_enabled);
        assert_eq!(options.command_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_build_fails_without_uri() {
        let err = ClientBuilder::new().build().unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
        assert!(err.to_string().contains("URI"));
    }

    #[test]
    fn test_build_fails_with_http_uri() {
        let result = ClientBuilder::new().uri("http://localhost").build();
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_duplicate_cmd_kind_is_rejected() {
        let result = ClientBuilder::new()
            .uri("ws://localhost:6767")
            .cmd::<SendSystemChatCmd>(ResourceId::parse("codecraft:set_block").unwrap())
            .build();
        assert!(matches!(result, Err(Error::Registry { .. })));
    }
}
