//! Error types for the CodeCraft client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use codecraft::{Client, Result, SendSystemChatCmd};
//!
//! async fn example(client: &Client) -> Result<()> {
//!     client.run_cmd(SendSystemChatCmd::new("hello")).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Network | [`Error::Network`], [`Error::ConnectionTimeout`], [`Error::ConnectionClosed`] |
//! | Decode | [`Error::Underflow`], [`Error::VarIntTooLong`], [`Error::UnknownTypeTag`], [`Error::UnknownId`], [`Error::InvalidData`], [`Error::Protocol`] |
//! | Application | [`Error::Cmd`] |
//! | Cancellation | [`Error::QueueClosed`], [`Error::Cancelled`] |
//! | Contract | [`Error::InvalidState`], [`Error::InvalidResourceId`], [`Error::Registry`], [`Error::NoCurrentClient`], [`Error::Config`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`], [`Error::ChannelClosed`] |
//!
//! Network and decode errors are fatal to the session: the receiver closes
//! the client and every outstanding command fails with
//! [`Error::QueueClosed`]. [`Error::Cmd`] only reaches the awaiter of the
//! command that failed.

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio::sync::oneshot::error::RecvError;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::resource::ResourceId;

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Network Errors
    // ========================================================================
    /// Transport failure.
    ///
    /// Returned when connecting fails, a frame cannot be sent, or the
    /// server violates the framing rules (e.g. sends a text frame).
    #[error("Network error: {message}")]
    Network {
        /// Description of the network failure.
        message: String,
    },

    /// Connecting took longer than the configured open timeout.
    #[error("Connection timeout after {timeout_ms}ms")]
    ConnectionTimeout {
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// The connection is closed or was closed while the operation ran.
    #[error("Connection closed")]
    ConnectionClosed,

    // ========================================================================
    // Decode Errors
    // ========================================================================
    /// Read past the written extent of a buffer.
    #[error("Buffer underflow: needed {needed} bytes, {remaining} remaining")]
    Underflow {
        /// Bytes the read required.
        needed: usize,
        /// Bytes left in the buffer.
        remaining: usize,
    },

    /// A var-length integer did not terminate within its maximum length.
    #[error("Var-length number too long (>{max_bytes} bytes)")]
    VarIntTooLong {
        /// Maximum encoded length for the integer width.
        max_bytes: usize,
    },

    /// A dynamic value carried a type tag outside the catalog.
    #[error("Unknown type tag: {tag}")]
    UnknownTypeTag {
        /// The offending tag byte.
        tag: u8,
    },

    /// An integer id is not present in a session id map.
    #[error("Unknown id {id} in registry {registry}")]
    UnknownId {
        /// Registry the lookup was made in.
        registry: ResourceId,
        /// The missing id.
        id: i32,
    },

    /// Well-framed bytes with an invalid value (bad bool byte, bad UTF-8...).
    #[error("Invalid data: {message}")]
    InvalidData {
        /// Description of the invalid value.
        message: String,
    },

    /// Protocol violation during the handshake or message exchange.
    #[error("Protocol error: {message}")]
    Protocol {
        /// Description of the protocol violation.
        message: String,
    },

    // ========================================================================
    // Application Errors
    // ========================================================================
    /// The server reported a command failure.
    ///
    /// The session stays usable.
    #[error("Command failed: {message}")]
    Cmd {
        /// Error message sent by the server.
        message: String,
    },

    // ========================================================================
    // Cancellation Errors
    // ========================================================================
    /// The message queue stopped before the result arrived.
    #[error("Message queue closed: {reason}")]
    QueueClosed {
        /// Why the queue stopped.
        reason: String,
    },

    /// The command was never sent (e.g. its batch was discarded).
    #[error("Cancelled: {reason}")]
    Cancelled {
        /// Why the command was cancelled.
        reason: String,
    },

    // ========================================================================
    // Contract Errors
    // ========================================================================
    /// Operation not allowed in the current lifecycle state.
    #[error("Invalid state: {message}")]
    InvalidState {
        /// Description of the violated precondition.
        message: String,
    },

    /// String is not a valid `namespace:path` resource id.
    #[error("Invalid resource id \"{value}\": {reason}")]
    InvalidResourceId {
        /// The rejected input.
        value: String,
        /// Which rule was broken.
        reason: &'static str,
    },

    /// Registry misuse (duplicate key, unregistered kind).
    #[error("Registry error: {message}")]
    Registry {
        /// Description of the registry error.
        message: String,
    },

    /// No client is constructed or entered.
    #[error("No active client")]
    NoCurrentClient,

    /// Invalid client configuration.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),

    /// Channel receive error.
    #[error("Channel closed")]
    ChannelClosed(#[from] RecvError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a network error.
    #[inline]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Creates a connection timeout error.
    #[inline]
    pub fn connection_timeout(timeout_ms: u64) -> Self {
        Self::ConnectionTimeout { timeout_ms }
    }

    /// Creates a buffer underflow error.
    #[inline]
    pub fn underflow(needed: usize, remaining: usize) -> Self {
        Self::Underflow { needed, remaining }
    }

    /// Creates an unknown id error.
    #[inline]
    pub fn unknown_id(registry: ResourceId, id: i32) -> Self {
        Self::UnknownId { registry, id }
    }

    /// Creates an invalid data error.
    #[inline]
    pub fn invalid_data(message: impl Into<String>) -> Self {
        Self::InvalidData {
            message: message.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    /// Creates a command failure error.
    #[inline]
    pub fn cmd(message: impl Into<String>) -> Self {
        Self::Cmd {
            message: message.into(),
        }
    }

    /// Creates a queue closed error.
    #[inline]
    pub fn queue_closed(reason: impl Into<String>) -> Self {
        Self::QueueClosed {
            reason: reason.into(),
        }
    }

    /// Creates a cancelled error.
    #[inline]
    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self::Cancelled {
            reason: reason.into(),
        }
    }

    /// Creates an invalid state error.
    #[inline]
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Creates an invalid resource id error.
    #[inline]
    pub fn invalid_resource_id(value: impl Into<String>, reason: &'static str) -> Self {
        Self::InvalidResourceId {
            value: value.into(),
            reason,
        }
    }

    /// Creates a registry error.
    #[inline]
    pub fn registry(message: impl Into<String>) -> Self {
        Self::Registry {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a transport-level failure.
    #[inline]
    #[must_use]
    pub fn is_network_error(&self) -> bool {
        matches!(
            self,
            Self::Network { .. }
                | Self::ConnectionTimeout { .. }
                | Self::ConnectionClosed
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if this error came from decoding wire bytes.
    #[inline]
    #[must_use]
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            Self::Underflow { .. }
                | Self::VarIntTooLong { .. }
                | Self::UnknownTypeTag { .. }
                | Self::UnknownId { .. }
                | Self::InvalidData { .. }
                | Self::Protocol { .. }
        )
    }

    /// Returns `true` if the server reported a command failure.
    #[inline]
    #[must_use]
    pub fn is_cmd_error(&self) -> bool {
        matches!(self, Self::Cmd { .. })
    }

    /// Returns `true` if the awaited command will never get a result.
    #[inline]
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::QueueClosed { .. } | Self::Cancelled { .. })
    }

    /// Returns `true` if the session cannot continue after this error.
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        self.is_network_error() || self.is_decode_error()
    }
}

// ============================================================================
// Tests
// ============================================================================
