//! CodeCraft client runtime.
//!
//! Drives a Minecraft server running the CodeCraft mod over a binary
//! WebSocket protocol: connect, negotiate the registry id maps, run
//! commands and receive push messages.
//!
//! # Architecture
//!
//! - Each [`Client`] owns one networking thread with its own tokio runtime
//! - Commands carry a session-unique [`CmdUid`]; results are matched by uid
//! - Integer ids on the wire are resolved through the per-session
//!   [`RegistryIdMaps`], negotiated once and cached on disk by content hash
//! - Every operation returns an [`OpHandle`] that async code awaits and
//!   synchronous code [`wait`](OpHandle::wait)s on
//!
//! # Quick Start
//!
//! ```no_run
//! use codecraft::{Block, Client, ResourceId, Result, SendSystemChatCmd, SetBlockOptions, World};
//! use codecraft::codec::Vec3i;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = Client::builder()
//!         .uri("ws://localhost:6767")
//!         .build()?;
//!     client.establish().await?;
//!
//!     client.run_cmd(SendSystemChatCmd::new("Hello from Rust")).await?;
//!
//!     let stone = Block::new(ResourceId::parse("stone")?);
//!     World::overworld()
//!         .set_block(&client, Vec3i::new(0, 64, 0), stone, SetBlockOptions::default())
//!         .await?;
//!
//!     client.close().await
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`block`] | Block types, properties and block states |
//! | [`client`] | [`Client`] session, batching, push messages |
//! | [`codec`] | [`ByteBuf`] wire codec, NBT, dynamic values |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | [`CmdUid`] |
//! | [`protocol`] | Commands and messages |
//! | [`registry`] | Registries, id maps and the id map cache |
//! | [`resource`] | [`ResourceId`] |
//! | [`transport`] | WebSocket connection on the networking thread |
//! | [`world`] | [`World`] handle, block reads and writes |

// ============================================================================
// Modules
// ============================================================================

/// Block types, property descriptors and block states.
pub mod block;

/// Client session.
///
/// Use [`Client::builder()`] to create a client.
pub mod client;

/// Binary wire codec.
pub mod codec;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers.
pub mod identifiers;

/// Command and message types.
pub mod protocol;

/// Registries and per-session id maps.
pub mod registry;

/// Namespaced resource identifiers.
pub mod resource;

/// WebSocket transport layer.
pub mod transport;

/// Dimension handle.
pub mod world;

// ============================================================================
// Re-exports
// ============================================================================

// Block types
pub use block::{Block, BlockType, PropertyDescriptor, PropertyValue};

// Client types
pub use client::{
    Client, ClientBuilder, ClientOptions, ClientState, CmdBatch, CurrentGuard, MsgHandler,
    QueueState, ResultWaiter,
};

// Codec types
pub use codec::{ByteBuf, DynamicValue, Nbt, NbtCompound};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::CmdUid;

// Protocol types
pub use protocol::{Cmd, GetBlockCmd, PushMsg, SendSystemChatCmd, SetBlockCmd, SetBlockFlags};

// Registry types
pub use registry::{IdMap, IdMapCache, Registry, RegistryBuilder, RegistryIdMaps};

// Resource types
pub use resource::ResourceId;

// Transport types
pub use transport::{CloseCode, OpHandle};

// World types
pub use world::{SetBlockOptions, World};
