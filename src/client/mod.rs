//! Client session.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `builder` | [`ClientBuilder`] |
//! | `core` | [`Client`] lifecycle and commands |
//! | `options` | [`ClientOptions`] and defaults |
//! | `runner` | [`CmdBatch`] and frame sending |
//! | `pending` | [`ResultWaiter`] and the result table |
//! | `queue` | inbound message dispatch |
//! | `handshake` | id map negotiation |
//! | `current` | process-wide current client |

// ============================================================================
// Submodules
// ============================================================================

mod builder;
mod core;
mod current;
mod handshake;
mod options;
mod pending;
mod queue;
mod runner;

// ============================================================================
// Re-exports
// ============================================================================

pub use builder::ClientBuilder;
pub use core::{Client, ClientState};
pub use current::CurrentGuard;
pub use options::{ClientOptions, DEFAULT_CLIENT_NAME};
pub use pending::ResultWaiter;
pub use queue::{MsgHandler, QueueState};
pub use runner::CmdBatch;
