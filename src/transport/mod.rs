//! WebSocket transport.
//!
//! ```text
//! ┌──────────────────┐   schedule    ┌──────────────────────┐   WebSocket   ┌────────┐
//! │ caller (sync or  │──────────────►│ codecraft-net thread │◄─────────────►│ server │
//! │ any async rt)    │◄──────────────│ current-thread tokio │   binary      │        │
//! └──────────────────┘   OpHandle    └──────────────────────┘   frames      └────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | [`Connection`] and [`OpHandle`] |

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket connection and networking thread.
pub mod connection;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{Connection, DEFAULT_CLOSE_GRACE, DEFAULT_OPEN_TIMEOUT, OpHandle};
pub use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
