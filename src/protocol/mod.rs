//! Wire-level commands and messages.
//!
//! | Direction | Frame contents |
//! |-----------|----------------|
//! | client → server | one or more commands ([`Cmd`]) |
//! | server → client | one or more messages ([`Msg`]) |
//!
//! Both directions identify kinds by the per-session integer ids of the
//! `codecraft:cmd` and `codecraft:msg` id maps.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `command` | [`Cmd`] trait and built-in commands |
//! | `message` | [`Msg`] types and decoders |

// ============================================================================
// Submodules
// ============================================================================

/// Command trait and built-in commands.
pub mod command;

/// Inbound message types.
pub mod message;

// ============================================================================
// Re-exports
// ============================================================================

pub use command::{
    Cmd, CmdEntry, CmdRegistry, GetBlockCmd, SendSystemChatCmd, SetBlockCmd, SetBlockFlags,
    builtin_cmds,
};
pub(crate) use command::write_cmd;
pub use message::{
    CmdOutcome, CmdResultMsg, Msg, MsgDecoder, MsgRegistry, PushMsg, builtin_msgs,
    decode_cmd_result, decode_push, read_msg,
};
