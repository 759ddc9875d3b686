//! Messages received from the server.
//!
//! A frame holds one or more messages back to back:
//!
//! ```text
//! varint msg id (msg id map) | body
//! ```
//!
//! The body layout depends on the message kind. Kinds are decoded through
//! a [`MsgRegistry`] of plain functions.
//!
//! # Command Result
//!
//! ```text
//! varint uid | bool success | dynamic tuple (success) or string (failure)
//! ```

// ============================================================================
// Imports
// ============================================================================

use crate::codec::{ByteBuf, DynamicValue};
use crate::error::{Error, Result};
use crate::identifiers::CmdUid;
use crate::registry::{MSG_REGISTRY, Registry, RegistryBuilder, RegistryIdMaps};
use crate::resource::ResourceId;

// ============================================================================
// Types
// ============================================================================

/// Decodes the body of one message kind.
pub type MsgDecoder = fn(ResourceId, &mut ByteBuf<&[u8]>, &RegistryIdMaps) -> Result<Msg>;

/// Registry of message kinds known to this build.
pub type MsgRegistry = Registry<MsgDecoder>;

/// Kind of [`CmdResultMsg`].
pub const CMD_RESULT: (&str, &str) = ("codecraft", "cmd_result");

// ============================================================================
// Msg
// ============================================================================

/// A decoded inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// Result of a command this client sent.
    CmdResult(CmdResultMsg),
    /// Anything else the server pushes.
    Push(PushMsg),
}

/// Outcome carried by a [`CmdResultMsg`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CmdOutcome {
    /// Raw success payload, decoded later by the issuing command.
    Success(Vec<u8>),
    /// Error text reported by the server.
    Failure(String),
}

/// Result of one command, correlated by uid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmdResultMsg {
    /// Uid of the command this answers.
    pub uid: CmdUid,
    /// Success payload or error text.
    pub outcome: CmdOutcome,
}

impl CmdResultMsg {
    /// Decodes the body of a command result.
    ///
    /// The success payload is delimited by reading it as a dynamic tuple,
    /// then kept as raw bytes.
    ///
    /// # Errors
    ///
    /// Returns a decode error for a malformed body.
    pub fn read(buf: &mut ByteBuf<&[u8]>, maps: &RegistryIdMaps) -> Result<Self> {
        let uid = buf.read_varint()?;
        let uid = u32::try_from(uid)
            .map(CmdUid::new)
            .map_err(|_| Error::invalid_data(format!("negative command uid {uid}")))?;

        let outcome = if buf.read_bool()? {
            let start = buf.position();
            buf.read_dynamic_tuple(maps)?;
            CmdOutcome::Success(buf.as_slice()[start..buf.position()].to_vec())
        } else {
            CmdOutcome::Failure(buf.read_string()?)
        };

        Ok(Self { uid, outcome })
    }

    /// Writes the message, id included.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Registry`] if the session has no id for
    /// `codecraft:cmd_result`.
    pub fn write(&self, buf: &mut ByteBuf, maps: &RegistryIdMaps) -> Result<()> {
        buf.write_id_mapped(maps.msg(), &kind(CMD_RESULT))?;
        buf.write_varint(self.uid.to_wire());
        match &self.outcome {
            CmdOutcome::Success(payload) => {
                buf.write_bool(true);
                buf.write_bytes(payload);
            }
            CmdOutcome::Failure(message) => {
                buf.write_bool(false);
                buf.write_string(message);
            }
        }
        Ok(())
    }
}

/// A message of any other kind, body read as a dynamic tuple.
#[derive(Debug, Clone, PartialEq)]
pub struct PushMsg {
    /// Message kind.
    pub kind: ResourceId,
    /// Decoded body.
    pub values: Vec<DynamicValue>,
}

// ============================================================================
// Decoders
// ============================================================================

/// Decoder for [`CmdResultMsg`].
///
/// # Errors
///
/// Returns a decode error for a malformed body.
pub fn decode_cmd_result(
    _kind: ResourceId,
    buf: &mut ByteBuf<&[u8]>,
    maps: &RegistryIdMaps,
) -> Result<Msg> {
    CmdResultMsg::read(buf, maps).map(Msg::CmdResult)
}

/// Decoder for push messages whose body is a dynamic tuple.
///
/// # Errors
///
/// Returns a decode error for a malformed body.
pub fn decode_push(kind: ResourceId, buf: &mut ByteBuf<&[u8]>, maps: &RegistryIdMaps) -> Result<Msg> {
    let values = buf.read_dynamic_tuple(maps)?;
    Ok(Msg::Push(PushMsg { kind, values }))
}

/// Returns a builder pre-filled with the built-in message kinds.
///
/// # Errors
///
/// Never fails for the built-in set; the signature follows
/// [`RegistryBuilder::register`].
pub fn builtin_msgs() -> Result<RegistryBuilder<MsgDecoder>> {
    let (namespace, path) = MSG_REGISTRY;
    Registry::builder(ResourceId::from_static(namespace, path))
        .register(kind(CMD_RESULT), decode_cmd_result as MsgDecoder)
}

/// Reads one message: id, then body through the registered decoder.
///
/// # Errors
///
/// - [`Error::UnknownId`] if the id is not in the msg id map
/// - [`Error::Protocol`] if the kind has no decoder
/// - any decode error of the body
pub fn read_msg(
    buf: &mut ByteBuf<&[u8]>,
    maps: &RegistryIdMaps,
    registry: &MsgRegistry,
) -> Result<Msg> {
    let kind = buf.read_id_mapped(maps.msg())?;
    let Some(decode) = registry.get(&kind) else {
        return Err(Error::protocol(format!("no decoder for message kind {kind}")));
    };
    decode(kind, buf, maps)
}

fn kind((namespace, path): (&'static str, &'static str)) -> ResourceId {
    ResourceId::from_static(namespace, path)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ResourceId {
        ResourceId::parse(s).unwrap()
    }

    fn maps() -> RegistryIdMaps {
        let mut maps = RegistryIdMaps::new();
        maps.msg_mut().put(0, id("codecraft:cmd_result")).unwrap();
        maps.msg_mut().put(1, id("codecraft:tick")).unwrap();
        maps.freeze();
        maps
    }

    fn registry() -> MsgRegistry {
        builtin_msgs()
            .unwrap()
            .register(id("codecraft:tick"), decode_push as MsgDecoder)
            .unwrap()
            .build()
    }

    #[test]
    fn test_success_keeps_raw_payload() {
        let maps = maps();
        let mut buf = ByteBuf::new();
        buf.write_varint(0);
        buf.write_varint(7);
        buf.write_bool(true);
        buf.write_dynamic_tuple(&[DynamicValue::Bool(false)], &maps)
            .unwrap();
        buf.write_varint(0);
        buf.write_varint(8);
        buf.write_bool(false);
        buf.write_string("boom");

        let mut view = ByteBuf::view(buf.as_slice());
        let first = read_msg(&mut view, &maps, &registry()).unwrap();
        let second = read_msg(&mut view, &maps, &registry()).unwrap();
        assert!(!view.has_remaining());

        let Msg::CmdResult(first) = first else {
            panic!("expected command result");
        };
        assert_eq!(first.uid, CmdUid::new(7));
        assert_eq!(first.outcome, CmdOutcome::Success(vec![0x02, 15, 0]));

        assert_eq!(
            second,
            Msg::CmdResult(CmdResultMsg {
                uid: CmdUid::new(8),
                outcome: CmdOutcome::Failure("boom".into()),
            })
        );
    }

    #[test]
    fn test_write_matches_read() {
        let maps = maps();
        let msg = CmdResultMsg {
            uid: CmdUid::new(42),
            outcome: CmdOutcome::Failure("nope".into()),
        };
        let mut buf = ByteBuf::new();
        msg.write(&mut buf, &maps).unwrap();

        let mut view = ByteBuf::view(buf.as_slice());
        assert_eq!(
            read_msg(&mut view, &maps, &registry()).unwrap(),
            Msg::CmdResult(msg)
        );
    }

    #[test]
    fn test_push_message() {
        let maps = maps();
        let mut buf = ByteBuf::new();
        buf.write_varint(1);
        buf.write_dynamic_tuple(&[DynamicValue::Long(20)], &maps)
            .unwrap();

        let mut view = ByteBuf::view(buf.as_slice());
        let Msg::Push(push) = read_msg(&mut view, &maps, &registry()).unwrap() else {
            panic!("expected push message");
        };
        assert_eq!(push.kind, id("codecraft:tick"));
        assert_eq!(push.values, vec![DynamicValue::Long(20)]);
    }

    #[test]
    fn test_unknown_id_and_missing_decoder() {
        let maps = maps();
        let mut buf = ByteBuf::new();
        buf.write_varint(9);
        let mut view = ByteBuf::view(buf.as_slice());
        assert!(matches!(
            read_msg(&mut view, &maps, &registry()),
            Err(Error::UnknownId { .. })
        ));

        let builtin = builtin_msgs().unwrap().build();
        let mut buf = ByteBuf::new();
        buf.write_varint(1);
        let mut view = ByteBuf::view(buf.as_slice());
        assert!(matches!(
            read_msg(&mut view, &maps, &builtin),
            Err(Error::Protocol { .. })
        ));
    }
}
