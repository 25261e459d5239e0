//! Message classification.
//!
//! A text message whose payload begins with one of the command tokens is
//! consumed by the server instead of relayed verbatim. Classification
//! happens once per logical message, on its first frame, and the result
//! drives reassembly, relay and dispatch.

use crate::frame::{Frame, Opcode};

/// Command vocabulary in match order. First match wins.
const VOCABULARY: [(&[u8], MessageKind); 5] = [
    (b"ROOM", MessageKind::Room),
    (b"CLIP", MessageKind::Clip),
    (b"NAME", MessageKind::Name),
    (b"PING", MessageKind::Ping),
    (b"PONG", MessageKind::Pong),
];

/// Resolved type of a logical message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Continuation,
    /// `ROOM <roomId>`: join or request an explicit room.
    Room,
    /// `CLIP <content>`: clipboard content, relayed to the peer untouched.
    Clip,
    /// `NAME <displayName> <id>`: register identity, auto-assign a room.
    Name,
    /// `PING`: text keepalive, answered with a text `PONG`.
    Ping,
    /// A text `PONG` from the peer.
    Pong,
    Text,
    Binary,
    Close,
}

impl MessageKind {
    /// Classifies a frame. Continuation wins over everything; a text
    /// frame resolves to its command token when the payload leads with
    /// one, otherwise to plain text.
    pub fn of(frame: &Frame) -> Self {
        match frame.opcode {
            Opcode::Continuation => Self::Continuation,
            Opcode::Binary => Self::Binary,
            Opcode::Close => Self::Close,
            Opcode::Text => VOCABULARY
                .iter()
                .find(|(token, _)| frame.payload.starts_with(token))
                .map(|&(_, kind)| kind)
                .unwrap_or(Self::Text),
        }
    }

    /// Command payloads are reassembled across frames before dispatch.
    pub fn is_command(self) -> bool {
        matches!(
            self,
            Self::Room | Self::Clip | Self::Name | Self::Ping | Self::Pong
        )
    }

    /// Whether frames of a message of this kind stream through to the
    /// peer. Commands the server consumes stay local, as does the close
    /// frame; everything else is forwarded as it arrives.
    pub fn is_relayed(self) -> bool {
        !matches!(self, Self::Room | Self::Name | Self::Close | Self::Ping)
    }
}
