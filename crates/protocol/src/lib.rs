//! Wire framing for the tandem relay.
//!
//! Implements the binary framing both ends of a relayed conversation
//! speak: one header byte (fin + opcode), a 7-bit length with 16- and
//! 64-bit extensions, an optional 4-byte client mask, and the payload.
//! Client frames arrive masked; frames the server emits never are.
//!
//! # Wire format
//!
//! ```text
//! [1 byte: fin (bit 7) | opcode (bits 0-3)]
//! [1 byte: masked (bit 7) | length (bits 0-6)]
//! [0, 2 or 8 bytes BE: extended length when the 7-bit field is 126 / 127]
//! [4 bytes: mask key, client frames only]
//! [length bytes: payload]
//! ```

pub mod codec;
pub mod command;
pub mod error;
pub mod frame;

pub use codec::{apply_mask, encode, read_frame, write_frame};
pub use command::MessageKind;
pub use error::FrameError;
pub use frame::{Frame, Opcode};

use std::time::Duration;

/// Idle bound on the first header byte of each frame. A peer that stays
/// silent longer than this is treated as dead.
pub const FRAME_READ_TIMEOUT: Duration = Duration::from_secs(20);

/// Largest payload length the 7-bit inline field can carry.
pub const MAX_INLINE_LEN: u64 = 125;

/// Length-byte tag selecting the 2-byte extended length field.
pub const LEN_TAG_U16: u8 = 126;

/// Length-byte tag selecting the 8-byte extended length field.
pub const LEN_TAG_U64: u8 = 127;
