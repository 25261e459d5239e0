//! Frame decoding errors.

/// Errors produced while reading a frame off the wire. All of them are
/// fatal to the connection they occur on.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported opcode: 0x{0:X}")]
    UnsupportedOpcode(u8),

    #[error("no frame received within the idle window")]
    Timeout,
}
