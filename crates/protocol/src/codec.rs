//! Frame decode and encode over async byte streams.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::FrameError;
use crate::frame::{Frame, Opcode};
use crate::{FRAME_READ_TIMEOUT, LEN_TAG_U16, LEN_TAG_U64, MAX_INLINE_LEN};

/// Reads one frame, unmasking the payload when the client masked it.
///
/// The wait for the first header byte is bounded by
/// [`FRAME_READ_TIMEOUT`]; once a peer has committed to a frame the
/// remaining fields are read without a deadline.
pub async fn read_frame<R>(reader: &mut R) -> Result<Frame, FrameError>
where
    R: AsyncRead + Unpin,
{
    let header = tokio::time::timeout(FRAME_READ_TIMEOUT, reader.read_u8())
        .await
        .map_err(|_| FrameError::Timeout)??;
    let fin = header & 0x80 != 0;
    let opcode = Opcode::from_bits(header)?;

    let second = reader.read_u8().await?;
    let masked = second & 0x80 != 0;
    let length = match second & 0x7F {
        LEN_TAG_U16 => u64::from(reader.read_u16().await?),
        LEN_TAG_U64 => reader.read_u64().await?,
        inline => u64::from(inline),
    };

    let mask = if masked {
        let mut key = [0u8; 4];
        reader.read_exact(&mut key).await?;
        Some(key)
    } else {
        None
    };

    let mut payload = vec![0u8; length as usize];
    reader.read_exact(&mut payload).await?;
    if let Some(key) = mask {
        apply_mask(&mut payload, key);
    }

    Ok(Frame {
        fin,
        opcode,
        payload,
    })
}

/// XOR-masks a payload in place with the 4-byte key. Involutive, and
/// correct for any payload length.
pub fn apply_mask(payload: &mut [u8], key: [u8; 4]) {
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}

/// Encodes a frame for the wire. Frames the server emits are never
/// masked.
pub fn encode(frame: &Frame) -> Vec<u8> {
    let length = frame.payload.len() as u64;
    let mut buf = Vec::with_capacity(10 + frame.payload.len());

    buf.push(u8::from(frame.fin) << 7 | frame.opcode as u8);
    if length <= MAX_INLINE_LEN {
        buf.push(length as u8);
    } else if length <= u64::from(u16::MAX) {
        buf.push(LEN_TAG_U16);
        buf.extend_from_slice(&(length as u16).to_be_bytes());
    } else {
        buf.push(LEN_TAG_U64);
        buf.extend_from_slice(&length.to_be_bytes());
    }
    buf.extend_from_slice(&frame.payload);
    buf
}

/// Writes one encoded frame to the stream.
pub async fn write_frame<W>(writer: &mut W, frame: &Frame) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&encode(frame)).await?;
    Ok(())
}
