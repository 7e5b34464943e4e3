//! Length-prefixed frame codec and relocation payload encoding.

use super::IpcMessage;
use crate::proxy_group::domain::ObjectMove;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::io::Write;
use std::sync::Arc;
use thiserror::Error;

/// Size of the frame header: code and payload length.
pub const HEADER_LEN: usize = 8;

/// Largest accepted payload.
pub const MAX_PAYLOAD_LEN: usize = 16 * 1024 * 1024;

/// Size of one encoded relocation triple.
pub const MOVE_LEN: usize = 24;

/// Errors raised while framing messages or decoding payloads.
#[derive(Debug, Clone, Error)]
pub enum CodecError {
    /// A frame announced or carried more than [`MAX_PAYLOAD_LEN`] bytes.
    #[error("frame payload of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge {
        /// Announced payload length.
        len: usize,
        /// Accepted maximum.
        max: usize,
    },

    /// A relocation payload is not a whole number of triples.
    #[error("relocation payload of {len} bytes is not a sequence of {MOVE_LEN}-byte triples")]
    MalformedPayload {
        /// Payload length.
        len: usize,
    },

    /// Reading or writing the stream failed.
    #[error("frame i/o failed: {0}")]
    Io(Arc<std::io::Error>),
}

impl From<std::io::Error> for CodecError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

fn checked_payload_len(len: usize) -> Result<u32, CodecError> {
    let too_large = CodecError::FrameTooLarge {
        len,
        max: MAX_PAYLOAD_LEN,
    };
    if len > MAX_PAYLOAD_LEN {
        return Err(too_large);
    }
    u32::try_from(len).map_err(|_| too_large)
}

/// Encodes `message` into one frame.
///
/// # Errors
///
/// Returns [`CodecError::FrameTooLarge`] when the payload exceeds
/// [`MAX_PAYLOAD_LEN`].
pub fn encode_frame(message: &IpcMessage) -> Result<Bytes, CodecError> {
    let payload = message.payload();
    let len = checked_payload_len(payload.len())?;
    let mut frame = BytesMut::with_capacity(HEADER_LEN + payload.len());
    frame.put_u32(message.raw_code());
    frame.put_u32(len);
    frame.put_slice(payload);
    Ok(frame.freeze())
}

/// Takes one complete frame off the front of `buffer`.
///
/// Returns `Ok(None)` while the buffer holds only part of a frame.
///
/// # Errors
///
/// Returns [`CodecError::FrameTooLarge`] as soon as an oversized header is
/// seen, without waiting for its payload.
pub fn decode_frame(buffer: &mut BytesMut) -> Result<Option<IpcMessage>, CodecError> {
    let Some(mut header) = buffer.get(..HEADER_LEN) else {
        return Ok(None);
    };
    let code = header.get_u32();
    let len = usize::try_from(header.get_u32()).unwrap_or(usize::MAX);
    if len > MAX_PAYLOAD_LEN {
        return Err(CodecError::FrameTooLarge {
            len,
            max: MAX_PAYLOAD_LEN,
        });
    }
    if buffer.len() < HEADER_LEN + len {
        return Ok(None);
    }
    buffer.advance(HEADER_LEN);
    let payload = buffer.split_to(len).freeze();
    Ok(Some(IpcMessage::from_raw(code, payload)))
}

/// Writes one frame to a blocking stream.
///
/// # Errors
///
/// Returns [`CodecError::FrameTooLarge`] for oversized payloads and
/// [`CodecError::Io`] when the stream fails.
pub fn write_frame(writer: &mut impl Write, message: &IpcMessage) -> Result<(), CodecError> {
    let frame = encode_frame(message)?;
    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}

/// Encodes relocation triples in network byte order.
pub fn encode_moves(moves: impl IntoIterator<Item = ObjectMove<u64>>) -> Bytes {
    let mut payload = BytesMut::new();
    for relocation in moves {
        for value in relocation.to_raw() {
            payload.put_u64(value);
        }
    }
    payload.freeze()
}

/// Decodes relocation triples.
///
/// # Errors
///
/// Returns [`CodecError::MalformedPayload`] when the payload length is not a
/// multiple of [`MOVE_LEN`].
pub fn decode_moves(payload: &[u8]) -> Result<Vec<ObjectMove<u64>>, CodecError> {
    let mut cursor = payload;
    let mut moves = Vec::with_capacity(payload.len().checked_div(MOVE_LEN).unwrap_or_default());
    while cursor.remaining() >= MOVE_LEN {
        let object_id = cursor.get_u64();
        let source = cursor.get_u64();
        let destination = cursor.get_u64();
        moves.push(ObjectMove::from_raw(object_id, source, destination));
    }
    if cursor.has_remaining() {
        return Err(CodecError::MalformedPayload { len: payload.len() });
    }
    Ok(moves)
}
