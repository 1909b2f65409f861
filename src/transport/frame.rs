//! Frame encoding and decoding.
//!
//! Frames travel inside decrypted DATA/0RTT payloads, concatenated with no
//! outer length prefix:
//!
//! ```text
//! STREAM: type(varint=0x08) | stream_id(varint) | offset(varint) | len(varint) | bytes
//! ACK:    type(varint=0x02) | stream_id(varint) | acked_offset(varint)
//! ```
//!
//! An unrecognised type tag consumes only the tag itself and is surfaced as
//! [`Frame::Unknown`] so the caller can skip it without losing sync.

use crate::core::{FRAME_TYPE_ACK, FRAME_TYPE_STREAM};

use super::error::CodecError;
use super::varint;

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Application bytes for `stream_id` starting at byte `offset`.
    Stream {
        /// Stream identifier.
        stream_id: u64,
        /// Byte offset of `data` within the stream.
        offset: u64,
        /// Payload.
        data: Vec<u8>,
    },
    /// Acknowledges the STREAM frame at (`stream_id`, `offset`).
    Ack {
        /// Stream identifier.
        stream_id: u64,
        /// Offset of the acknowledged STREAM frame.
        offset: u64,
    },
    /// Unrecognised frame type tag.
    Unknown(u64),
}

impl Frame {
    /// Build a STREAM frame.
    pub fn stream(stream_id: u64, offset: u64, data: impl Into<Vec<u8>>) -> Self {
        Self::Stream {
            stream_id,
            offset,
            data: data.into(),
        }
    }

    /// Build an ACK frame.
    pub fn ack(stream_id: u64, offset: u64) -> Self {
        Self::Ack { stream_id, offset }
    }

    /// Append this frame's encoding to `out`.
    ///
    /// Fails only if a field exceeds the varint range; `out` is left
    /// untouched in that case.
    pub fn encode(&self, out: &mut Vec<u8>) -> Result<(), CodecError> {
        let start = out.len();
        let result = self.encode_inner(out);
        if result.is_err() {
            out.truncate(start);
        }
        result
    }

    fn encode_inner(&self, out: &mut Vec<u8>) -> Result<(), CodecError> {
        match self {
            Frame::Stream {
                stream_id,
                offset,
                data,
            } => {
                varint::encode(FRAME_TYPE_STREAM, out)?;
                varint::encode(*stream_id, out)?;
                varint::encode(*offset, out)?;
                varint::VarInt::try_from(data.len())?.write(out);
                out.extend_from_slice(data);
            }
            Frame::Ack { stream_id, offset } => {
                varint::encode(FRAME_TYPE_ACK, out)?;
                varint::encode(*stream_id, out)?;
                varint::encode(*offset, out)?;
            }
            Frame::Unknown(tag) => {
                varint::encode(*tag, out)?;
            }
        }
        Ok(())
    }

    /// Encode into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::new();
        self.encode(&mut out)?;
        Ok(out)
    }

    /// Decode one frame from the front of `data`.
    ///
    /// Returns the frame and the number of bytes consumed.
    pub fn decode(data: &[u8]) -> Result<(Frame, usize), CodecError> {
        let mut cursor = Cursor { data, pos: 0 };
        let frame_type = cursor.varint()?;

        let frame = match frame_type {
            FRAME_TYPE_STREAM => {
                let stream_id = cursor.varint()?;
                let offset = cursor.varint()?;
                let len = cursor.varint()?;
                let data = cursor.bytes(len)?.to_vec();
                Frame::Stream {
                    stream_id,
                    offset,
                    data,
                }
            }
            FRAME_TYPE_ACK => {
                let stream_id = cursor.varint()?;
                let offset = cursor.varint()?;
                Frame::Ack { stream_id, offset }
            }
            other => Frame::Unknown(other),
        };

        Ok((frame, cursor.pos))
    }
}

/// Decode every frame in `data`.
///
/// Returns the frames and the total bytes consumed (always `data.len()` on
/// success). A truncated trailing frame fails the whole buffer.
pub fn decode_frames(data: &[u8]) -> Result<(Vec<Frame>, usize), CodecError> {
    let mut frames = Vec::new();
    let mut pos = 0;
    while pos < data.len() {
        let (frame, used) = Frame::decode(&data[pos..])?;
        frames.push(frame);
        pos += used;
    }
    Ok((frames, pos))
}

/// Encode a sequence of frames back to back.
pub fn encode_frames(frames: &[Frame]) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    for frame in frames {
        frame.encode(&mut out)?;
    }
    Ok(out)
}

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn varint(&mut self) -> Result<u64, CodecError> {
        let (value, used) = varint::decode(&self.data[self.pos..])?;
        self.pos += used;
        Ok(value)
    }

    fn bytes(&mut self, len: u64) -> Result<&'a [u8], CodecError> {
        let available = self.data.len() - self.pos;
        let len = usize::try_from(len).unwrap_or(usize::MAX);
        if len > available {
            return Err(CodecError::TruncatedInput {
                needed: len,
                available,
            });
        }
        let out = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }
}
