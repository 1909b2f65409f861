//! Variable-length integer encoding.
//!
//! The two most significant bits of the first byte select the width:
//!
//! | Prefix | Width   | Usable bits | Max value                   |
//! |--------|---------|-------------|-----------------------------|
//! | `00`   | 1 byte  | 6           | 63                          |
//! | `01`   | 2 bytes | 14          | 16,383                      |
//! | `10`   | 4 bytes | 30          | 1,073,741,823               |
//! | `11`   | 8 bytes | 62          | 4,611,686,018,427,387,903   |
//!
//! The value is stored big-endian in the remaining bits.

use crate::core::{VARINT_MAX_1, VARINT_MAX_2, VARINT_MAX_4, VARINT_MAX_8};

use super::error::CodecError;

/// Largest encodable value (2^62 - 1).
pub const MAX: u64 = VARINT_MAX_8;

/// A value known to fit the varint range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VarInt(u64);

impl VarInt {
    /// Wrap a value, rejecting anything above [`MAX`].
    pub fn from_u64(value: u64) -> Result<Self, CodecError> {
        if value > MAX {
            return Err(CodecError::ValueTooLarge(value));
        }
        Ok(Self(value))
    }

    /// The wrapped value.
    pub fn into_inner(self) -> u64 {
        self.0
    }

    /// Encoded width in bytes.
    pub fn size(self) -> usize {
        match self.0 {
            0..=VARINT_MAX_1 => 1,
            0..=VARINT_MAX_2 => 2,
            0..=VARINT_MAX_4 => 4,
            _ => 8,
        }
    }

    /// Append the encoding to `out`.
    pub fn write(self, out: &mut Vec<u8>) {
        let v = self.0;
        match self.size() {
            1 => out.push(v as u8),
            2 => out.extend_from_slice(&((v as u16) | 0x4000).to_be_bytes()),
            4 => out.extend_from_slice(&((v as u32) | 0x8000_0000).to_be_bytes()),
            _ => out.extend_from_slice(&(v | 0xC000_0000_0000_0000).to_be_bytes()),
        }
    }
}

impl TryFrom<u64> for VarInt {
    type Error = CodecError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        Self::from_u64(value)
    }
}

impl TryFrom<i64> for VarInt {
    type Error = CodecError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if value < 0 {
            return Err(CodecError::InvalidValue(value));
        }
        Self::from_u64(value as u64)
    }
}

impl TryFrom<usize> for VarInt {
    type Error = CodecError;

    fn try_from(value: usize) -> Result<Self, Self::Error> {
        Self::from_u64(value as u64)
    }
}

impl From<VarInt> for u64 {
    fn from(v: VarInt) -> Self {
        v.0
    }
}

/// Encode `value`, appending to `out`. Returns the number of bytes written.
pub fn encode(value: u64, out: &mut Vec<u8>) -> Result<usize, CodecError> {
    let v = VarInt::from_u64(value)?;
    v.write(out);
    Ok(v.size())
}

/// Encode `value` into a fresh buffer.
pub fn encode_to_vec(value: u64) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::with_capacity(8);
    encode(value, &mut out)?;
    Ok(out)
}

/// Decode a varint from the front of `data`.
///
/// Returns the value and the number of bytes consumed.
pub fn decode(data: &[u8]) -> Result<(u64, usize), CodecError> {
    let Some(&first) = data.first() else {
        return Err(CodecError::TruncatedInput {
            needed: 1,
            available: 0,
        });
    };

    let width = 1usize << (first >> 6);
    if data.len() < width {
        return Err(CodecError::TruncatedInput {
            needed: width,
            available: data.len(),
        });
    }

    let value = data[1..width]
        .iter()
        .fold(u64::from(first & 0x3F), |acc, &b| (acc << 8) | u64::from(b));

    Ok((value, width))
}
