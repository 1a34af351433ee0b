//! Unsigned LEB128 variable-length integers.
//!
//! Seven payload bits per byte, least significant group first, high bit set on
//! every byte except the last. Encoding always produces the shortest form, so
//! a `u64` takes between 1 and [`MAX_VARINT_LEN`] bytes.

use bytes::BufMut;

use crate::error::constants::ERR_VARINT_OVERFLOW;
use crate::error::{ProtocolError, Result};

/// Longest encoding of a `u64`
pub const MAX_VARINT_LEN: usize = 10;

/// Number of bytes `value` occupies once encoded
#[inline]
pub fn encoded_len(value: u64) -> usize {
    let bits = 64 - (value | 1).leading_zeros() as usize;
    bits.div_ceil(7)
}

/// Append the shortest encoding of `value` to `buf`
#[inline]
pub fn put_uvarint<B: BufMut>(buf: &mut B, mut value: u64) {
    while value >= 0x80 {
        buf.put_u8((value as u8) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

/// Decode a uvarint from the front of `data`.
///
/// Returns `Ok(None)` when `data` ends before the terminating byte, so stream
/// decoders can wait for more input. Returns the value and the number of bytes
/// consumed otherwise.
pub fn read_uvarint(data: &[u8]) -> Result<Option<(u64, usize)>> {
    let mut value = 0u64;
    let mut shift = 0u32;

    for (i, &byte) in data.iter().enumerate() {
        if i == MAX_VARINT_LEN - 1 && byte > 1 {
            return Err(ProtocolError::Decode(ERR_VARINT_OVERFLOW));
        }
        if byte < 0x80 {
            return Ok(Some((value | (u64::from(byte) << shift), i + 1)));
        }
        value |= u64::from(byte & 0x7f) << shift;
        shift += 7;
    }

    Ok(None)
}
