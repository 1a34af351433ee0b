//! # Message Headers
//!
//! Fixed-shape metadata that precedes every body on the wire.
//!
//! ## Wire Format (little-endian)
//! ```text
//! RequestHeader:
//! [CompressType(u16)] [MethodLen(uvarint)] [Method] [ID(uvarint)] [RequestLen(uvarint)] [Checksum(u32)]
//!
//! ResponseHeader:
//! [CompressType(u16)] [ID(uvarint)] [ErrorLen(uvarint)] [Error] [ResponseLen(uvarint)] [Checksum(u32)]
//! ```
//!
//! Varints always use the shortest encoding. The body length travels as a
//! uvarint but is held as a `u32` in memory; bodies of 4 GiB or more cannot be
//! described and larger decoded values are truncated.
//!
//! Headers are reused across messages: call [`Header::reset`] before refilling
//! one. A failed [`Header::unmarshal`] leaves the header untouched.

use bytes::{BufMut, Bytes, BytesMut};

use crate::core::varint::{encoded_len, put_uvarint, read_uvarint};
use crate::error::constants::{
    ERR_INVALID_UTF8, ERR_TRAILING_BYTES, ERR_TRUNCATED_HEADER, ERR_UNMARSHAL,
};
use crate::error::{ProtocolError, Result};
use crate::utils::compression::CompressionType;

const U16_SIZE: usize = 2;
const U32_SIZE: usize = 4;

/// Operations shared by request and response headers
pub trait Header: Default + Send {
    /// Encode into the minimal wire representation
    fn marshal(&self) -> Bytes;

    /// Populate from wire bytes
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` for empty, truncated or malformed input
    fn unmarshal(&mut self, data: &[u8]) -> Result<()>;

    /// Clear every field back to its zero value
    fn reset(&mut self);

    /// Compression tag of the body this header describes
    fn compress_type(&self) -> CompressionType;

    /// Declared length of the compressed body
    fn body_len(&self) -> u32;

    /// CRC-32/IEEE of the compressed body, `0` meaning "do not verify"
    fn checksum(&self) -> u32;
}

/// Header preceding every request body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestHeader {
    pub compress_type: CompressionType,
    pub method: String,
    pub id: u64,
    pub request_len: u32,
    pub checksum: u32,
}

impl Header for RequestHeader {
    fn marshal(&self) -> Bytes {
        let size = U16_SIZE
            + encoded_len(self.method.len() as u64)
            + self.method.len()
            + encoded_len(self.id)
            + encoded_len(u64::from(self.request_len))
            + U32_SIZE;
        let mut buf = BytesMut::with_capacity(size);
        buf.put_u16_le(self.compress_type.as_u16());
        put_string(&mut buf, &self.method);
        put_uvarint(&mut buf, self.id);
        put_uvarint(&mut buf, u64::from(self.request_len));
        buf.put_u32_le(self.checksum);
        buf.freeze()
    }

    fn unmarshal(&mut self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Err(ProtocolError::Decode(ERR_UNMARSHAL));
        }
        let mut cursor = Cursor::new(data);
        let decoded = RequestHeader {
            compress_type: CompressionType(cursor.u16_le()?),
            method: cursor.string()?,
            id: cursor.uvarint()?,
            request_len: cursor.uvarint()? as u32,
            checksum: cursor.u32_le()?,
        };
        cursor.finish()?;
        *self = decoded;
        Ok(())
    }

    fn reset(&mut self) {
        self.compress_type = CompressionType::default();
        self.method.clear();
        self.id = 0;
        self.request_len = 0;
        self.checksum = 0;
    }

    fn compress_type(&self) -> CompressionType {
        self.compress_type
    }

    fn body_len(&self) -> u32 {
        self.request_len
    }

    fn checksum(&self) -> u32 {
        self.checksum
    }
}

/// Header preceding every response body
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseHeader {
    pub compress_type: CompressionType,
    pub id: u64,
    pub error: String,
    pub response_len: u32,
    pub checksum: u32,
}

impl Header for ResponseHeader {
    fn marshal(&self) -> Bytes {
        let size = U16_SIZE
            + encoded_len(self.id)
            + encoded_len(self.error.len() as u64)
            + self.error.len()
            + encoded_len(u64::from(self.response_len))
            + U32_SIZE;
        let mut buf = BytesMut::with_capacity(size);
        buf.put_u16_le(self.compress_type.as_u16());
        put_uvarint(&mut buf, self.id);
        put_string(&mut buf, &self.error);
        put_uvarint(&mut buf, u64::from(self.response_len));
        buf.put_u32_le(self.checksum);
        buf.freeze()
    }

    fn unmarshal(&mut self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Err(ProtocolError::Decode(ERR_UNMARSHAL));
        }
        let mut cursor = Cursor::new(data);
        let decoded = ResponseHeader {
            compress_type: CompressionType(cursor.u16_le()?),
            id: cursor.uvarint()?,
            error: cursor.string()?,
            response_len: cursor.uvarint()? as u32,
            checksum: cursor.u32_le()?,
        };
        cursor.finish()?;
        *self = decoded;
        Ok(())
    }

    fn reset(&mut self) {
        self.compress_type = CompressionType::default();
        self.id = 0;
        self.error.clear();
        self.response_len = 0;
        self.checksum = 0;
    }

    fn compress_type(&self) -> CompressionType {
        self.compress_type
    }

    fn body_len(&self) -> u32 {
        self.response_len
    }

    fn checksum(&self) -> u32 {
        self.checksum
    }
}

fn put_string(buf: &mut BytesMut, s: &str) {
    put_uvarint(buf, s.len() as u64);
    buf.put_slice(s.as_bytes());
}

/// Bounds-checked reader over header bytes; every short read is a decode error
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or(ProtocolError::Decode(ERR_TRUNCATED_HEADER))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u16_le(&mut self) -> Result<u16> {
        let b = self.take(U16_SIZE)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32_le(&mut self) -> Result<u32> {
        let b = self.take(U32_SIZE)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn uvarint(&mut self) -> Result<u64> {
        match read_uvarint(&self.data[self.pos..])? {
            Some((value, consumed)) => {
                self.pos += consumed;
                Ok(value)
            }
            None => Err(ProtocolError::Decode(ERR_TRUNCATED_HEADER)),
        }
    }

    fn string(&mut self) -> Result<String> {
        let len = usize::try_from(self.uvarint()?)
            .map_err(|_| ProtocolError::Decode(ERR_TRUNCATED_HEADER))?;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| ProtocolError::Decode(ERR_INVALID_UTF8))
    }

    fn finish(self) -> Result<()> {
        if self.pos == self.data.len() {
            Ok(())
        } else {
            Err(ProtocolError::Decode(ERR_TRAILING_BYTES))
        }
    }
}
