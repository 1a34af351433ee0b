//! # Error Types
//!
//! Error handling for the RPC wire protocol.
//!
//! Every failure the codecs can produce is a variant of [`ProtocolError`]. The
//! variants are deliberately fine-grained so callers can tell corruption apart
//! from misconfiguration and from a plain dead connection.
//!
//! ## Error Categories
//! - **Transport**: I/O failures and closed connections
//! - **Decode**: malformed or truncated header bytes, oversized frames
//! - **Compression**: unsupported tags, compressor failures
//! - **Integrity**: checksum, compression-tag and body-length mismatches
//! - **Correlation**: unknown sequence numbers on response write
//! - **Application**: serializer failures and remote error text
//!
//! ## Example Usage
//! ```rust
//! use tinyrpc::error::{ProtocolError, Result};
//!
//! fn check(declared: u32, actual: usize) -> Result<()> {
//!     if declared as usize != actual {
//!         return Err(ProtocolError::BodyLengthMismatch { declared, actual });
//!     }
//!     Ok(())
//! }
//!
//! assert!(check(3, 3).is_ok());
//! assert!(check(3, 4).unwrap_err().is_integrity());
//! ```

use std::io;
use thiserror::Error;

/// Error message constants shared by the codecs and the dispatch loop.
pub mod constants {
    /// Header decoding
    pub const ERR_UNMARSHAL: &str = "an error occurred in Unmarshal";
    pub const ERR_TRUNCATED_HEADER: &str = "truncated header";
    pub const ERR_TRAILING_BYTES: &str = "trailing bytes after header";
    pub const ERR_INVALID_UTF8: &str = "header text is not valid UTF-8";

    /// Varint decoding
    pub const ERR_VARINT_OVERFLOW: &str = "uvarint overflows a 64-bit integer";

    /// Synchronization
    pub const ERR_LOCK_POISONED: &str = "Synchronization primitive poisoned";
}

/// ProtocolError is the primary error type for all protocol operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Decode error: {0}")]
    Decode(&'static str),

    #[error("Frame too large: {0} bytes")]
    FrameTooLarge(u64),

    #[error("Unsupported compression type: {0}")]
    UnsupportedCompression(u16),

    #[error("Compression failed")]
    CompressionFailure,

    #[error("Decompression failed")]
    DecompressionFailure,

    #[error("Checksum mismatch: header declared {expected:#010x}, body hashes to {actual:#010x}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("Compression type mismatch: configured {expected}, response used {actual}")]
    CompressionMismatch { expected: u16, actual: u16 },

    #[error("Body length mismatch: header declared {declared} bytes, frame carried {actual}")]
    BodyLengthMismatch { declared: u32, actual: usize },

    #[error("Invalid sequence: {0}")]
    InvalidSequence(u64),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Deserialize error: {0}")]
    DeserializeError(String),

    #[error("{0}")]
    Remote(String),

    #[error("rpc: can't find method {0}")]
    UnknownMethod(String),

    #[error("Method already registered: {0}")]
    DuplicateMethod(String),

    #[error("Timeout occurred")]
    Timeout,

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl ProtocolError {
    /// True for errors that indicate the bytes on the wire were damaged or
    /// disagree with their own header.
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            ProtocolError::ChecksumMismatch { .. }
                | ProtocolError::CompressionMismatch { .. }
                | ProtocolError::BodyLengthMismatch { .. }
        )
    }

    /// True when the stream can no longer be trusted to be frame-aligned and
    /// the connection has to be torn down.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProtocolError::Io(_)
                | ProtocolError::ConnectionClosed
                | ProtocolError::Decode(_)
                | ProtocolError::FrameTooLarge(_)
        )
    }

    pub(crate) fn lock_poisoned() -> Self {
        ProtocolError::Io(io::Error::other(constants::ERR_LOCK_POISONED))
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
