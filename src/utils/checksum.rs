//! CRC-32/IEEE checksums over compressed bodies.
//!
//! A header checksum of `0` is a wire-level escape meaning "skip
//! verification". Senders always fill in the real value; a body whose CRC
//! happens to be zero is therefore never verified on receipt.

use crc32fast::Hasher;

use crate::error::{ProtocolError, Result};

/// Checksum value that disables verification on the receiving side
pub const SKIP_VERIFICATION: u32 = 0;

/// CRC-32/IEEE of `data`
#[inline]
pub fn checksum(data: &[u8]) -> u32 {
    let mut hasher = Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

/// Check `data` against the checksum a header declared for it
///
/// # Errors
/// Returns `ProtocolError::ChecksumMismatch` when `expected` is non-zero and
/// differs from the CRC of `data`
pub fn verify(expected: u32, data: &[u8]) -> Result<()> {
    if expected == SKIP_VERIFICATION {
        return Ok(());
    }
    let actual = checksum(data);
    if actual != expected {
        return Err(ProtocolError::ChecksumMismatch { expected, actual });
    }
    Ok(())
}
