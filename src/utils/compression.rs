//! # Compression Registry
//!
//! Whole-buffer body compressors selected by a small integer tag.
//!
//! The tag is the only thing that travels on the wire; both ends look it up in
//! their own [`CompressorRegistry`]. Registries are assembled once, then shared
//! read-only (`Arc<CompressorRegistry>`) by every codec that needs them.
//!
//! ## Built-in tags
//! | Tag | Algorithm |
//! |-----|-----------|
//! | 0   | identity  |
//! | 1   | gzip      |
//! | 2   | snappy (framed stream format) |
//! | 3   | zlib      |
//!
//! ## Security
//! Every decompression takes an output `limit`. Codecs pass their configured
//! frame limit, so a tiny malicious body cannot expand into an unbounded
//! allocation.

use std::collections::HashMap;
use std::fmt;
use std::io::{Read, Write};
use std::sync::Arc;

use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;
use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, Result};

/// Wire tag naming the compressor applied to a body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompressionType(pub u16);

impl CompressionType {
    pub const RAW: CompressionType = CompressionType(0);
    pub const GZIP: CompressionType = CompressionType(1);
    pub const SNAPPY: CompressionType = CompressionType(2);
    pub const ZLIB: CompressionType = CompressionType(3);

    /// Raw tag value as carried in headers
    #[inline]
    pub fn as_u16(self) -> u16 {
        self.0
    }

    /// Human-readable name for the built-in tags
    pub fn name(self) -> &'static str {
        match self {
            CompressionType::RAW => "raw",
            CompressionType::GZIP => "gzip",
            CompressionType::SNAPPY => "snappy",
            CompressionType::ZLIB => "zlib",
            _ => "unknown",
        }
    }
}

impl From<u16> for CompressionType {
    fn from(tag: u16) -> Self {
        CompressionType(tag)
    }
}

impl fmt::Display for CompressionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name(), self.0)
    }
}

/// A reversible whole-buffer byte transform
pub trait Compressor: Send + Sync {
    /// Compress `data`
    ///
    /// # Errors
    /// Returns `ProtocolError::CompressionFailure` if the encoder fails
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Reverse [`Compressor::compress`], producing at most `limit` bytes
    ///
    /// # Errors
    /// Returns `ProtocolError::DecompressionFailure` on malformed input or when
    /// the output would exceed `limit`
    fn decompress(&self, data: &[u8], limit: usize) -> Result<Vec<u8>>;
}

/// Identity transform
#[derive(Debug, Default, Clone, Copy)]
pub struct RawCompressor;

impl Compressor for RawCompressor {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8], limit: usize) -> Result<Vec<u8>> {
        if data.len() > limit {
            return Err(ProtocolError::DecompressionFailure);
        }
        Ok(data.to_vec())
    }
}

/// gzip (RFC 1952) at the default level
#[derive(Debug, Default, Clone, Copy)]
pub struct GzipCompressor;

impl Compressor for GzipCompressor {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(data)
            .map_err(|_| ProtocolError::CompressionFailure)?;
        encoder
            .finish()
            .map_err(|_| ProtocolError::CompressionFailure)
    }

    fn decompress(&self, data: &[u8], limit: usize) -> Result<Vec<u8>> {
        read_bounded(GzDecoder::new(data), limit)
    }
}

/// Snappy, framed stream format
#[derive(Debug, Default, Clone, Copy)]
pub struct SnappyCompressor;

impl Compressor for SnappyCompressor {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = snap::write::FrameEncoder::new(Vec::new());
        encoder
            .write_all(data)
            .map_err(|_| ProtocolError::CompressionFailure)?;
        encoder
            .into_inner()
            .map_err(|_| ProtocolError::CompressionFailure)
    }

    fn decompress(&self, data: &[u8], limit: usize) -> Result<Vec<u8>> {
        read_bounded(snap::read::FrameDecoder::new(data), limit)
    }
}

/// zlib (RFC 1950) at the default level
#[derive(Debug, Default, Clone, Copy)]
pub struct ZlibCompressor;

impl Compressor for ZlibCompressor {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(data)
            .map_err(|_| ProtocolError::CompressionFailure)?;
        encoder
            .finish()
            .map_err(|_| ProtocolError::CompressionFailure)
    }

    fn decompress(&self, data: &[u8], limit: usize) -> Result<Vec<u8>> {
        read_bounded(ZlibDecoder::new(data), limit)
    }
}

/// Drain a decoder in chunks, failing once the output passes `limit`
fn read_bounded<R: Read>(mut reader: R, limit: usize) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut buffer = [0u8; 8192];
    loop {
        match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => {
                out.extend_from_slice(&buffer[..n]);
                if out.len() > limit {
                    return Err(ProtocolError::DecompressionFailure);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(_) => return Err(ProtocolError::DecompressionFailure),
        }
    }
    Ok(out)
}

/// Immutable tag-to-compressor table.
///
/// Build one with [`CompressorRegistry::builtin`] (optionally extended through
/// [`CompressorRegistry::with`]) and share it behind an `Arc`. There is no way
/// to mutate a registry once it is shared.
#[derive(Clone)]
pub struct CompressorRegistry {
    compressors: HashMap<CompressionType, Arc<dyn Compressor>>,
}

impl CompressorRegistry {
    /// A registry with no compressors at all
    pub fn empty() -> Self {
        Self {
            compressors: HashMap::new(),
        }
    }

    /// The four built-in compressors under their stable tags
    pub fn builtin() -> Self {
        Self::empty()
            .with(CompressionType::RAW, RawCompressor)
            .with(CompressionType::GZIP, GzipCompressor)
            .with(CompressionType::SNAPPY, SnappyCompressor)
            .with(CompressionType::ZLIB, ZlibCompressor)
    }

    /// Add (or replace) the compressor for `tag`
    pub fn with<C: Compressor + 'static>(mut self, tag: CompressionType, compressor: C) -> Self {
        self.compressors.insert(tag, Arc::new(compressor));
        self
    }

    /// Look up the compressor for `tag`
    ///
    /// # Errors
    /// Returns `ProtocolError::UnsupportedCompression` for unregistered tags
    pub fn get(&self, tag: CompressionType) -> Result<&dyn Compressor> {
        self.compressors
            .get(&tag)
            .map(|c| c.as_ref())
            .ok_or(ProtocolError::UnsupportedCompression(tag.as_u16()))
    }

    /// Whether `tag` has a compressor
    pub fn contains(&self, tag: CompressionType) -> bool {
        self.compressors.contains_key(&tag)
    }

    /// Compress `data` with the compressor registered for `tag`
    pub fn compress(&self, tag: CompressionType, data: &[u8]) -> Result<Vec<u8>> {
        self.get(tag)?.compress(data)
    }

    /// Decompress `data` with the compressor registered for `tag`, producing
    /// at most `limit` bytes
    pub fn decompress(&self, tag: CompressionType, data: &[u8], limit: usize) -> Result<Vec<u8>> {
        self.get(tag)?.decompress(data, limit)
    }
}

impl Default for CompressorRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Debug for CompressorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<_> = self.compressors.keys().map(|t| t.as_u16()).collect();
        tags.sort_unstable();
        f.debug_struct("CompressorRegistry")
            .field("tags", &tags)
            .finish()
    }
}
