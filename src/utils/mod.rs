//! # Utility Modules
//!
//! Supporting pieces shared by the codecs.
//!
//! ## Components
//! - **Compression**: tag-indexed compressor registry (identity, gzip, snappy, zlib)
//! - **Checksum**: CRC-32/IEEE with the zero-means-skip escape
//! - **Header Pool**: per-connection free list of reusable headers
//! - **Logging**: structured logging configuration
//!
//! ## Security
//! - Decompression bomb protection (output capped at the frame limit)

pub mod checksum;
pub mod compression;
pub mod header_pool;
pub mod logging;

pub use compression::{CompressionType, Compressor, CompressorRegistry};
