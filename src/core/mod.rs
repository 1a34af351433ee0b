//! # Core Protocol Components
//!
//! Low-level header encoding, framing, and body serialization.
//!
//! ## Components
//! - **Varint**: shortest-form unsigned LEB128 integers
//! - **Header**: request/response header layouts
//! - **Frame**: uvarint-length-prefixed framing over a byte stream
//! - **Serialization**: pluggable argument/result encodings
//!
//! ## Wire Format
//! ```text
//! [HeaderLen(uvarint)] [Header] [BodyLen(uvarint)] [Body]
//! ```
//!
//! ## Security
//! - Maximum frame size: 16MB by default (prevents memory exhaustion)
//! - Length validation before allocation
//! - Bounds-checked header decoding; malformed input is an error, never a panic

pub mod frame;
pub mod header;
pub mod serialization;
pub mod varint;
