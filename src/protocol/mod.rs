//! # Protocol Layer
//!
//! Client and server codecs built on the core framing, plus the method
//! dispatcher that drives a server codec.
//!
//! ## Message Layout
//! ```text
//! request:  [len][u16 compress | uvarint+method | uvarint id | uvarint len | u32 crc][len][body]
//! response: [len][u16 compress | uvarint id | uvarint+error | uvarint len | u32 crc][len][body]
//! ```
//! All fixed-width integers are little-endian.

pub mod client_codec;
pub mod dispatcher;
pub mod server_codec;


pub use client_codec::{ClientCodec, Response};
pub use dispatcher::Dispatcher;
pub use server_codec::{Reply, Request, ServerCodec};
