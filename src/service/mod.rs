//! # Service Layer
//!
//! Call-level facades over the codecs: a multiplexing [`Client`] and a
//! [`Server`] with its accept loop.

pub mod client;
pub mod server;

pub use client::Client;
pub use server::Server;
