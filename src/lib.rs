//! # tinyrpc
//!
//! A compact, multiplexed RPC wire protocol over any ordered byte stream.
//!
//! Every message is a header frame followed by a body frame, each prefixed by
//! its uvarint length. Bodies are serialized with a pluggable [`Serializer`],
//! compressed with the codec named by a tag in the header, and protected by a
//! CRC-32 checksum. Responses carry the request's sequence id, so many calls
//! can share one connection and complete in any order.
//!
//! ## Layers
//! - [`core`]: varints, header layouts, framing, serialization
//! - [`utils`]: compression registry, checksums, header pooling, logging
//! - [`protocol`]: client and server codecs, method dispatcher
//! - [`service`]: [`Client`] and [`Server`] facades
//!
//! ## Quick Start
//! ```no_run
//! use tinyrpc::{Client, ClientConfig, Server, ServerConfig};
//!
//! # async fn run() -> tinyrpc::Result<()> {
//! let server = Server::new(ServerConfig::default());
//! server.register("Arith.Add", |(a, b): (i64, i64)| async move {
//!     Ok::<_, String>(a + b)
//! })?;
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:9000").await?;
//! tokio::spawn(async move { server.serve(listener).await });
//!
//! let client = Client::connect("127.0.0.1:9000", ClientConfig::default()).await?;
//! let sum: i64 = client.call("Arith.Add", &(2, 3)).await?;
//! assert_eq!(sum, 5);
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod service;
pub mod utils;

pub use crate::config::{ClientConfig, LoggingConfig, RpcConfig, ServerConfig};
pub use crate::core::serialization::Serializer;
pub use crate::error::{ProtocolError, Result};
pub use crate::protocol::{ClientCodec, ServerCodec};
pub use crate::service::{Client, Server};
pub use crate::utils::compression::CompressionType;
