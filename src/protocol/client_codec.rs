//! # Client Codec
//!
//! Drives the client half of the protocol over one connection.
//!
//! Outbound: serialize → compress → checksum → header frame + body frame →
//! flush. Inbound: header frame → correlate with the pending-call table → body
//! frame → verify → decompress → deserialize.
//!
//! All operations take `&self`, so one codec can be shared (`Arc`) between
//! the callers writing requests and the single task reading responses. Writes
//! are serialized by the write-half lock so a header frame is always followed
//! immediately by its own body frame.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures::SinkExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::core::frame::{
    body_len, receive_body, receive_frame, send_message, split_stream, FrameReader, FrameWriter,
};
use crate::core::header::{Header, RequestHeader, ResponseHeader};
use crate::core::serialization::Serializer;
use crate::error::{ProtocolError, Result};
use crate::utils::checksum;
use crate::utils::compression::{CompressionType, CompressorRegistry};
use crate::utils::header_pool::HeaderPool;

/// What the client learns from a response header
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    /// Sequence id the response answers
    pub seq: u64,
    /// Method recorded for `seq` when the request was written; empty if the
    /// id was not pending
    pub method: String,
    /// Error text from the server, empty on success
    pub error: String,
}

impl Response {
    pub fn is_error(&self) -> bool {
        !self.error.is_empty()
    }
}

struct ReadState {
    frames: FrameReader,
    header: ResponseHeader,
}

/// Client side of the RPC codec
pub struct ClientCodec {
    reader: tokio::sync::Mutex<ReadState>,
    writer: tokio::sync::Mutex<FrameWriter>,
    pending: Mutex<HashMap<u64, String>>,
    headers: HeaderPool<RequestHeader>,
    compression: CompressionType,
    serializer: Serializer,
    registry: Arc<CompressorRegistry>,
    max_body: usize,
}

impl ClientCodec {
    /// Wrap `stream` using the built-in compressor registry
    pub fn new<S>(stream: S, config: &ClientConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self::with_registry(stream, config, Arc::new(CompressorRegistry::builtin()))
    }

    /// Wrap `stream` with an explicit compressor registry
    pub fn with_registry<S>(
        stream: S,
        config: &ClientConfig,
        registry: Arc<CompressorRegistry>,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (frames, writer) = split_stream(stream, config.max_frame_size);
        Self {
            reader: tokio::sync::Mutex::new(ReadState {
                frames,
                header: ResponseHeader::default(),
            }),
            writer: tokio::sync::Mutex::new(writer),
            pending: Mutex::new(HashMap::new()),
            headers: HeaderPool::default(),
            compression: config.compression,
            serializer: config.serializer,
            registry,
            max_body: config.max_frame_size,
        }
    }

    /// Serializer both ends agreed on
    pub fn serializer(&self) -> Serializer {
        self.serializer
    }

    /// Compression tag applied to requests
    pub fn compression(&self) -> CompressionType {
        self.compression
    }

    /// Number of requests written whose response header has not been read
    pub fn pending_len(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }

    /// Write one request (header frame + body frame) and flush.
    ///
    /// `seq` must not collide with a request that is still pending. On any
    /// failure the pending entry for `seq` is removed again.
    pub async fn write_request<T>(&self, seq: u64, method: &str, args: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        self.pending
            .lock()
            .map_err(|_| ProtocolError::lock_poisoned())?
            .insert(seq, method.to_string());

        let result = self.send_request(seq, method, args).await;
        if result.is_err() {
            self.forget(seq);
        }
        result
    }

    async fn send_request<T>(&self, seq: u64, method: &str, args: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let compressor = self.registry.get(self.compression)?;
        let body = self.serializer.marshal(args)?;
        let compressed = compressor.compress(&body)?;

        let header_bytes = {
            let mut header = self.headers.acquire();
            header.id = seq;
            header.method.push_str(method);
            header.request_len = body_len(&compressed)?;
            header.compress_type = self.compression;
            header.checksum = checksum::checksum(&compressed);
            header.marshal()
        };

        let mut writer = self.writer.lock().await;
        send_message(&mut *writer, header_bytes, Bytes::from(compressed)).await?;

        debug!(seq, method, compression = %self.compression, "request written");
        Ok(())
    }

    /// Drop the pending entry for `seq`, returning the method it was sent for
    pub fn forget(&self, seq: u64) -> Option<String> {
        self.pending.lock().ok().and_then(|mut p| p.remove(&seq))
    }

    /// Read and decode the next response header.
    ///
    /// Resolves the pending entry for the decoded sequence id. A response for
    /// an id that is not pending yields an empty method name.
    pub async fn read_response_header(&self) -> Result<Response> {
        let mut state = self.reader.lock().await;
        state.header.reset();

        let frame = receive_frame(&mut state.frames).await?;
        state.header.unmarshal(&frame)?;

        let seq = state.header.id;
        let method = self
            .pending
            .lock()
            .map_err(|_| ProtocolError::lock_poisoned())?
            .remove(&seq);

        let method = method.unwrap_or_else(|| {
            warn!(seq, "response for a sequence id with no pending request");
            String::new()
        });

        Ok(Response {
            seq,
            method,
            error: state.header.error.clone(),
        })
    }

    /// Read the body frame and return it verified and decompressed
    pub async fn read_response_payload(&self) -> Result<Vec<u8>> {
        let mut state = self.reader.lock().await;
        let declared_len = state.header.body_len();
        let body = receive_body(&mut state.frames, declared_len).await?;

        let declared = state.header.compress_type();
        if declared != self.compression {
            return Err(ProtocolError::CompressionMismatch {
                expected: self.compression.as_u16(),
                actual: declared.as_u16(),
            });
        }
        checksum::verify(state.header.checksum(), &body)?;
        self.registry.decompress(declared, &body, self.max_body)
    }

    /// Read the body frame into a value of type `T`
    pub async fn read_response_body<T: DeserializeOwned>(&self) -> Result<T> {
        let payload = self.read_response_payload().await?;
        self.serializer.unmarshal(&payload)
    }

    /// Consume the body frame without decoding it, keeping the stream aligned
    pub async fn discard_response_body(&self) -> Result<()> {
        let mut state = self.reader.lock().await;
        let declared = state.header.body_len();
        receive_body(&mut state.frames, declared).await.map(|_| ())
    }

    /// Flush and shut down the write half of the connection
    pub async fn close(&self) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.close().await
    }
}
