//! # Server Codec
//!
//! Drives the server half of the protocol over one connection.
//!
//! Incoming requests are renumbered with a connection-local counter starting
//! at 1. The dispatch layer only ever sees that number; the client's wire id
//! and the compression tag the request arrived with are parked in the
//! pending-request table until the matching response is written. This lets
//! responses complete in any order while still carrying the right wire id and
//! the same compression tag as their request.
//!
//! The read operations are driven by a single read loop. `write_response` may
//! be called concurrently from any number of tasks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures::SinkExt;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::debug;

use crate::config::ServerConfig;
use crate::core::frame::{
    body_len, receive_body, receive_frame, send_message, split_stream, FrameReader, FrameWriter,
};
use crate::core::header::{Header, RequestHeader, ResponseHeader};
use crate::core::serialization::{Marshal, Serializer};
use crate::error::{ProtocolError, Result};
use crate::utils::checksum;
use crate::utils::compression::{CompressionType, CompressorRegistry};
use crate::utils::header_pool::HeaderPool;

/// A request as presented to the dispatch layer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Request {
    /// Server-local sequence number, not the client's wire id
    pub seq: u64,
    pub method: String,
}

/// The dispatch layer's verdict for one request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    /// Server-local sequence number from the matching [`Request`]
    pub seq: u64,
    /// Error text; empty on success
    pub error: String,
}

impl Reply {
    pub fn ok(seq: u64) -> Self {
        Self {
            seq,
            error: String::new(),
        }
    }

    pub fn error(seq: u64, error: impl Into<String>) -> Self {
        Self {
            seq,
            error: error.into(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct RequestContext {
    wire_id: u64,
    compression: CompressionType,
}

#[derive(Default)]
struct PendingRequests {
    seq: u64,
    requests: HashMap<u64, RequestContext>,
}

struct ReadState {
    frames: FrameReader,
    header: RequestHeader,
}

/// Server side of the RPC codec
pub struct ServerCodec {
    reader: tokio::sync::Mutex<ReadState>,
    writer: tokio::sync::Mutex<FrameWriter>,
    pending: Mutex<PendingRequests>,
    headers: HeaderPool<ResponseHeader>,
    serializer: Serializer,
    registry: Arc<CompressorRegistry>,
    max_body: usize,
}

impl ServerCodec {
    /// Wrap `stream` using the built-in compressor registry
    pub fn new<S>(stream: S, config: &ServerConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self::with_registry(stream, config, Arc::new(CompressorRegistry::builtin()))
    }

    /// Wrap `stream` with an explicit compressor registry
    pub fn with_registry<S>(
        stream: S,
        config: &ServerConfig,
        registry: Arc<CompressorRegistry>,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (frames, writer) = split_stream(stream, config.max_frame_size);
        Self {
            reader: tokio::sync::Mutex::new(ReadState {
                frames,
                header: RequestHeader::default(),
            }),
            writer: tokio::sync::Mutex::new(writer),
            pending: Mutex::new(PendingRequests::default()),
            headers: HeaderPool::default(),
            serializer: config.serializer,
            registry,
            max_body: config.max_frame_size,
        }
    }

    pub fn serializer(&self) -> Serializer {
        self.serializer
    }

    /// Number of requests read but not yet answered
    pub fn pending_len(&self) -> usize {
        self.pending.lock().map(|p| p.requests.len()).unwrap_or(0)
    }

    /// Read and decode the next request header and assign it the next
    /// server-local sequence number.
    pub async fn read_request_header(&self) -> Result<Request> {
        let mut state = self.reader.lock().await;
        state.header.reset();

        let frame = receive_frame(&mut state.frames).await?;
        state.header.unmarshal(&frame)?;

        let context = RequestContext {
            wire_id: state.header.id,
            compression: state.header.compress_type(),
        };

        let seq = {
            let mut pending = self
                .pending
                .lock()
                .map_err(|_| ProtocolError::lock_poisoned())?;
            pending.seq += 1;
            let seq = pending.seq;
            pending.requests.insert(seq, context);
            seq
        };

        debug!(
            seq,
            wire_id = context.wire_id,
            method = %state.header.method,
            "request header read"
        );

        Ok(Request {
            seq,
            method: state.header.method.clone(),
        })
    }

    /// Read the body frame and return it verified and decompressed
    pub async fn read_request_payload(&self) -> Result<Vec<u8>> {
        let mut state = self.reader.lock().await;
        let declared = state.header.body_len();
        let body = receive_body(&mut state.frames, declared).await?;

        let compressor = self.registry.get(state.header.compress_type())?;
        checksum::verify(state.header.checksum(), &body)?;
        compressor.decompress(&body, self.max_body)
    }

    /// Read the body frame into a value of type `T`
    pub async fn read_request_body<T: DeserializeOwned>(&self) -> Result<T> {
        let payload = self.read_request_payload().await?;
        self.serializer.unmarshal(&payload)
    }

    /// Consume the body frame without decoding it, keeping the stream aligned
    pub async fn discard_request_body(&self) -> Result<()> {
        let mut state = self.reader.lock().await;
        let declared = state.header.body_len();
        receive_body(&mut state.frames, declared).await.map(|_| ())
    }

    /// Write the response for `reply.seq` (header frame + body frame) and flush.
    ///
    /// The body is compressed with the tag of the original request. When
    /// `reply` carries an error, `value` is ignored and the body is empty.
    ///
    /// If the body cannot be built (serialization, compression or size
    /// failure) the request stays pending, so the caller can still answer it
    /// with an error reply.
    ///
    /// # Errors
    /// `ProtocolError::InvalidSequence` if `reply.seq` is unknown or was
    /// already answered.
    pub async fn write_response(&self, reply: &Reply, value: Option<&dyn Marshal>) -> Result<()> {
        let context = self
            .pending
            .lock()
            .map_err(|_| ProtocolError::lock_poisoned())?
            .requests
            .get(&reply.seq)
            .copied()
            .ok_or(ProtocolError::InvalidSequence(reply.seq))?;

        let value = if reply.error.is_empty() { value } else { None };
        let compressor = self.registry.get(context.compression)?;
        let body = match value {
            Some(value) => value.marshal_with(self.serializer)?,
            None => Vec::new(),
        };
        let compressed = compressor.compress(&body)?;

        let header_bytes = {
            let mut header = self.headers.acquire();
            header.id = context.wire_id;
            header.error.push_str(&reply.error);
            header.checksum = checksum::checksum(&compressed);
            header.compress_type = context.compression;
            header.response_len = body_len(&compressed)?;
            header.marshal()
        };

        let mut writer = self.writer.lock().await;
        let max = writer.encoder().max_frame_size();
        if compressed.len() > max || header_bytes.len() > max {
            let len = compressed.len().max(header_bytes.len());
            return Err(ProtocolError::FrameTooLarge(len as u64));
        }

        // Claimed under the write lock: exactly one writer answers each request.
        self.pending
            .lock()
            .map_err(|_| ProtocolError::lock_poisoned())?
            .requests
            .remove(&reply.seq)
            .ok_or(ProtocolError::InvalidSequence(reply.seq))?;

        send_message(&mut *writer, header_bytes, Bytes::from(compressed)).await?;

        debug!(
            seq = reply.seq,
            wire_id = context.wire_id,
            compression = %context.compression,
            failed = !reply.error.is_empty(),
            "response written"
        );
        Ok(())
    }

    /// Flush and shut down the write half of the connection
    pub async fn close(&self) -> Result<()> {
        let mut writer = self.writer.lock().await;
        writer.close().await
    }
}
