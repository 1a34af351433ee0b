//! # Frame I/O
//!
//! Length-prefixed framing over a raw duplex byte stream.
//!
//! ## Wire Format
//! ```text
//! [Length(uvarint)] [Payload(Length bytes)]
//! ```
//!
//! A zero length is a valid frame with an empty payload. Every logical message
//! is two frames: the marshalled header, then the compressed body.
//!
//! Partial reads and writes are absorbed by the `FramedRead` / `FramedWrite`
//! adaptors, which keep polling until a whole frame has moved. Any other I/O
//! fault ends the frame operation and is returned to the caller.
//!
//! ## Security
//! The declared length is checked against the configured maximum before any
//! buffer is reserved for the payload.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Decoder, Encoder, FramedRead, FramedWrite};

use crate::config::MAX_FRAME_SIZE;
use crate::core::varint::{put_uvarint, read_uvarint, MAX_VARINT_LEN};
use crate::error::{ProtocolError, Result};

/// Read half of a connection, type-erased
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
/// Write half of a connection, type-erased
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;
/// Frame stream over the read half
pub type FrameReader = FramedRead<BoxedReader, FrameCodec>;
/// Frame sink over the write half
pub type FrameWriter = FramedWrite<BoxedWriter, FrameCodec>;

/// uvarint-length-prefixed frame codec
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(MAX_FRAME_SIZE)
    }
}

impl Decoder for FrameCodec {
    type Item = BytesMut;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        let (len, prefix) = match read_uvarint(src)? {
            Some(decoded) => decoded,
            None => return Ok(None),
        };

        if len > self.max_frame_size as u64 {
            return Err(ProtocolError::FrameTooLarge(len));
        }

        let len = len as usize;
        let total = prefix + len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }

        src.advance(prefix);
        Ok(Some(src.split_to(len)))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => Err(ProtocolError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "stream ended inside a frame",
            ))),
        }
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, payload: Bytes, dst: &mut BytesMut) -> Result<()> {
        if payload.len() > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge(payload.len() as u64));
        }

        dst.reserve(MAX_VARINT_LEN + payload.len());
        put_uvarint(dst, payload.len() as u64);
        dst.put_slice(&payload);
        Ok(())
    }
}

/// Split a duplex stream into framed read and write halves
pub fn split_stream<S>(stream: S, max_frame_size: usize) -> (FrameReader, FrameWriter)
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let reader: BoxedReader = Box::new(read_half);
    let writer: BoxedWriter = Box::new(write_half);
    (
        FramedRead::new(reader, FrameCodec::new(max_frame_size)),
        FramedWrite::new(writer, FrameCodec::new(max_frame_size)),
    )
}

/// Queue one frame on `sink`.
///
/// The frame may sit in the sink's buffer until the caller flushes, which lets
/// a header frame and its body frame leave in one write.
pub async fn send_frame<W>(sink: &mut FramedWrite<W, FrameCodec>, payload: Bytes) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    sink.feed(payload).await
}

/// Queue a header frame and its body frame, then flush both.
///
/// Both lengths are checked against the sink's limit before anything is
/// queued, so a rejected message never leaves a lone header behind.
pub async fn send_message<W>(
    sink: &mut FramedWrite<W, FrameCodec>,
    header: Bytes,
    body: Bytes,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let max = sink.encoder().max_frame_size();
    for len in [header.len(), body.len()] {
        if len > max {
            return Err(ProtocolError::FrameTooLarge(len as u64));
        }
    }

    sink.feed(header).await?;
    sink.feed(body).await?;
    sink.flush().await
}

/// Read the next complete frame from `stream`.
///
/// # Errors
/// `ProtocolError::ConnectionClosed` if the peer closed the stream cleanly
/// between frames.
pub async fn receive_frame<R>(stream: &mut FramedRead<R, FrameCodec>) -> Result<BytesMut>
where
    R: AsyncRead + Unpin,
{
    match stream.next().await {
        Some(frame) => frame,
        None => Err(ProtocolError::ConnectionClosed),
    }
}

/// Read a body frame and check it carries exactly `declared` bytes.
///
/// # Errors
/// `ProtocolError::BodyLengthMismatch` if the frame length differs from the
/// length the header announced.
pub async fn receive_body<R>(
    stream: &mut FramedRead<R, FrameCodec>,
    declared: u32,
) -> Result<BytesMut>
where
    R: AsyncRead + Unpin,
{
    let body = receive_frame(stream).await?;
    if body.len() != declared as usize {
        return Err(ProtocolError::BodyLengthMismatch {
            declared,
            actual: body.len(),
        });
    }
    Ok(body)
}

/// Length of an outbound body as it is carried in a header
pub fn body_len(body: &[u8]) -> Result<u32> {
    u32::try_from(body.len()).map_err(|_| ProtocolError::FrameTooLarge(body.len() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_encode_prefixes_uvarint_length() {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::new();
        codec
            .encode(Bytes::from(vec![0xabu8; 300]), &mut buf)
            .unwrap();
        assert_eq!(&buf[..2], &[0xac, 0x02]);
        assert_eq!(buf.len(), 302);
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_zero_length_frame() {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::new();
        codec.encode(Bytes::new(), &mut buf).unwrap();
        assert_eq!(buf.as_ref(), &[0x00]);

        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert!(frame.is_empty());
        assert!(buf.is_empty());
    }

    #[test]
    #[allow(clippy::unwrap_used)]
    fn test_partial_decode_preserves_buffer() {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::from(&[0x05, 1, 2][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 3);

        buf.extend_from_slice(&[3, 4, 5, 6]);
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.as_ref(), &[1, 2, 3, 4, 5]);
        assert_eq!(buf.as_ref(), &[6]);
    }

    #[test]
    fn test_oversized_frame_rejected_before_allocation() {
        let mut codec = FrameCodec::new(16);
        let mut buf = BytesMut::new();
        put_uvarint(&mut buf, 17);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(ProtocolError::FrameTooLarge(17))
        ));

        let mut out = BytesMut::new();
        assert!(matches!(
            codec.encode(Bytes::from(vec![0u8; 17]), &mut out),
            Err(ProtocolError::FrameTooLarge(17))
        ));
    }

    #[test]
    fn test_eof_inside_frame_is_error() {
        let mut codec = FrameCodec::default();
        let mut buf = BytesMut::from(&[0x04, 1][..]);
        assert!(matches!(
            codec.decode_eof(&mut buf),
            Err(ProtocolError::Io(_))
        ));
    }

    #[tokio::test]
    #[allow(clippy::unwrap_used)]
    async fn test_send_receive_over_duplex() {
        let (client, server) = tokio::io::duplex(64);
        let (_, mut writer) = split_stream(client, MAX_FRAME_SIZE);
        let (mut reader, _) = split_stream(server, MAX_FRAME_SIZE);

        let sender = tokio::spawn(async move {
            send_frame(&mut writer, Bytes::from_static(b"header"))
                .await
                .unwrap();
            send_frame(&mut writer, Bytes::new()).await.unwrap();
            send_frame(&mut writer, Bytes::from(vec![9u8; 1000]))
                .await
                .unwrap();
            writer.flush().await.unwrap();
        });

        assert_eq!(receive_frame(&mut reader).await.unwrap().as_ref(), b"header");
        assert!(receive_frame(&mut reader).await.unwrap().is_empty());
        assert_eq!(receive_frame(&mut reader).await.unwrap().len(), 1000);
        sender.await.unwrap();
    }

    #[tokio::test]
    #[allow(clippy::unwrap_used)]
    async fn test_rejected_message_queues_nothing() {
        let (client, server) = tokio::io::duplex(4096);
        let (_, mut writer) = split_stream(client, 1024);
        let (mut reader, _) = split_stream(server, 1024);

        let oversized = send_message(
            &mut writer,
            Bytes::from_static(b"head"),
            Bytes::from(vec![0u8; 1025]),
        )
        .await;
        assert!(matches!(oversized, Err(ProtocolError::FrameTooLarge(1025))));

        send_message(&mut writer, Bytes::from_static(b"next"), Bytes::new())
            .await
            .unwrap();
        assert_eq!(receive_frame(&mut reader).await.unwrap().as_ref(), b"next");
        assert!(receive_frame(&mut reader).await.unwrap().is_empty());
    }

    #[tokio::test]
    #[allow(clippy::unwrap_used)]
    async fn test_receive_body_checks_declared_length() {
        let (client, server) = tokio::io::duplex(64);
        let (_, mut writer) = split_stream(client, MAX_FRAME_SIZE);
        let (mut reader, _) = split_stream(server, MAX_FRAME_SIZE);

        send_frame(&mut writer, Bytes::from_static(b"abc")).await.unwrap();
        send_frame(&mut writer, Bytes::from_static(b"abcd")).await.unwrap();
        writer.flush().await.unwrap();

        assert_eq!(receive_body(&mut reader, 3).await.unwrap().as_ref(), b"abc");
        assert!(matches!(
            receive_body(&mut reader, 3).await,
            Err(ProtocolError::BodyLengthMismatch {
                declared: 3,
                actual: 4
            })
        ));
    }

    #[tokio::test]
    async fn test_clean_close_reports_connection_closed() {
        let (client, server) = tokio::io::duplex(64);
        drop(client);
        let (mut reader, _) = split_stream(server, MAX_FRAME_SIZE);
        assert!(matches!(
            receive_frame(&mut reader).await,
            Err(ProtocolError::ConnectionClosed)
        ));
    }
}
