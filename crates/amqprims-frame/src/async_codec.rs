//! Tokio codec for reading and writing AMQP frames.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::codec::{check_frame_size, decode_frame, encode_frame, Frame};
use crate::constants::DEFAULT_FRAME_MAX;
use crate::error::{FrameError, Result};

/// Turns an `AsyncRead + AsyncWrite` into a stream and sink of [`Frame`]s
/// via `tokio_util::codec::Framed`.
#[derive(Debug, Clone)]
pub struct AmqpCodec {
    frame_max: usize,
}

impl AmqpCodec {
    /// Codec bounded by `frame_max` in both directions (0 = no limit).
    pub fn new(frame_max: usize) -> Self {
        Self { frame_max }
    }

    pub fn frame_max(&self) -> usize {
        self.frame_max
    }

    /// Apply a renegotiated limit after connection.tune.
    pub fn set_frame_max(&mut self, frame_max: usize) {
        self.frame_max = frame_max;
    }
}

impl Default for AmqpCodec {
    fn default() -> Self {
        Self::new(DEFAULT_FRAME_MAX as usize)
    }
}

impl Decoder for AmqpCodec {
    type Item = Frame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        let frame = decode_frame(src, self.frame_max)?;
        if let Some(frame) = &frame {
            trace!(channel = frame.channel, kind = frame.kind(), "decoded frame");
        }
        Ok(frame)
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => Err(FrameError::ConnectionClosed),
        }
    }
}

impl Encoder<Frame> for AmqpCodec {
    type Error = FrameError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<()> {
        let start = dst.len();
        encode_frame(&frame, dst)?;
        if let Err(err) = check_frame_size(dst.len() - start, self.frame_max) {
            dst.truncate(start);
            return Err(err);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::codec::FramePayload;
    use crate::method::Method;

    #[test]
    fn encode_then_decode() {
        let mut codec = AmqpCodec::default();
        let mut buf = BytesMut::new();

        codec
            .encode(Frame::method(1, Method::BasicQosOk), &mut buf)
            .unwrap();
        codec.encode(Frame::heartbeat(), &mut buf).unwrap();

        assert_eq!(
            codec.decode(&mut buf).unwrap(),
            Some(Frame::method(1, Method::BasicQosOk))
        );
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Frame::heartbeat()));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn encode_respects_frame_max() {
        let mut codec = AmqpCodec::new(4096);
        let mut buf = BytesMut::new();

        let err = codec
            .encode(Frame::body(1, vec![0u8; 4089]), &mut buf)
            .unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
        assert!(buf.is_empty());

        codec.set_frame_max(0);
        codec
            .encode(Frame::body(1, vec![0u8; 4089]), &mut buf)
            .unwrap();
        let frame = codec.decode(&mut buf).unwrap().unwrap();
        assert!(matches!(frame.payload, FramePayload::Body(ref b) if b.len() == 4089));
    }

    #[test]
    fn eof_with_partial_frame_is_an_error() {
        let mut codec = AmqpCodec::default();
        let mut buf = BytesMut::new();
        codec
            .encode(Frame::body(1, Bytes::from_static(b"abc")), &mut buf)
            .unwrap();
        buf.truncate(buf.len() - 2);

        assert!(matches!(
            codec.decode_eof(&mut buf),
            Err(FrameError::ConnectionClosed)
        ));
        assert_eq!(codec.decode_eof(&mut BytesMut::new()).unwrap(), None);
    }

    #[tokio::test]
    async fn frames_cross_an_async_stream() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let (mut client, mut broker) = tokio::io::duplex(64);
        let mut codec = AmqpCodec::new(4096);
        let mut out = BytesMut::new();
        codec
            .encode(Frame::method(0, Method::ConnectionOpenOk), &mut out)
            .unwrap();
        codec
            .encode(Frame::body(3, vec![7u8; 300]), &mut out)
            .unwrap();

        let writer = tokio::spawn(async move {
            broker.write_all(&out).await.unwrap();
            broker.shutdown().await.unwrap();
        });

        let mut buf = BytesMut::new();
        let mut frames = Vec::new();
        loop {
            while let Some(frame) = codec.decode(&mut buf).unwrap() {
                frames.push(frame);
            }
            if client.read_buf(&mut buf).await.unwrap() == 0 {
                break;
            }
        }
        writer.await.unwrap();

        assert_eq!(codec.decode_eof(&mut buf).unwrap(), None);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0], Frame::method(0, Method::ConnectionOpenOk));
        assert!(matches!(&frames[1].payload, FramePayload::Body(b) if b.len() == 300));
    }
}
