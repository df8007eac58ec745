use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::constants::{
    frame_type_name, DEFAULT_FRAME_MAX, FRAME_BODY, FRAME_END, FRAME_HEADER, FRAME_HEADER_SIZE,
    FRAME_HEARTBEAT, FRAME_METHOD, FRAME_OVERHEAD,
};
use crate::error::{FrameError, Result};
use crate::method::Method;
use crate::properties::ContentHeader;

/// The four frame kinds of AMQP 0.9.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    Method = FRAME_METHOD,
    Header = FRAME_HEADER,
    Body = FRAME_BODY,
    Heartbeat = FRAME_HEARTBEAT,
}

impl FrameType {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            FRAME_METHOD => Ok(Self::Method),
            FRAME_HEADER => Ok(Self::Header),
            FRAME_BODY => Ok(Self::Body),
            FRAME_HEARTBEAT => Ok(Self::Heartbeat),
            other => Err(FrameError::UnknownFrameType(other)),
        }
    }

    pub fn name(self) -> &'static str {
        frame_type_name(self as u8)
    }
}

/// Decoded frame payload.
#[derive(Debug, Clone, PartialEq)]
pub enum FramePayload {
    Method(Method),
    Header(ContentHeader),
    Body(Bytes),
    Heartbeat,
}

/// A frame with its channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Channel 0 carries connection methods and heartbeats.
    pub channel: u16,
    pub payload: FramePayload,
}

impl Frame {
    pub fn method(channel: u16, method: Method) -> Self {
        Self {
            channel,
            payload: FramePayload::Method(method),
        }
    }

    pub fn header(channel: u16, header: ContentHeader) -> Self {
        Self {
            channel,
            payload: FramePayload::Header(header),
        }
    }

    pub fn body(channel: u16, body: impl Into<Bytes>) -> Self {
        Self {
            channel,
            payload: FramePayload::Body(body.into()),
        }
    }

    pub fn heartbeat() -> Self {
        Self {
            channel: 0,
            payload: FramePayload::Heartbeat,
        }
    }

    pub fn frame_type(&self) -> FrameType {
        match self.payload {
            FramePayload::Method(_) => FrameType::Method,
            FramePayload::Header(_) => FrameType::Header,
            FramePayload::Body(_) => FrameType::Body,
            FramePayload::Heartbeat => FrameType::Heartbeat,
        }
    }

    /// Short description for logs and errors: the method name or the frame kind.
    pub fn kind(&self) -> &'static str {
        match &self.payload {
            FramePayload::Method(method) => method.name(),
            _ => self.frame_type().name(),
        }
    }

    pub fn as_method(&self) -> Option<&Method> {
        match &self.payload {
            FramePayload::Method(method) => Some(method),
            _ => None,
        }
    }

    pub fn into_method(self) -> Option<Method> {
        match self.payload {
            FramePayload::Method(method) => Some(method),
            _ => None,
        }
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────┬────────────┬─────────────┬──────────────┬───────────┐
/// │ Type (1B)│ Channel    │ Size        │ Payload      │ End (1B)  │
/// │          │ (2B BE)    │ (4B BE)     │ (Size bytes) │ 0xCE      │
/// └──────────┴────────────┴─────────────┴──────────────┴───────────┘
/// ```
///
/// On error nothing is left behind in `dst`.
pub fn encode_frame(frame: &Frame, dst: &mut BytesMut) -> Result<()> {
    let start = dst.len();
    let result = encode_into(frame, dst);
    if result.is_err() {
        dst.truncate(start);
    }
    result
}

fn encode_into(frame: &Frame, dst: &mut BytesMut) -> Result<()> {
    let start = dst.len();
    dst.put_u8(frame.frame_type() as u8);
    dst.put_u16(frame.channel);
    dst.put_u32(0);

    match &frame.payload {
        FramePayload::Method(method) => method.encode(dst)?,
        FramePayload::Header(header) => header.encode(dst)?,
        FramePayload::Body(body) => dst.put_slice(body),
        FramePayload::Heartbeat => {}
    }

    let size = dst.len() - start - FRAME_HEADER_SIZE;
    if size > u32::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size,
            max: u32::MAX as usize,
        });
    }
    dst[start + 3..start + FRAME_HEADER_SIZE].copy_from_slice(&(size as u32).to_be_bytes());
    dst.put_u8(FRAME_END);
    Ok(())
}

/// Reject a frame of `wire_size` bytes that exceeds `frame_max` (0 = no limit).
pub fn check_frame_size(wire_size: usize, frame_max: usize) -> Result<()> {
    if frame_max != 0 && wire_size > frame_max {
        return Err(FrameError::PayloadTooLarge {
            size: wire_size,
            max: frame_max,
        });
    }
    Ok(())
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer. `frame_max` bounds
/// the whole frame including its header and end octet; 0 disables the check.
pub fn decode_frame(src: &mut BytesMut, frame_max: usize) -> Result<Option<Frame>> {
    if src.len() < FRAME_HEADER_SIZE {
        return Ok(None);
    }

    // A broker that refuses our version answers with the header it supports.
    if src[..4] == *b"AMQP" {
        if src.len() < 8 {
            return Ok(None);
        }
        return Err(FrameError::ProtocolMismatch {
            major: src[5],
            minor: src[6],
            revision: src[7],
        });
    }

    let frame_type = FrameType::from_u8(src[0])?;
    let channel = u16::from_be_bytes([src[1], src[2]]);
    let size = u32::from_be_bytes([src[3], src[4], src[5], src[6]]) as usize;

    check_frame_size(size + FRAME_OVERHEAD, frame_max)?;

    let total = FRAME_HEADER_SIZE + size + 1;
    if src.len() < total {
        return Ok(None);
    }
    let end = src[total - 1];
    if end != FRAME_END {
        return Err(FrameError::FrameEnd { found: end });
    }

    src.advance(FRAME_HEADER_SIZE);
    let payload = src.split_to(size).freeze();
    src.advance(1);

    let payload = match frame_type {
        FrameType::Method => FramePayload::Method(Method::decode(&payload)?),
        FrameType::Header => FramePayload::Header(ContentHeader::decode(&payload)?),
        FrameType::Body => FramePayload::Body(payload),
        FrameType::Heartbeat => {
            if !payload.is_empty() {
                return Err(FrameError::Malformed("heartbeat payload"));
            }
            FramePayload::Heartbeat
        }
    };

    Ok(Some(Frame { channel, payload }))
}

/// Configuration for the frame reader and writer.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Largest frame accepted or sent, header and end octet included.
    /// 0 means no limit. Default: 131072.
    pub frame_max: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            frame_max: DEFAULT_FRAME_MAX as usize,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::PROTOCOL_HEADER;
    use crate::properties::BasicProperties;

    const MAX: usize = DEFAULT_FRAME_MAX as usize;

    fn tune() -> Method {
        Method::ConnectionTune {
            channel_max: 2047,
            frame_max: 131_072,
            heartbeat: 60,
        }
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let mut buf = BytesMut::new();
        let frame = Frame::method(0, tune());

        encode_frame(&frame, &mut buf).unwrap();
        assert_eq!(buf[0], FRAME_METHOD);
        assert_eq!(*buf.last().unwrap(), FRAME_END);

        let decoded = decode_frame(&mut buf, MAX).unwrap().unwrap();
        assert_eq!(decoded, frame);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_heartbeat_wire_bytes() {
        let mut buf = BytesMut::new();
        encode_frame(&Frame::heartbeat(), &mut buf).unwrap();
        assert_eq!(buf.as_ref(), &[8, 0, 0, 0, 0, 0, 0, 0xCE]);

        let frame = decode_frame(&mut buf, MAX).unwrap().unwrap();
        assert_eq!(frame.payload, FramePayload::Heartbeat);
        assert_eq!(frame.kind(), "heartbeat");
    }

    #[test]
    fn test_header_and_body_frames() {
        let mut buf = BytesMut::new();
        let header = ContentHeader::basic(
            5,
            BasicProperties {
                content_type: Some("text/plain".into()),
                ..BasicProperties::default()
            },
        );
        encode_frame(&Frame::header(3, header.clone()), &mut buf).unwrap();
        encode_frame(&Frame::body(3, &b"hello"[..]), &mut buf).unwrap();

        let f1 = decode_frame(&mut buf, MAX).unwrap().unwrap();
        assert_eq!(f1, Frame::header(3, header));
        let f2 = decode_frame(&mut buf, MAX).unwrap().unwrap();
        assert_eq!(f2.channel, 3);
        assert_eq!(f2.payload, FramePayload::Body(Bytes::from_static(b"hello")));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_incomplete_header() {
        let mut buf = BytesMut::from(&[FRAME_METHOD, 0x00, 0x01][..]);
        assert!(decode_frame(&mut buf, MAX).unwrap().is_none());
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn test_decode_incomplete_payload() {
        let mut buf = BytesMut::new();
        encode_frame(&Frame::method(1, Method::ChannelOpen), &mut buf).unwrap();
        let full = buf.len();
        buf.truncate(full - 1);

        assert!(decode_frame(&mut buf, MAX).unwrap().is_none());
        assert_eq!(buf.len(), full - 1);
    }

    #[test]
    fn test_decode_bad_frame_end() {
        let mut buf = BytesMut::new();
        encode_frame(&Frame::heartbeat(), &mut buf).unwrap();
        let last = buf.len() - 1;
        buf[last] = 0x00;

        let result = decode_frame(&mut buf, MAX);
        assert!(matches!(result, Err(FrameError::FrameEnd { found: 0x00 })));
    }

    #[test]
    fn test_decode_unknown_frame_type() {
        let mut buf = BytesMut::from(&[4u8, 0, 0, 0, 0, 0, 0, 0xCE][..]);
        let result = decode_frame(&mut buf, MAX);
        assert!(matches!(result, Err(FrameError::UnknownFrameType(4))));
    }

    #[test]
    fn test_decode_protocol_header_reply() {
        let mut buf = BytesMut::from(&b"AMQP\x00\x00\x08\x00"[..]);
        let result = decode_frame(&mut buf, MAX);
        assert!(matches!(
            result,
            Err(FrameError::ProtocolMismatch {
                major: 0,
                minor: 8,
                revision: 0
            })
        ));

        let mut partial = BytesMut::from(&PROTOCOL_HEADER[..7]);
        assert!(decode_frame(&mut partial, MAX).unwrap().is_none());
    }

    #[test]
    fn test_decode_frame_too_large() {
        let mut buf = BytesMut::new();
        buf.put_u8(FRAME_BODY);
        buf.put_u16(1);
        buf.put_u32(4096);

        let result = decode_frame(&mut buf, 4096);
        assert!(matches!(
            result,
            Err(FrameError::PayloadTooLarge {
                size: 4104,
                max: 4096
            })
        ));
    }

    #[test]
    fn test_zero_frame_max_is_unlimited() {
        let mut buf = BytesMut::new();
        let body = vec![0xAB; 300_000];
        encode_frame(&Frame::body(1, body.clone()), &mut buf).unwrap();

        let frame = decode_frame(&mut buf, 0).unwrap().unwrap();
        assert_eq!(frame.payload, FramePayload::Body(Bytes::from(body)));
    }

    #[test]
    fn test_multiple_frames() {
        let mut buf = BytesMut::new();
        encode_frame(&Frame::method(1, Method::ChannelOpen), &mut buf).unwrap();
        encode_frame(&Frame::method(2, Method::TxSelect), &mut buf).unwrap();

        let f1 = decode_frame(&mut buf, MAX).unwrap().unwrap();
        assert_eq!(f1.channel, 1);
        assert_eq!(f1.kind(), "channel.open");

        let f2 = decode_frame(&mut buf, MAX).unwrap().unwrap();
        assert_eq!(f2.channel, 2);
        assert_eq!(f2.into_method(), Some(Method::TxSelect));

        assert!(buf.is_empty());
    }

    #[test]
    fn test_heartbeat_with_payload_is_malformed() {
        let mut buf = BytesMut::from(&[FRAME_HEARTBEAT, 0, 0, 0, 0, 0, 1, 0xFF, 0xCE][..]);
        let result = decode_frame(&mut buf, MAX);
        assert!(matches!(result, Err(FrameError::Malformed(_))));
    }

    #[test]
    fn test_failed_encode_leaves_buffer_untouched() {
        let mut buf = BytesMut::new();
        encode_frame(&Frame::heartbeat(), &mut buf).unwrap();
        let before = buf.clone();

        let err = encode_frame(
            &Frame::method(
                1,
                Method::BasicConsumeOk {
                    consumer_tag: "t".repeat(300),
                },
            ),
            &mut buf,
        )
        .unwrap_err();
        assert!(matches!(err, FrameError::ShortStringTooLong { len: 300 }));
        assert_eq!(buf, before);
    }

    #[test]
    fn test_frame_type_from_u8() {
        assert_eq!(FrameType::from_u8(1).unwrap(), FrameType::Method);
        assert_eq!(FrameType::from_u8(8).unwrap(), FrameType::Heartbeat);
        assert!(FrameType::from_u8(0).is_err());
        assert_eq!(FrameType::Body.name(), "body");
    }
}
