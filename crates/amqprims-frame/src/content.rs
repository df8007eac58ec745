//! Splitting message content into frames and joining it back together.
//!
//! A content-bearing method is followed on the same channel by one header
//! frame and then body frames whose sizes add up to the header's
//! `body_size`. No other frame may interleave.

use bytes::{Bytes, BytesMut};

use crate::codec::{Frame, FramePayload};
use crate::constants::FRAME_OVERHEAD;
use crate::error::{FrameError, Result};
use crate::method::Method;
use crate::properties::{BasicProperties, ContentHeader};

/// Largest body slice that fits one frame (0 = unlimited).
fn body_chunk_size(frame_max: usize) -> usize {
    if frame_max == 0 {
        usize::MAX
    } else {
        frame_max.saturating_sub(FRAME_OVERHEAD).max(1)
    }
}

/// Number of body frames a body of `body_len` bytes is split into.
pub fn body_frame_count(body_len: usize, frame_max: usize) -> usize {
    if body_len == 0 {
        0
    } else {
        body_len.div_ceil(body_chunk_size(frame_max))
    }
}

/// Method frame, header frame, then the body split to fit `frame_max`.
pub fn content_frames(
    channel: u16,
    method: Method,
    properties: BasicProperties,
    body: Bytes,
    frame_max: usize,
) -> Vec<Frame> {
    let chunk = body_chunk_size(frame_max);
    let mut frames = Vec::with_capacity(2 + body_frame_count(body.len(), frame_max));
    frames.push(Frame::method(channel, method));
    frames.push(Frame::header(
        channel,
        ContentHeader::basic(body.len() as u64, properties),
    ));

    let mut rest = body;
    while !rest.is_empty() {
        let take = rest.len().min(chunk);
        frames.push(Frame::body(channel, rest.split_to(take)));
    }
    frames
}

/// A fully reassembled message: the method that announced it, its
/// properties and its body.
#[derive(Debug, Clone, PartialEq)]
pub struct Content {
    pub channel: u16,
    pub method: Method,
    pub properties: BasicProperties,
    pub body: Bytes,
}

enum Stage {
    Header,
    Body {
        properties: BasicProperties,
        expected: u64,
        body: BytesMut,
    },
}

/// Collects the header and body frames following a content-bearing method.
pub struct ContentCollector {
    channel: u16,
    method: Method,
    stage: Stage,
}

impl ContentCollector {
    pub fn new(channel: u16, method: Method) -> Self {
        Self {
            channel,
            method,
            stage: Stage::Header,
        }
    }

    pub fn channel(&self) -> u16 {
        self.channel
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    fn expecting(&self) -> &'static str {
        match self.stage {
            Stage::Header => "content header",
            Stage::Body { .. } => "content body",
        }
    }

    fn unexpected(&self, channel: u16, found: &'static str) -> FrameError {
        FrameError::UnexpectedFrame {
            channel,
            expected: self.expecting(),
            found,
        }
    }

    /// Feed the next frame. Returns the message once the body is complete.
    ///
    /// Heartbeats are ignored. Any other frame that is not the next piece of
    /// this content is an error.
    pub fn push(&mut self, frame: Frame) -> Result<Option<Content>> {
        if frame.payload == FramePayload::Heartbeat {
            return Ok(None);
        }
        if frame.channel != self.channel {
            return Err(self.unexpected(frame.channel, frame.kind()));
        }

        let channel = frame.channel;
        match frame.payload {
            FramePayload::Header(header) if matches!(self.stage, Stage::Header) => {
                if header.body_size == 0 {
                    return Ok(Some(self.finish(header.properties, Bytes::new())));
                }
                self.stage = Stage::Body {
                    properties: header.properties,
                    expected: header.body_size,
                    body: BytesMut::with_capacity(header.body_size.min(1 << 20) as usize),
                };
                Ok(None)
            }
            FramePayload::Body(chunk) => {
                let Stage::Body {
                    properties,
                    expected,
                    body,
                } = &mut self.stage
                else {
                    return Err(self.unexpected(channel, "body"));
                };
                let received = body.len() as u64 + chunk.len() as u64;
                if received > *expected {
                    return Err(FrameError::Malformed("content body exceeds declared size"));
                }
                body.extend_from_slice(&chunk);
                if received < *expected {
                    return Ok(None);
                }
                let properties = std::mem::take(properties);
                let body = std::mem::take(body).freeze();
                Ok(Some(self.finish(properties, body)))
            }
            payload => {
                let found = Frame { channel, payload }.kind();
                Err(self.unexpected(channel, found))
            }
        }
    }

    fn finish(&mut self, properties: BasicProperties, body: Bytes) -> Content {
        self.stage = Stage::Header;
        Content {
            channel: self.channel,
            method: self.method.clone(),
            properties,
            body,
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn publish() -> Method {
        Method::BasicPublish {
            exchange: "amq.direct".into(),
            routing_key: "rk".into(),
            mandatory: false,
            immediate: false,
        }
    }

    fn deliver() -> Method {
        Method::BasicDeliver {
            consumer_tag: "ctag".into(),
            delivery_tag: 1,
            redelivered: false,
            exchange: "amq.direct".into(),
            routing_key: "rk".into(),
        }
    }

    fn collect(frames: Vec<Frame>) -> Content {
        let mut frames = frames.into_iter();
        let first = frames.next().unwrap();
        let mut collector = ContentCollector::new(first.channel, first.into_method().unwrap());
        for frame in frames {
            if let Some(content) = collector.push(frame).unwrap() {
                return content;
            }
        }
        panic!("content incomplete");
    }

    #[test]
    fn empty_body_has_no_body_frames() {
        let frames = content_frames(1, publish(), BasicProperties::default(), Bytes::new(), 4096);
        assert_eq!(frames.len(), 2);
        assert_eq!(body_frame_count(0, 4096), 0);

        let content = collect(frames);
        assert!(content.body.is_empty());
    }

    #[test]
    fn body_split_at_frame_max_minus_overhead() {
        let body = Bytes::from(vec![7u8; 10_000]);
        let frames = content_frames(2, publish(), BasicProperties::default(), body.clone(), 4096);

        assert_eq!(frames.len(), 2 + 3);
        let sizes: Vec<usize> = frames[2..]
            .iter()
            .map(|f| match &f.payload {
                FramePayload::Body(b) => b.len(),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(sizes, vec![4088, 4088, 1824]);

        assert_eq!(collect(frames).body, body);
    }

    #[test]
    fn zero_frame_max_sends_one_body_frame() {
        assert_eq!(body_frame_count(1_000_000, 0), 1);
        let frames = content_frames(
            1,
            publish(),
            BasicProperties::default(),
            Bytes::from(vec![0u8; 1_000_000]),
            0,
        );
        assert_eq!(frames.len(), 3);
    }

    #[test]
    fn collector_keeps_method_and_properties() {
        let properties = BasicProperties {
            message_id: Some("m-1".into()),
            ..BasicProperties::default()
        };
        let mut frames = content_frames(
            5,
            publish(),
            properties.clone(),
            Bytes::from_static(b"payload"),
            4096,
        );
        frames[0] = Frame::method(5, deliver());

        let content = collect(frames);
        assert_eq!(content.channel, 5);
        assert_eq!(content.method, deliver());
        assert_eq!(content.properties, properties);
        assert_eq!(content.body.as_ref(), b"payload");
    }

    #[test]
    fn heartbeat_may_interleave() {
        let mut collector = ContentCollector::new(1, deliver());
        collector
            .push(Frame::header(1, ContentHeader::basic(2, BasicProperties::default())))
            .unwrap();
        assert!(collector.push(Frame::heartbeat()).unwrap().is_none());
        let content = collector
            .push(Frame::body(1, Bytes::from_static(b"ok")))
            .unwrap()
            .unwrap();
        assert_eq!(content.body.as_ref(), b"ok");
    }

    #[test]
    fn frame_from_other_channel_is_rejected() {
        let mut collector = ContentCollector::new(1, deliver());
        let err = collector
            .push(Frame::header(2, ContentHeader::basic(0, BasicProperties::default())))
            .unwrap_err();
        assert!(matches!(
            err,
            FrameError::UnexpectedFrame {
                channel: 2,
                expected: "content header",
                found: "header"
            }
        ));
    }

    #[test]
    fn body_before_header_is_rejected() {
        let mut collector = ContentCollector::new(1, deliver());
        let err = collector
            .push(Frame::body(1, Bytes::from_static(b"x")))
            .unwrap_err();
        assert!(matches!(err, FrameError::UnexpectedFrame { found: "body", .. }));
    }

    #[test]
    fn method_during_body_is_rejected() {
        let mut collector = ContentCollector::new(1, deliver());
        collector
            .push(Frame::header(1, ContentHeader::basic(10, BasicProperties::default())))
            .unwrap();
        let err = collector
            .push(Frame::method(1, Method::ChannelCloseOk))
            .unwrap_err();
        assert!(matches!(
            err,
            FrameError::UnexpectedFrame {
                expected: "content body",
                found: "channel.close-ok",
                ..
            }
        ));
    }

    #[test]
    fn body_overrun_is_rejected() {
        let mut collector = ContentCollector::new(1, deliver());
        collector
            .push(Frame::header(1, ContentHeader::basic(2, BasicProperties::default())))
            .unwrap();
        let err = collector
            .push(Frame::body(1, Bytes::from_static(b"abc")))
            .unwrap_err();
        assert!(matches!(err, FrameError::Malformed(_)));
    }

    proptest! {
        #[test]
        fn split_then_collect_is_exact(
            body in proptest::collection::vec(any::<u8>(), 0..40_000),
            frame_max in prop_oneof![Just(0usize), 4096usize..20_000],
        ) {
            let body = Bytes::from(body);
            let frames = content_frames(
                1,
                publish(),
                BasicProperties::default(),
                body.clone(),
                frame_max,
            );

            let expected_bodies = if body.is_empty() {
                0
            } else if frame_max == 0 {
                1
            } else {
                body.len().div_ceil(frame_max - FRAME_OVERHEAD)
            };
            prop_assert_eq!(body_frame_count(body.len(), frame_max), expected_bodies);
            prop_assert_eq!(frames.len(), 2 + expected_bodies);

            for frame in &frames[2..] {
                if let FramePayload::Body(chunk) = &frame.payload {
                    prop_assert!(frame_max == 0 || chunk.len() + FRAME_OVERHEAD <= frame_max);
                    prop_assert!(!chunk.is_empty());
                } else {
                    prop_assert!(false, "expected body frame");
                }
            }

            prop_assert_eq!(collect(frames).body, body);
        }
    }
}
