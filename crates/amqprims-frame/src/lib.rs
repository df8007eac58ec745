//! AMQP 0.9.1 framing, method table and content reassembly.
//!
//! Every frame on the wire is laid out as:
//! - A 1-byte frame type (method, header, body, heartbeat)
//! - A 2-byte big-endian channel ID
//! - A 4-byte big-endian payload length
//! - The payload, followed by the 0xCE frame-end octet
//!
//! Method payloads decode into the closed [`Method`] enum. Message content
//! travels as a header frame plus body frames, split and joined by
//! [`content_frames`] and [`ContentCollector`].

#[cfg(feature = "async")]
pub mod async_codec;
mod buffer;
pub mod codec;
pub mod constants;
pub mod content;
pub mod error;
pub mod method;
pub mod properties;
pub mod reader;
pub mod value;
pub mod writer;

#[cfg(feature = "async")]
pub use async_codec::AmqpCodec;
pub use codec::{decode_frame, encode_frame, Frame, FrameConfig, FramePayload, FrameType};
pub use constants::{DEFAULT_FRAME_MAX, FRAME_OVERHEAD, PROTOCOL_HEADER};
pub use content::{body_frame_count, content_frames, Content, ContentCollector};
pub use error::{FrameError, Result};
pub use method::{Method, MethodId};
pub use properties::{BasicProperties, ContentHeader};
pub use reader::FrameReader;
pub use value::{FieldTable, FieldValue, XDeath};
pub use writer::FrameWriter;
