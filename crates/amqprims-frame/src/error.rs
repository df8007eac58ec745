/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame did not end with the 0xCE marker.
    #[error("invalid frame end marker (expected 0xCE, found {found:#04x})")]
    FrameEnd { found: u8 },

    /// The frame type octet is not one of method, header, body or heartbeat.
    #[error("unknown frame type {0}")]
    UnknownFrameType(u8),

    /// The frame exceeds the negotiated frame_max.
    #[error("frame too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,

    /// A payload ended before all of its fields were read.
    #[error("truncated {0}")]
    Truncated(&'static str),

    /// A payload is structurally invalid.
    #[error("malformed {0}")]
    Malformed(&'static str),

    /// The (class, method) pair is not in the method table.
    #[error("unknown method {class_id}.{method_id}")]
    UnknownMethod { class_id: u16, method_id: u16 },

    /// A field table or array carries an unknown value tag.
    #[error("invalid field value type {0:#04x}")]
    InvalidFieldType(u8),

    /// A string field is not valid UTF-8.
    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),

    /// A short string exceeds 255 bytes.
    #[error("short string too long ({len} bytes, max 255)")]
    ShortStringTooLong { len: usize },

    /// The broker answered with its own protocol header.
    #[error("broker rejected protocol version, offers AMQP {major}.{minor}.{revision}")]
    ProtocolMismatch { major: u8, minor: u8, revision: u8 },

    /// A frame arrived that is not valid in the current content state.
    #[error("unexpected {found} frame on channel {channel} (expected {expected})")]
    UnexpectedFrame {
        channel: u16,
        expected: &'static str,
        found: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, FrameError>;
