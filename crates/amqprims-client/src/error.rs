use std::time::Duration;

use amqprims_frame::FrameError;
use amqprims_transport::TransportError;

/// Broad class of a [`ClientError`], deciding what is still usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The connection and all of its channels are gone; reconnect.
    Connection,
    /// The broker closed one channel; reopen it before reuse.
    ChannelClosed,
    /// A channel operation was refused locally; nothing was sent.
    Channel,
    /// A deadline passed; state is unconfirmed but nominally usable.
    Timeout,
}

/// Errors that can occur in client operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Frame-level error. Malformed bytes always end the connection.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Handshake failed.
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    /// The handshake did not complete within the connect timeout.
    #[error("handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    /// The broker closed the connection.
    #[error("connection closed by broker: {reply_code} {reply_text}")]
    ConnectionClosed {
        reply_code: u16,
        reply_text: String,
        class_id: u16,
        method_id: u16,
    },

    /// Nothing arrived from the broker for twice the heartbeat interval.
    #[error("no traffic from broker for {0:?}, connection presumed dead")]
    MissedHeartbeat(Duration),

    /// A frame arrived that the protocol does not allow here.
    #[error("unexpected {found} frame on channel {channel}")]
    UnexpectedFrame { channel: u16, found: &'static str },

    /// The connection is not open.
    #[error("not connected")]
    NotConnected,

    /// The broker closed the channel.
    #[error("channel {channel} closed by broker: {reply_code} {reply_text}")]
    ChannelClosed {
        channel: u16,
        reply_code: u16,
        reply_text: String,
        class_id: u16,
        method_id: u16,
    },

    /// A channel operation was refused before anything was sent.
    #[error("channel {channel}: {reason}")]
    Channel { channel: u16, reason: String },

    /// Request timed out.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// An argument cannot be encoded, e.g. a name longer than 255 bytes.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Transport(_)
            | ClientError::Frame(_)
            | ClientError::HandshakeFailed(_)
            | ClientError::HandshakeTimeout(_)
            | ClientError::ConnectionClosed { .. }
            | ClientError::MissedHeartbeat(_)
            | ClientError::UnexpectedFrame { .. }
            | ClientError::NotConnected => ErrorKind::Connection,
            ClientError::ChannelClosed { .. } => ErrorKind::ChannelClosed,
            ClientError::Channel { .. } | ClientError::InvalidArgument(_) => ErrorKind::Channel,
            ClientError::Timeout(_) => ErrorKind::Timeout,
        }
    }

    /// True if the connection must be re-established.
    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Connection
    }

    /// Reply code from the broker's close method, if that caused the error.
    pub fn reply_code(&self) -> Option<u16> {
        match self {
            ClientError::ConnectionClosed { reply_code, .. }
            | ClientError::ChannelClosed { reply_code, .. } => Some(*reply_code),
            _ => None,
        }
    }

    /// Reply text from the broker's close method, if that caused the error.
    pub fn reply_text(&self) -> Option<&str> {
        match self {
            ClientError::ConnectionClosed { reply_text, .. }
            | ClientError::ChannelClosed { reply_text, .. } => Some(reply_text),
            _ => None,
        }
    }

    pub(crate) fn channel(channel: u16, reason: impl Into<String>) -> Self {
        ClientError::Channel {
            channel,
            reason: reason.into(),
        }
    }

    /// Lift a frame error raised while encoding an outgoing request.
    ///
    /// Encoding happens before any byte is written, so size violations are
    /// argument errors rather than connection failures.
    pub(crate) fn from_encode(err: FrameError) -> Self {
        match err {
            FrameError::ShortStringTooLong { .. } | FrameError::PayloadTooLarge { .. } => {
                ClientError::InvalidArgument(err.to_string())
            }
            other => Self::from_frame(other),
        }
    }

    /// Lift a frame error raised while reading. Content sequencing
    /// violations become [`ClientError::UnexpectedFrame`].
    pub(crate) fn from_frame(err: FrameError) -> Self {
        match err {
            FrameError::UnexpectedFrame { channel, found, .. } => {
                ClientError::UnexpectedFrame { channel, found }
            }
            other => ClientError::Frame(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
