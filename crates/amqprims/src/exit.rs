use std::fmt;
use std::io;

use amqprims_client::ClientError;
use amqprims_frame::FrameError;
use amqprims_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
/// `get` found the queue empty.
pub const EMPTY: i32 = 2;
pub const TRANSPORT_ERROR: i32 = 3;
pub const NOT_FOUND: i32 = 44;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

/// AMQP reply codes that map onto their own exit codes.
const ACCESS_REFUSED: u16 = 403;
const AMQP_NOT_FOUND: u16 = 404;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused => FAILURE,
        io::ErrorKind::NotFound => NOT_FOUND,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Connect { source, .. } | TransportError::Io(source) => {
            io_error(context, source)
        }
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Io(source) => io_error(context, source),
        FrameError::PayloadTooLarge { .. } | FrameError::ShortStringTooLong { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::ConnectionClosed | FrameError::ProtocolMismatch { .. } => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn client_error(context: &str, err: ClientError) -> CliError {
    match err {
        ClientError::Transport(err) => transport_error(context, err),
        ClientError::Frame(err) => frame_error(context, err),
        ClientError::Timeout(_)
        | ClientError::HandshakeTimeout(_)
        | ClientError::MissedHeartbeat(_) => {
            CliError::new(TIMEOUT, format!("{context}: {err}"))
        }
        ClientError::InvalidArgument(_) => CliError::new(USAGE, format!("{context}: {err}")),
        ClientError::ConnectionClosed { reply_code, .. }
        | ClientError::ChannelClosed { reply_code, .. } => {
            let code = match reply_code {
                ACCESS_REFUSED => PERMISSION_DENIED,
                AMQP_NOT_FOUND => NOT_FOUND,
                _ => FAILURE,
            };
            CliError::new(code, format!("{context}: {err}"))
        }
        ClientError::HandshakeFailed(_) | ClientError::NotConnected => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}
