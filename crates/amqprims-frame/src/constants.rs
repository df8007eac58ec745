//! Wire constants: frame types, class IDs and reply codes.

/// Protocol header sent by the client before anything else.
pub const PROTOCOL_HEADER: [u8; 8] = *b"AMQP\x00\x00\x09\x01";

pub const FRAME_METHOD: u8 = 1;
pub const FRAME_HEADER: u8 = 2;
pub const FRAME_BODY: u8 = 3;
pub const FRAME_HEARTBEAT: u8 = 8;

/// Trailing octet of every frame.
pub const FRAME_END: u8 = 0xCE;

/// Type (1) + channel (2) + size (4).
pub const FRAME_HEADER_SIZE: usize = 7;

/// Bytes a frame adds around its payload: header plus end octet.
pub const FRAME_OVERHEAD: usize = FRAME_HEADER_SIZE + 1;

/// Smallest frame_max a peer may negotiate.
pub const FRAME_MIN_SIZE: usize = 4096;

/// Client-requested frame_max unless configured otherwise.
pub const DEFAULT_FRAME_MAX: u32 = 131_072;

/// Effective channel limit when channel_max negotiates to 0.
pub const CHANNEL_MAX_LIMIT: u16 = u16::MAX;

pub const CLASS_CONNECTION: u16 = 10;
pub const CLASS_CHANNEL: u16 = 20;
pub const CLASS_EXCHANGE: u16 = 40;
pub const CLASS_QUEUE: u16 = 50;
pub const CLASS_BASIC: u16 = 60;
pub const CLASS_CONFIRM: u16 = 85;
pub const CLASS_TX: u16 = 90;

pub const REPLY_SUCCESS: u16 = 200;
pub const CONTENT_TOO_LARGE: u16 = 311;
pub const NO_ROUTE: u16 = 312;
pub const NO_CONSUMERS: u16 = 313;
pub const CONNECTION_FORCED: u16 = 320;
pub const INVALID_PATH: u16 = 402;
pub const ACCESS_REFUSED: u16 = 403;
pub const NOT_FOUND: u16 = 404;
pub const RESOURCE_LOCKED: u16 = 405;
pub const PRECONDITION_FAILED: u16 = 406;
pub const FRAME_ERROR: u16 = 501;
pub const SYNTAX_ERROR: u16 = 502;
pub const COMMAND_INVALID: u16 = 503;
pub const CHANNEL_ERROR: u16 = 504;
pub const UNEXPECTED_FRAME: u16 = 505;
pub const RESOURCE_ERROR: u16 = 506;
pub const NOT_ALLOWED: u16 = 530;
pub const NOT_IMPLEMENTED: u16 = 540;
pub const INTERNAL_ERROR: u16 = 541;

/// Returns true if the reply code closes the whole connection.
pub fn is_hard_error(code: u16) -> bool {
    matches!(
        code,
        CONNECTION_FORCED
            | INVALID_PATH
            | FRAME_ERROR..=RESOURCE_ERROR
            | NOT_ALLOWED
            | NOT_IMPLEMENTED
            | INTERNAL_ERROR
    )
}

/// Returns a human-readable name for a frame type octet.
pub fn frame_type_name(frame_type: u8) -> &'static str {
    match frame_type {
        FRAME_METHOD => "method",
        FRAME_HEADER => "header",
        FRAME_BODY => "body",
        FRAME_HEARTBEAT => "heartbeat",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn soft_and_hard_reply_codes() {
        assert!(!is_hard_error(NOT_FOUND));
        assert!(!is_hard_error(ACCESS_REFUSED));
        assert!(!is_hard_error(PRECONDITION_FAILED));
        assert!(is_hard_error(CONNECTION_FORCED));
        assert!(is_hard_error(UNEXPECTED_FRAME));
        assert!(is_hard_error(NOT_ALLOWED));
    }

    #[test]
    fn overhead_matches_layout() {
        assert_eq!(FRAME_OVERHEAD, 8);
        assert_eq!(&PROTOCOL_HEADER[..4], b"AMQP");
    }
}
