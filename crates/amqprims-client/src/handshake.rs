use std::fmt;
use std::io::ErrorKind;
use std::time::{Duration, Instant};

use amqprims_frame::constants::FRAME_MIN_SIZE;
use amqprims_frame::{FieldTable, Frame, FrameError, FramePayload, FrameReader, FrameWriter, Method};
use amqprims_transport::Transport;
use bytes::{BufMut, Bytes, BytesMut};
use tracing::{debug, warn};

use crate::config::{ConnectOptions, Tuning};
use crate::error::{ClientError, Result};

/// The only SASL mechanism the client speaks.
pub const MECHANISM_PLAIN: &str = "PLAIN";

const PRODUCT: &str = "amqprims";

/// Floor for the per-read timeout; sockets reject a zero timeout.
const MIN_READ_TIMEOUT: Duration = Duration::from_millis(1);

/// Settings sent to the broker during connection negotiation.
#[derive(Clone)]
pub struct HandshakeConfig {
    pub user: String,
    /// Sent in the PLAIN response and redacted in debug output.
    pub password: String,
    pub vhost: String,
    pub locale: String,
    /// Requested limits; 0 accepts the broker's value.
    pub tuning: Tuning,
    /// Merged over [`default_client_properties`].
    pub client_properties: FieldTable,
    /// Overall deadline for the exchange. `None` blocks.
    pub timeout: Option<Duration>,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        HandshakeConfig::from(&ConnectOptions::default())
    }
}

impl From<&ConnectOptions> for HandshakeConfig {
    fn from(options: &ConnectOptions) -> Self {
        Self {
            user: options.user.clone(),
            password: options.password.clone(),
            vhost: options.vhost.clone(),
            locale: options.locale.clone(),
            tuning: Tuning {
                channel_max: options.channel_max,
                frame_max: options.frame_max,
                heartbeat: options.heartbeat,
            },
            client_properties: options.client_properties.clone(),
            timeout: options.timeout,
        }
    }
}

impl fmt::Debug for HandshakeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandshakeConfig")
            .field("user", &self.user)
            .field(
                "password",
                &format_args!("<redacted:{} bytes>", self.password.len()),
            )
            .field("vhost", &self.vhost)
            .field("locale", &self.locale)
            .field("tuning", &self.tuning)
            .field("client_properties", &self.client_properties)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Result of a successful handshake.
#[derive(Debug, Clone, PartialEq)]
pub struct HandshakeResult {
    pub server_properties: FieldTable,
    /// Properties as sent, defaults included.
    pub client_properties: FieldTable,
    pub mechanisms: Vec<String>,
    pub locales: Vec<String>,
    pub tuning: Tuning,
}

/// Properties every connection announces, before user overrides.
pub fn default_client_properties() -> FieldTable {
    let capabilities: FieldTable = [
        ("publisher_confirms", true),
        ("exchange_exchange_bindings", true),
        ("basic.nack", true),
        ("consumer_cancel_notify", true),
        ("connection.blocked", true),
        ("authentication_failure_close", true),
    ]
    .into_iter()
    .collect();

    let mut props = FieldTable::new();
    props.insert("product", PRODUCT);
    props.insert("version", env!("CARGO_PKG_VERSION"));
    props.insert("platform", "Rust");
    props.insert("information", "https://github.com/3leaps/amqprims");
    props.insert("capabilities", capabilities);
    props
}

/// SASL PLAIN response: `\0user\0password`.
fn plain_response(user: &str, password: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(user.len() + password.len() + 2);
    buf.put_u8(0);
    buf.put_slice(user.as_bytes());
    buf.put_u8(0);
    buf.put_slice(password.as_bytes());
    buf.freeze()
}

fn split_list(list: &str) -> Vec<String> {
    list.split_whitespace().map(str::to_string).collect()
}

/// Negotiate a connection over a stream that has just been connected.
///
/// Sends the protocol header, authenticates with PLAIN, agrees on tuning
/// and opens the virtual host. The caller applies the negotiated
/// `frame_max` to its reader afterwards.
///
/// `config.timeout` bounds the whole exchange. Running out of time is
/// fatal: [`ClientError::HandshakeTimeout`].
pub fn handshake_client<T: Transport>(
    reader: &mut FrameReader<T>,
    config: &HandshakeConfig,
) -> Result<HandshakeResult> {
    let deadline = config.timeout.map(|t| Instant::now() + t);
    let frame_config = reader.config().clone();
    let read_timeout = frame_config.read_timeout;

    FrameWriter::with_config(reader.get_mut(), frame_config.clone()).write_protocol_header()?;

    let (server_properties, mechanisms, locales) = match recv_method(reader, deadline, config)? {
        Method::ConnectionStart {
            version_major,
            version_minor,
            server_properties,
            mechanisms,
            locales,
        } => {
            if (version_major, version_minor) != (0, 9) {
                return Err(ClientError::HandshakeFailed(format!(
                    "broker speaks AMQP {version_major}-{version_minor}, expected 0-9"
                )));
            }
            (server_properties, split_list(&mechanisms), split_list(&locales))
        }
        other => return Err(unexpected("connection.start", &other)),
    };

    if !mechanisms.iter().any(|m| m == MECHANISM_PLAIN) {
        return Err(ClientError::HandshakeFailed(format!(
            "broker does not offer PLAIN authentication (offers: {})",
            mechanisms.join(" ")
        )));
    }
    if !locales.is_empty() && !locales.iter().any(|l| *l == config.locale) {
        debug!(locale = %config.locale, offered = ?locales, "locale not offered by broker");
    }

    let mut client_properties = default_client_properties();
    client_properties.merge(&config.client_properties);

    FrameWriter::with_config(reader.get_mut(), frame_config.clone()).send(
        0,
        Method::ConnectionStartOk {
            client_properties: client_properties.clone(),
            mechanism: MECHANISM_PLAIN.to_string(),
            response: plain_response(&config.user, &config.password),
            locale: config.locale.clone(),
        },
    )?;

    let offered = match recv_method(reader, deadline, config)? {
        Method::ConnectionTune {
            channel_max,
            frame_max,
            heartbeat,
        } => Tuning {
            channel_max,
            frame_max,
            heartbeat,
        },
        Method::ConnectionSecure { .. } => {
            return Err(ClientError::HandshakeFailed(
                "broker sent connection.secure, PLAIN needs no challenge".to_string(),
            ))
        }
        other => return Err(unexpected("connection.tune", &other)),
    };

    let tuning = Tuning::negotiate(&config.tuning, &offered);
    if tuning.frame_max != 0 && (tuning.frame_max as usize) < FRAME_MIN_SIZE {
        return Err(ClientError::HandshakeFailed(format!(
            "negotiated frame_max {} is below the protocol minimum {FRAME_MIN_SIZE}",
            tuning.frame_max
        )));
    }
    debug!(
        channel_max = tuning.channel_max,
        frame_max = tuning.frame_max,
        heartbeat = tuning.heartbeat,
        "connection tuned"
    );

    FrameWriter::with_config(reader.get_mut(), frame_config).write_frames(&[
        Frame::method(
            0,
            Method::ConnectionTuneOk {
                channel_max: tuning.channel_max,
                frame_max: tuning.frame_max,
                heartbeat: tuning.heartbeat,
            },
        ),
        Frame::method(
            0,
            Method::ConnectionOpen {
                virtual_host: config.vhost.clone(),
            },
        ),
    ])?;

    match recv_method(reader, deadline, config)? {
        Method::ConnectionOpenOk => {}
        other => return Err(unexpected("connection.open-ok", &other)),
    }
    if deadline.is_some() {
        reader.get_ref().set_read_timeout(read_timeout)?;
    }

    Ok(HandshakeResult {
        server_properties,
        client_properties,
        mechanisms,
        locales,
        tuning,
    })
}

fn unexpected(expected: &str, found: &Method) -> ClientError {
    ClientError::HandshakeFailed(format!("expected {expected}, got {}", found.name()))
}

/// Next channel-0 method, skipping heartbeats.
///
/// A connection.close from the broker is acknowledged and reported with
/// its reply code.
fn recv_method<T: Transport>(
    reader: &mut FrameReader<T>,
    deadline: Option<Instant>,
    config: &HandshakeConfig,
) -> Result<Method> {
    loop {
        if let (Some(deadline), Some(timeout)) = (deadline, config.timeout) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(ClientError::HandshakeTimeout(timeout));
            }
            reader
                .get_ref()
                .set_read_timeout(Some(remaining.max(MIN_READ_TIMEOUT)))?;
        }

        let frame = match reader.read_frame() {
            Ok(frame) => frame,
            Err(FrameError::Io(err))
                if err.kind() == ErrorKind::WouldBlock || err.kind() == ErrorKind::TimedOut =>
            {
                continue;
            }
            Err(FrameError::ConnectionClosed) => {
                return Err(ClientError::HandshakeFailed(
                    "broker closed the connection during handshake".to_string(),
                ));
            }
            Err(FrameError::ProtocolMismatch {
                major,
                minor,
                revision,
            }) => {
                return Err(ClientError::HandshakeFailed(format!(
                    "broker rejected protocol header, supports AMQP {major}.{minor}.{revision}"
                )));
            }
            Err(err) => return Err(ClientError::from_frame(err)),
        };

        let (channel, kind) = (frame.channel, frame.kind());
        match frame.payload {
            FramePayload::Heartbeat => continue,
            FramePayload::Method(Method::ConnectionClose {
                reply_code,
                reply_text,
                class_id,
                method_id,
            }) if channel == 0 => {
                warn!(reply_code, %reply_text, "broker refused connection");
                let config = reader.config().clone();
                if let Err(err) =
                    FrameWriter::with_config(reader.get_mut(), config).send(0, Method::ConnectionCloseOk)
                {
                    debug!(error = %err, "failed to acknowledge connection.close");
                }
                return Err(ClientError::ConnectionClosed {
                    reply_code,
                    reply_text,
                    class_id,
                    method_id,
                });
            }
            FramePayload::Method(method) if channel == 0 => return Ok(method),
            _ => return Err(ClientError::UnexpectedFrame { channel, found: kind }),
        }
    }
}
