//! Synchronous AMQP 0.9.1 client engine.
//!
//! One [`Connection`] owns one transport and multiplexes numbered channels
//! over it. There are no background threads: every call does the I/O it
//! needs, and while it waits for its own reply it routes frames for all
//! other channels into their state (deliveries, returns, broker closes,
//! confirms).
//!
//! ```no_run
//! use amqprims_client::{
//!     connect, BasicProperties, ConnectOptions, GetOptions, PublishOptions, QueueDeclareOptions,
//! };
//!
//! let mut conn = connect("localhost", &ConnectOptions::default())?;
//! conn.channel_open(1)?;
//! let queue = conn.queue_declare(1, "", &QueueDeclareOptions::default())?.queue;
//! conn.publish(
//!     1,
//!     &queue,
//!     "hello",
//!     BasicProperties::default(),
//!     &PublishOptions { exchange: String::new(), ..PublishOptions::default() },
//! )?;
//! let message = conn.get(1, &queue, &GetOptions::default())?;
//! assert_eq!(message.and_then(|m| m.body_str().map(str::to_string)).as_deref(), Some("hello"));
//! conn.disconnect()?;
//! # Ok::<(), amqprims_client::ClientError>(())
//! ```

pub mod channel;
pub mod config;
pub mod connection;
pub mod connector;
pub mod error;
pub mod handshake;
pub mod liveness;
pub mod message;
pub mod operations;
pub mod options;

pub use amqprims_frame::{BasicProperties, FieldTable, FieldValue, XDeath};
pub use channel::{ChannelState, CloseReason, ConfirmTracker, ConsumerRegistration};
pub use config::{negotiate, ConnectOptions, TlsOptions, Tuning};
pub use connection::{Connection, ConnectionState};
pub use connector::connect;
pub use error::{ClientError, ErrorKind, Result};
pub use handshake::{default_client_properties, handshake_client, HandshakeConfig, HandshakeResult};
pub use liveness::Liveness;
pub use message::{Message, MessageSource};
pub use operations::QueueDeclareOk;
pub use options::{
    BindOptions, ConsumeOptions, ExchangeDeclareOptions, ExchangeDeleteOptions, GetOptions,
    PublishOptions, QosOptions, QueueDeclareOptions, QueueDeleteOptions, QueuePurgeOptions,
};
