//! Byte-stream transport abstraction for the AMQP engine.
//!
//! Provides a unified interface over the streams a broker connection can
//! run on:
//! - Plain TCP
//! - TLS over TCP (rustls)
//! - Unix domain sockets (local proxies, tests)
//!
//! This is the lowest layer of amqprims. Everything else builds on top of
//! the [`Transport`] trait and the [`AmqpStream`] type provided here.

pub mod error;
pub mod tcp;
pub mod tls;
pub mod traits;

pub use error::{Result, TransportError};
pub use tcp::connect_tcp;
pub use tls::{connect_tls, TlsConfig};
pub use traits::{AmqpStream, Transport};
