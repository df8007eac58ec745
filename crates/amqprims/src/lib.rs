//! AMQP 0.9.1 client primitives with permissive licensing.
//!
//! amqprims speaks AMQP 0.9.1 to a broker over TCP or TLS from a single
//! thread: no background tasks, every read and write happens inside the
//! call that needs it.
//!
//! # Crate Structure
//!
//! - [`transport`] - TCP and rustls TLS streams behind one `Transport` trait
//! - [`frame`] - Frame codec, method table and content reassembly
//! - [`client`] - Connection, channels, synchronous calls and consumers
//!
//! ```no_run
//! use amqprims::client::{connect, ConnectOptions, GetOptions};
//!
//! let mut conn = connect("localhost", &ConnectOptions::default())?;
//! conn.channel_open(1)?;
//! if let Some(message) = conn.get(1, "jobs", &GetOptions::default())? {
//!     println!("{:?}", message.body_str());
//! }
//! conn.disconnect()?;
//! # Ok::<(), amqprims::client::ClientError>(())
//! ```

/// Re-export transport types.
pub mod transport {
    pub use amqprims_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use amqprims_frame::*;
}

/// Re-export client types.
pub mod client {
    pub use amqprims_client::*;
}

pub use amqprims_client::{connect, ClientError, ConnectOptions, Connection, Message};
