use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use rustls::{ClientConnection, StreamOwned};

use crate::error::Result;

/// A blocking, bidirectional byte stream the AMQP engine runs on.
///
/// The engine never spawns threads: every read happens inside the call
/// that needs it, bounded by [`Transport::set_read_timeout`].
pub trait Transport: Read + Write {
    /// Set the timeout applied to subsequent blocking reads.
    /// `None` blocks indefinitely.
    fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()>;

    /// Set the timeout applied to subsequent blocking writes.
    fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()>;

    /// Close both directions of the stream.
    fn shutdown(&mut self) -> Result<()>;

    /// Transport name for diagnostics.
    fn transport_name(&self) -> &'static str;
}

impl Transport for TcpStream {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        TcpStream::set_read_timeout(self, timeout).map_err(Into::into)
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        TcpStream::set_write_timeout(self, timeout).map_err(Into::into)
    }

    fn shutdown(&mut self) -> Result<()> {
        shutdown_socket(TcpStream::shutdown(self, Shutdown::Both))
    }

    fn transport_name(&self) -> &'static str {
        "tcp"
    }
}

#[cfg(unix)]
impl Transport for std::os::unix::net::UnixStream {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        std::os::unix::net::UnixStream::set_read_timeout(self, timeout).map_err(Into::into)
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        std::os::unix::net::UnixStream::set_write_timeout(self, timeout).map_err(Into::into)
    }

    fn shutdown(&mut self) -> Result<()> {
        shutdown_socket(std::os::unix::net::UnixStream::shutdown(
            self,
            Shutdown::Both,
        ))
    }

    fn transport_name(&self) -> &'static str {
        "unix-domain-socket"
    }
}

/// A connected broker stream: plain TCP or TLS over TCP.
///
/// This is the concrete type returned by [`crate::connect_tcp`] and
/// [`crate::connect_tls`] once wrapped.
pub struct AmqpStream {
    inner: AmqpStreamInner,
}

enum AmqpStreamInner {
    Tcp(TcpStream),
    Tls(Box<StreamOwned<ClientConnection, TcpStream>>),
}

impl Read for AmqpStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            AmqpStreamInner::Tcp(stream) => stream.read(buf),
            AmqpStreamInner::Tls(stream) => stream.read(buf),
        }
    }
}

impl Write for AmqpStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            AmqpStreamInner::Tcp(stream) => stream.write(buf),
            AmqpStreamInner::Tls(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            AmqpStreamInner::Tcp(stream) => stream.flush(),
            AmqpStreamInner::Tls(stream) => stream.flush(),
        }
    }
}

impl AmqpStream {
    /// Wrap a connected TCP stream.
    pub fn from_tcp(stream: TcpStream) -> Self {
        Self {
            inner: AmqpStreamInner::Tcp(stream),
        }
    }

    /// Wrap an established TLS session.
    pub(crate) fn from_tls(stream: StreamOwned<ClientConnection, TcpStream>) -> Self {
        Self {
            inner: AmqpStreamInner::Tls(Box::new(stream)),
        }
    }

    /// Whether the stream is TLS-protected.
    pub fn is_tls(&self) -> bool {
        matches!(self.inner, AmqpStreamInner::Tls(_))
    }

    fn socket(&self) -> &TcpStream {
        match &self.inner {
            AmqpStreamInner::Tcp(stream) => stream,
            AmqpStreamInner::Tls(stream) => &stream.sock,
        }
    }

    /// Remote address of the underlying socket.
    pub fn peer_addr(&self) -> Result<std::net::SocketAddr> {
        self.socket().peer_addr().map_err(Into::into)
    }
}

impl Transport for AmqpStream {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.socket().set_read_timeout(timeout).map_err(Into::into)
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> Result<()> {
        self.socket().set_write_timeout(timeout).map_err(Into::into)
    }

    fn shutdown(&mut self) -> Result<()> {
        match &mut self.inner {
            AmqpStreamInner::Tcp(stream) => {
                shutdown_socket(TcpStream::shutdown(stream, Shutdown::Both))
            }
            AmqpStreamInner::Tls(stream) => {
                stream.conn.send_close_notify();
                // Best effort: the peer may already be gone.
                let _ = stream.conn.complete_io(&mut stream.sock);
                shutdown_socket(stream.sock.shutdown(Shutdown::Both))
            }
        }
    }

    fn transport_name(&self) -> &'static str {
        match &self.inner {
            AmqpStreamInner::Tcp(_) => "tcp",
            AmqpStreamInner::Tls(_) => "tls",
        }
    }
}

impl std::fmt::Debug for AmqpStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmqpStream")
            .field("type", &self.transport_name())
            .field("peer", &self.socket().peer_addr().ok())
            .finish()
    }
}

fn shutdown_socket(result: std::io::Result<()>) -> Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotConnected => Ok(()),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;

    use super::*;

    #[test]
    fn tcp_stream_roundtrip_through_amqp_stream() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let handle = std::thread::spawn(move || {
            let mut client = AmqpStream::from_tcp(TcpStream::connect(addr).unwrap());
            assert!(!client.is_tls());
            assert_eq!(client.transport_name(), "tcp");
            client.write_all(b"AMQP").unwrap();
            client.flush().unwrap();
        });

        let (mut server, _) = listener.accept().unwrap();
        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"AMQP");

        handle.join().unwrap();
    }

    #[test]
    fn read_timeout_surfaces_as_would_block_or_timed_out() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let mut client = AmqpStream::from_tcp(TcpStream::connect(addr).unwrap());
        let (_server, _) = listener.accept().unwrap();

        Transport::set_read_timeout(&client, Some(Duration::from_millis(10))).unwrap();
        let mut buf = [0u8; 1];
        let err = client.read(&mut buf).unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::WouldBlock | ErrorKind::TimedOut
        ));
    }

    #[test]
    fn shutdown_is_idempotent() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let mut client = AmqpStream::from_tcp(TcpStream::connect(addr).unwrap());
        let (_server, _) = listener.accept().unwrap();

        client.shutdown().unwrap();
        client.shutdown().unwrap();
    }

    #[test]
    #[cfg(unix)]
    fn unix_stream_pair_implements_transport() {
        let (mut left, mut right) = std::os::unix::net::UnixStream::pair().unwrap();
        assert_eq!(left.transport_name(), "unix-domain-socket");

        left.write_all(b"ping").unwrap();
        let mut buf = [0u8; 4];
        right.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");

        Transport::shutdown(&mut left).unwrap();
    }
}
