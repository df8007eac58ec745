use std::io::ErrorKind;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::debug;

use crate::error::{Result, TransportError};

/// Connect to a broker over TCP (blocking).
///
/// Every resolved address is tried in order; the last failure is reported
/// if none accepts. With `timeout` set, each attempt is bounded by it.
pub fn connect_tcp(host: &str, port: u16, timeout: Option<Duration>) -> Result<TcpStream> {
    let addrs: Vec<_> = (host, port)
        .to_socket_addrs()
        .map_err(|source| TransportError::Resolve {
            host: host.to_string(),
            source,
        })?
        .collect();

    if addrs.is_empty() {
        return Err(TransportError::Resolve {
            host: host.to_string(),
            source: std::io::Error::new(ErrorKind::NotFound, "no addresses resolved"),
        });
    }

    let mut last_err = None;
    for addr in addrs {
        let attempt = match timeout {
            Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
            None => TcpStream::connect(addr),
        };

        match attempt {
            Ok(stream) => {
                stream.set_nodelay(true)?;
                debug!(%addr, "connected to broker");
                return Ok(stream);
            }
            Err(err) => {
                debug!(%addr, error = %err, "connect attempt failed");
                last_err = Some(err);
            }
        }
    }

    Err(TransportError::Connect {
        addr: format!("{host}:{port}"),
        source: last_err
            .unwrap_or_else(|| std::io::Error::new(ErrorKind::NotFound, "no addresses tried")),
    })
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpListener;

    use super::*;

    #[test]
    fn connects_to_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let handle = std::thread::spawn(move || {
            let (mut conn, _) = listener.accept().unwrap();
            let mut buf = [0u8; 2];
            conn.read_exact(&mut buf).unwrap();
            buf
        });

        let mut stream = connect_tcp("127.0.0.1", port, Some(Duration::from_secs(2))).unwrap();
        assert!(stream.nodelay().unwrap());
        stream.write_all(b"ok").unwrap();

        assert_eq!(&handle.join().unwrap(), b"ok");
    }

    #[test]
    fn refused_connection_reports_address() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = connect_tcp("127.0.0.1", port, None).unwrap_err();
        match err {
            TransportError::Connect { addr, .. } => assert_eq!(addr, format!("127.0.0.1:{port}")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
