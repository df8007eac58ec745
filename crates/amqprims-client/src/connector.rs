use amqprims_transport::{connect_tcp, connect_tls, AmqpStream, TlsConfig};
use tracing::debug;

use crate::config::ConnectOptions;
use crate::connection::Connection;
use crate::error::Result;

/// Connect to a broker at `host` and run the handshake.
///
/// `options.timeout` bounds the TCP connect, the TLS handshake and the AMQP
/// handshake separately.
pub fn connect(host: &str, options: &ConnectOptions) -> Result<Connection<AmqpStream>> {
    let tcp = connect_tcp(host, options.port, options.timeout)?;

    let stream = if options.ssl {
        tcp.set_read_timeout(options.timeout)
            .and_then(|()| tcp.set_write_timeout(options.timeout))
            .map_err(amqprims_transport::TransportError::from)?;
        let tls = TlsConfig::from(&options.tls);
        debug!(host, verify_host = tls.verify_hostname, "starting TLS");
        connect_tls(tcp, host, &tls)?
    } else {
        AmqpStream::from_tcp(tcp)
    };

    Connection::open(stream, options)
}
