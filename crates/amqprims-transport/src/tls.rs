//! TLS client setup over a connected TCP stream (rustls).

use std::fs::File;
use std::io::BufReader;
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{CertificateError, ClientConfig, ClientConnection, DigitallySignedStruct, RootCertStore};
use rustls::StreamOwned;
use tracing::{debug, warn};

use crate::error::{Result, TransportError};
use crate::traits::AmqpStream;

/// TLS settings for a broker connection.
#[derive(Debug, Clone)]
pub struct TlsConfig {
    /// Check that the broker certificate matches the host name.
    /// The chain itself is always verified.
    pub verify_hostname: bool,
    /// PEM bundle of trusted CAs. Falls back to the webpki root set.
    pub ca_cert_path: Option<PathBuf>,
    /// Client certificate (PEM) for mutual TLS.
    pub client_cert_path: Option<PathBuf>,
    /// Client private key (PEM) for mutual TLS.
    pub client_key_path: Option<PathBuf>,
    /// Install the process-wide rustls crypto provider if none is set.
    pub init_crypto_provider: bool,
    /// SNI / verification name; defaults to the connect host.
    pub server_name: Option<String>,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            verify_hostname: true,
            ca_cert_path: None,
            client_cert_path: None,
            client_key_path: None,
            init_crypto_provider: true,
            server_name: None,
        }
    }
}

/// Run the TLS handshake over `tcp` and wrap the session as an [`AmqpStream`].
pub fn connect_tls(tcp: TcpStream, host: &str, config: &TlsConfig) -> Result<AmqpStream> {
    let client_config = build_client_config(config)?;

    let name = config.server_name.as_deref().unwrap_or(host);
    let server_name = ServerName::try_from(name.to_string())
        .map_err(|_| TransportError::TlsConfig(format!("invalid server name: {name}")))?;

    let mut conn = ClientConnection::new(Arc::new(client_config), server_name)
        .map_err(|e| TransportError::TlsHandshake(e.to_string()))?;

    let mut sock = tcp;
    while conn.is_handshaking() {
        conn.complete_io(&mut sock)
            .map_err(|e| TransportError::TlsHandshake(e.to_string()))?;
    }

    debug!(
        server_name = name,
        protocol = ?conn.protocol_version(),
        "TLS session established"
    );
    Ok(AmqpStream::from_tls(StreamOwned::new(conn, sock)))
}

/// Build the rustls client configuration described by `config`.
pub fn build_client_config(config: &TlsConfig) -> Result<ClientConfig> {
    let provider = crypto_provider(config.init_crypto_provider)?;

    let root_store = match config.ca_cert_path {
        Some(ref ca_path) => {
            let mut store = RootCertStore::empty();
            for cert in load_certs(ca_path)? {
                store
                    .add(cert)
                    .map_err(|e| TransportError::TlsConfig(format!("invalid CA cert: {e}")))?;
            }
            store
        }
        None => {
            let mut store = RootCertStore::empty();
            store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
            store
        }
    };

    let builder = ClientConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(|e| TransportError::TlsConfig(e.to_string()))?;

    let builder = if config.verify_hostname {
        builder.with_root_certificates(root_store)
    } else {
        warn!("TLS host name verification disabled");
        let inner = WebPkiServerVerifier::builder_with_provider(Arc::new(root_store), provider)
            .build()
            .map_err(|e| TransportError::TlsConfig(e.to_string()))?;
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(IgnoreHostname { inner }))
    };

    match (&config.client_cert_path, &config.client_key_path) {
        (Some(cert_path), Some(key_path)) => {
            let certs = load_certs(cert_path)?;
            let key = load_private_key(key_path)?;
            builder
                .with_client_auth_cert(certs, key)
                .map_err(|e| TransportError::TlsConfig(format!("invalid client cert/key: {e}")))
        }
        (None, None) => Ok(builder.with_no_client_auth()),
        _ => Err(TransportError::TlsConfig(
            "client certificate and key must be given together".to_string(),
        )),
    }
}

fn crypto_provider(install: bool) -> Result<Arc<CryptoProvider>> {
    if let Some(provider) = CryptoProvider::get_default() {
        return Ok(provider.clone());
    }
    if !install {
        return Err(TransportError::TlsConfig(
            "no rustls crypto provider installed".to_string(),
        ));
    }

    // Losing the race to another installer is fine.
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    CryptoProvider::get_default()
        .cloned()
        .ok_or_else(|| TransportError::TlsConfig("failed to install crypto provider".to_string()))
}

/// Full chain verification that tolerates a name mismatch.
#[derive(Debug)]
struct IgnoreHostname {
    inner: Arc<WebPkiServerVerifier>,
}

fn is_name_mismatch(err: &CertificateError) -> bool {
    // Newer rustls reports the mismatch with context attached.
    matches!(err, CertificateError::NotValidForName)
        || format!("{err:?}").starts_with("NotValidForName")
}

impl ServerCertVerifier for IgnoreHostname {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> std::result::Result<ServerCertVerified, rustls::Error> {
        match self.inner.verify_server_cert(
            end_entity,
            intermediates,
            server_name,
            ocsp_response,
            now,
        ) {
            Err(rustls::Error::InvalidCertificate(err)) if is_name_mismatch(&err) => {
                Ok(ServerCertVerified::assertion())
            }
            other => other,
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> std::result::Result<HandshakeSignatureValid, rustls::Error> {
        self.inner.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.inner.supported_verify_schemes()
    }
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path).map_err(|e| {
        TransportError::TlsConfig(format!("cannot open cert file {}: {e}", path.display()))
    })?;
    let mut reader = BufReader::new(file);

    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| {
            TransportError::TlsConfig(format!("invalid cert file {}: {e}", path.display()))
        })?;
    if certs.is_empty() {
        return Err(TransportError::TlsConfig(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let file = File::open(path).map_err(|e| {
        TransportError::TlsConfig(format!("cannot open key file {}: {e}", path.display()))
    })?;
    let mut reader = BufReader::new(file);

    loop {
        match rustls_pemfile::read_one(&mut reader).map_err(|e| {
            TransportError::TlsConfig(format!("invalid key file {}: {e}", path.display()))
        })? {
            Some(rustls_pemfile::Item::Pkcs1Key(key)) => return Ok(key.into()),
            Some(rustls_pemfile::Item::Pkcs8Key(key)) => return Ok(key.into()),
            Some(rustls_pemfile::Item::Sec1Key(key)) => return Ok(key.into()),
            None => {
                return Err(TransportError::TlsConfig(format!(
                    "no private key found in {}",
                    path.display()
                )))
            }
            _ => continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;

    use super::*;

    #[test]
    fn missing_ca_bundle_is_config_error() {
        let config = TlsConfig {
            ca_cert_path: Some(PathBuf::from("/nonexistent/ca.pem")),
            ..TlsConfig::default()
        };
        let err = build_client_config(&config).unwrap_err();
        assert!(err.to_string().contains("cannot open cert file"));
    }

    #[test]
    fn missing_key_path_is_config_error() {
        let err = load_private_key(Path::new("/nonexistent/key.pem")).unwrap_err();
        assert!(err.to_string().contains("cannot open key file"));
    }

    #[test]
    fn client_cert_without_key_is_rejected() {
        let config = TlsConfig {
            client_cert_path: Some(PathBuf::from("/nonexistent/client.pem")),
            ..TlsConfig::default()
        };
        let err = build_client_config(&config).unwrap_err();
        assert!(err.to_string().contains("must be given together"));
    }

    #[test]
    fn default_config_builds_with_both_verification_modes() {
        build_client_config(&TlsConfig::default()).unwrap();
        build_client_config(&TlsConfig {
            verify_hostname: false,
            ..TlsConfig::default()
        })
        .unwrap();
    }

    #[test]
    fn invalid_server_name_fails_before_handshake() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let tcp = TcpStream::connect(listener.local_addr().unwrap()).unwrap();

        let err = connect_tls(tcp, "not a host name", &TlsConfig::default()).unwrap_err();
        match err {
            TransportError::TlsConfig(msg) => assert!(msg.contains("invalid server name")),
            other => panic!("unexpected error: {other}"),
        }
    }
}
