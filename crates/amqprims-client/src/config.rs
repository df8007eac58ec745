use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use amqprims_frame::constants::{CHANNEL_MAX_LIMIT, DEFAULT_FRAME_MAX};
use amqprims_frame::FieldTable;
use amqprims_transport::TlsConfig;
use serde::{Deserialize, Serialize};

use crate::error::{ClientError, Result};

pub const DEFAULT_PORT: u16 = 5672;
pub const DEFAULT_TLS_PORT: u16 = 5671;
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(3);

/// Options for [`connect`](crate::connect) and [`Connection::open`](crate::Connection::open).
///
/// Every field has a default, so a config file only needs the fields it
/// changes.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectOptions {
    pub user: String,
    pub password: String,
    pub port: u16,
    pub vhost: String,
    /// Requested channel limit; 0 accepts the broker's.
    pub channel_max: u16,
    /// Requested frame size limit including frame overhead; 0 means unlimited.
    pub frame_max: u32,
    /// Requested heartbeat interval in seconds; 0 disables heartbeats.
    pub heartbeat: u16,
    /// Connect and handshake timeout. `None` blocks.
    #[serde(with = "duration_ms")]
    pub timeout: Option<Duration>,
    /// Deadline for synchronous channel calls. `None` blocks.
    #[serde(with = "duration_ms")]
    pub rpc_timeout: Option<Duration>,
    /// How long `disconnect` waits for connection.close-ok.
    #[serde(with = "duration_ms::required")]
    pub close_timeout: Duration,
    pub locale: String,
    /// Merged over the default product, version, platform and capabilities.
    #[serde(skip)]
    pub client_properties: FieldTable,
    /// Tag string header values as UTF-8 (`S`) instead of bytes (`x`).
    pub utf8_header_strings: bool,
    pub ssl: bool,
    pub tls: TlsOptions,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            user: "guest".to_string(),
            password: "guest".to_string(),
            port: DEFAULT_PORT,
            vhost: "/".to_string(),
            channel_max: 0,
            frame_max: DEFAULT_FRAME_MAX,
            heartbeat: 0,
            timeout: None,
            rpc_timeout: None,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            locale: "en_US".to_string(),
            client_properties: FieldTable::new(),
            utf8_header_strings: false,
            ssl: false,
            tls: TlsOptions::default(),
        }
    }
}

impl ConnectOptions {
    /// Load options from a JSON file. Missing fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read(path).map_err(|e| {
            ClientError::InvalidArgument(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json_slice(&raw)
    }

    pub fn from_json_slice(raw: &[u8]) -> Result<Self> {
        serde_json::from_slice(raw)
            .map_err(|e| ClientError::InvalidArgument(format!("invalid connect options: {e}")))
    }
}

impl fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("user", &self.user)
            .field(
                "password",
                &format_args!("<redacted:{} bytes>", self.password.len()),
            )
            .field("port", &self.port)
            .field("vhost", &self.vhost)
            .field("channel_max", &self.channel_max)
            .field("frame_max", &self.frame_max)
            .field("heartbeat", &self.heartbeat)
            .field("timeout", &self.timeout)
            .field("rpc_timeout", &self.rpc_timeout)
            .field("close_timeout", &self.close_timeout)
            .field("locale", &self.locale)
            .field("client_properties", &self.client_properties)
            .field("utf8_header_strings", &self.utf8_header_strings)
            .field("ssl", &self.ssl)
            .field("tls", &self.tls)
            .finish()
    }
}

/// TLS settings, used when `ssl` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsOptions {
    /// Check the certificate's host name. The chain is always verified.
    pub verify_host: bool,
    pub cacert: Option<PathBuf>,
    pub cert: Option<PathBuf>,
    pub key: Option<PathBuf>,
    /// Install the default rustls crypto provider if none is set.
    pub init_crypto_provider: bool,
    /// Name to verify instead of the connect host.
    pub server_name: Option<String>,
}

impl Default for TlsOptions {
    fn default() -> Self {
        Self {
            verify_host: true,
            cacert: None,
            cert: None,
            key: None,
            init_crypto_provider: true,
            server_name: None,
        }
    }
}

impl From<&TlsOptions> for TlsConfig {
    fn from(options: &TlsOptions) -> Self {
        TlsConfig {
            verify_hostname: options.verify_host,
            ca_cert_path: options.cacert.clone(),
            client_cert_path: options.cert.clone(),
            client_key_path: options.key.clone(),
            init_crypto_provider: options.init_crypto_provider,
            server_name: options.server_name.clone(),
        }
    }
}

/// Pick one tuning value: the smaller of the two, where 0 means "no limit".
pub fn negotiate<N: Copy + Ord + Default>(client: N, server: N) -> N {
    let zero = N::default();
    if client == zero {
        server
    } else if server == zero {
        client
    } else {
        client.min(server)
    }
}

/// Limits agreed during connection.tune.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Tuning {
    /// Negotiated channel limit; 0 means the protocol maximum.
    pub channel_max: u16,
    /// Negotiated frame size; 0 means unlimited.
    pub frame_max: u32,
    /// Heartbeat interval in seconds; 0 means disabled.
    pub heartbeat: u16,
}

impl Tuning {
    /// Negotiate each field of the client's request against the broker's offer.
    pub fn negotiate(client: &Tuning, server: &Tuning) -> Self {
        Self {
            channel_max: negotiate(client.channel_max, server.channel_max),
            frame_max: negotiate(client.frame_max, server.frame_max),
            heartbeat: negotiate(client.heartbeat, server.heartbeat),
        }
    }

    /// Highest usable channel id.
    pub fn effective_channel_max(&self) -> u16 {
        if self.channel_max == 0 {
            CHANNEL_MAX_LIMIT
        } else {
            self.channel_max
        }
    }

    pub fn heartbeat_interval(&self) -> Option<Duration> {
        (self.heartbeat > 0).then(|| Duration::from_secs(u64::from(self.heartbeat)))
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => s.serialize_some(&(d.as_millis() as u64)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(d)?.map(Duration::from_millis))
    }

    pub mod required {
        use std::time::Duration;

        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
            s.serialize_u64(value.as_millis() as u64)
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
            Ok(Duration::from_millis(u64::deserialize(d)?))
        }
    }
}
