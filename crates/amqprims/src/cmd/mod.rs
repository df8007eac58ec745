use std::path::PathBuf;
use std::time::Duration;

use amqprims_client::config::{DEFAULT_PORT, DEFAULT_TLS_PORT};
use amqprims_client::{connect, ConnectOptions, Connection};
use amqprims_transport::AmqpStream;
use clap::{Args, Subcommand};

use crate::exit::{client_error, CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod consume;
pub mod declare_queue;
pub mod get;
pub mod info;
pub mod publish;
pub mod purge;
pub mod version;

/// Channel every command works on.
pub const CHANNEL: u16 = 1;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Connect and print broker properties and negotiated limits.
    Info(InfoArgs),
    /// Publish a single message.
    Publish(PublishArgs),
    /// Fetch one message from a queue.
    Get(GetArgs),
    /// Consume and print deliveries until --count or Ctrl-C.
    Consume(ConsumeArgs),
    /// Declare a queue and print its counts.
    DeclareQueue(DeclareQueueArgs),
    /// Remove all ready messages from a queue.
    Purge(PurgeArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Info(args) => info::run(args, format),
        Command::Publish(args) => publish::run(args, format),
        Command::Get(args) => get::run(args, format),
        Command::Consume(args) => consume::run(args, format),
        Command::DeclareQueue(args) => declare_queue::run(args, format),
        Command::Purge(args) => purge::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Broker address and credentials shared by every networked command.
///
/// Flags win over environment variables, which win over `--config`.
#[derive(Args, Debug)]
pub struct ConnArgs {
    /// Broker host.
    #[arg(long, env = "AMQPRIMS_HOST", default_value = "localhost")]
    pub host: String,
    /// Broker port (default 5672, or 5671 with --ssl).
    #[arg(long)]
    pub port: Option<u16>,
    #[arg(long, env = "AMQPRIMS_USER")]
    pub user: Option<String>,
    #[arg(long, env = "AMQPRIMS_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
    #[arg(long, env = "AMQPRIMS_VHOST")]
    pub vhost: Option<String>,
    /// JSON file with connection options.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
    /// Connect over TLS.
    #[arg(long)]
    pub ssl: bool,
    /// Heartbeat interval in seconds (0 disables).
    #[arg(long)]
    pub heartbeat: Option<u16>,
    /// Connect and per-request timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

impl ConnArgs {
    pub fn connect_options(&self) -> CliResult<ConnectOptions> {
        let mut options = match &self.config {
            Some(path) => ConnectOptions::from_json_file(path)
                .map_err(|err| CliError::new(USAGE, format!("{}: {err}", path.display())))?,
            None => ConnectOptions::default(),
        };

        if let Some(user) = &self.user {
            options.user = user.clone();
        }
        if let Some(password) = &self.password {
            options.password = password.clone();
        }
        if let Some(vhost) = &self.vhost {
            options.vhost = vhost.clone();
        }
        if let Some(heartbeat) = self.heartbeat {
            options.heartbeat = heartbeat;
        }
        if self.ssl {
            options.ssl = true;
            if options.port == DEFAULT_PORT {
                options.port = DEFAULT_TLS_PORT;
            }
        }
        if let Some(port) = self.port {
            options.port = port;
        }

        let timeout = parse_duration(&self.timeout)?;
        options.timeout = Some(timeout);
        options.rpc_timeout = Some(timeout);
        Ok(options)
    }

    /// Connect and open [`CHANNEL`].
    pub fn open(&self) -> CliResult<Connection<AmqpStream>> {
        let options = self.connect_options()?;
        let mut conn =
            connect(&self.host, &options).map_err(|err| client_error("connect failed", err))?;
        conn.channel_open(CHANNEL)
            .map_err(|err| client_error("channel open failed", err))?;
        Ok(conn)
    }
}

#[derive(Args, Debug)]
pub struct InfoArgs {
    #[command(flatten)]
    pub conn: ConnArgs,
}

#[derive(Args, Debug)]
pub struct PublishArgs {
    /// Routing key.
    pub routing_key: String,
    /// Exchange to publish to; "" is the default exchange.
    #[arg(long, default_value = "amq.direct")]
    pub exchange: String,
    /// JSON payload.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub json: Option<String>,
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["json", "file"])]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["json", "data"])]
    pub file: Option<PathBuf>,
    /// Content type property.
    #[arg(long)]
    pub content_type: Option<String>,
    /// Mark the message persistent (delivery mode 2).
    #[arg(long)]
    pub persistent: bool,
    /// Ask the broker to return the message if it cannot be routed.
    #[arg(long)]
    pub mandatory: bool,
    /// Wait for a publisher confirm.
    #[arg(long)]
    pub confirm: bool,
    #[command(flatten)]
    pub conn: ConnArgs,
}

#[derive(Args, Debug)]
pub struct GetArgs {
    /// Queue to fetch from.
    pub queue: String,
    /// Acknowledge explicitly after printing instead of auto-ack.
    #[arg(long)]
    pub ack: bool,
    #[command(flatten)]
    pub conn: ConnArgs,
}

#[derive(Args, Debug)]
pub struct ConsumeArgs {
    /// Queue to consume from.
    pub queue: String,
    /// Exit after receiving N messages.
    #[arg(long)]
    pub count: Option<usize>,
    /// Prefetch limit (0 is unlimited).
    #[arg(long, default_value = "0")]
    pub prefetch: u16,
    /// Acknowledge each message after printing instead of auto-ack.
    #[arg(long)]
    pub ack: bool,
    /// Consumer tag; empty lets the broker pick one.
    #[arg(long, default_value = "")]
    pub consumer_tag: String,
    #[command(flatten)]
    pub conn: ConnArgs,
}

#[derive(Args, Debug)]
pub struct DeclareQueueArgs {
    /// Queue name; empty asks the broker to generate one.
    #[arg(default_value = "")]
    pub queue: String,
    #[arg(long)]
    pub durable: bool,
    #[arg(long)]
    pub exclusive: bool,
    #[arg(long)]
    pub auto_delete: bool,
    /// Only check that the queue exists.
    #[arg(long)]
    pub passive: bool,
    #[command(flatten)]
    pub conn: ConnArgs,
}

#[derive(Args, Debug)]
pub struct PurgeArgs {
    /// Queue to purge.
    pub queue: String,
    #[command(flatten)]
    pub conn: ConnArgs,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `5s`, `500ms` or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
