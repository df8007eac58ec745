use std::fs;

use amqprims_client::{BasicProperties, MessageSource, PublishOptions};
use serde::Serialize;

use crate::cmd::{parse_duration, PublishArgs, CHANNEL};
use crate::exit::{client_error, io_error, CliError, CliResult, FAILURE, SUCCESS, USAGE};
use crate::output::{display_exchange, print_json, OutputFormat};

const PERSISTENT: u8 = 2;

#[derive(Serialize)]
struct PublishOutput<'a> {
    exchange: &'a str,
    routing_key: &'a str,
    body_size: usize,
    confirmed: Option<bool>,
}

pub fn run(args: PublishArgs, format: OutputFormat) -> CliResult<i32> {
    let payload = resolve_payload(&args)?;
    let properties = BasicProperties {
        content_type: args.content_type.clone().or_else(|| {
            args.json
                .as_ref()
                .map(|_| "application/json".to_string())
        }),
        delivery_mode: args.persistent.then_some(PERSISTENT),
        ..BasicProperties::default()
    };
    let options = PublishOptions {
        exchange: args.exchange.clone(),
        mandatory: args.mandatory,
        immediate: false,
    };
    let body_size = payload.len();

    let mut conn = args.conn.open()?;
    if args.confirm {
        conn.confirm_select(CHANNEL)
            .map_err(|err| client_error("confirm select failed", err))?;
    }
    conn.publish(CHANNEL, &args.routing_key, payload, properties, &options)
        .map_err(|err| client_error("publish failed", err))?;

    let confirmed = if args.confirm {
        let timeout = parse_duration(&args.conn.timeout)?;
        let acked = conn
            .wait_for_confirms(CHANNEL, Some(timeout))
            .map_err(|err| client_error("confirm failed", err))?;
        Some(acked)
    } else {
        None
    };

    // A return precedes the confirm, so it is only observable with --confirm.
    let returned = conn.take_returned(CHANNEL);
    conn.disconnect()
        .map_err(|err| client_error("disconnect failed", err))?;

    if let Some(message) = returned {
        let reason = match message.source {
            MessageSource::Returned {
                reply_code,
                reply_text,
            } => format!("{reply_code} {reply_text}"),
            _ => "unroutable".to_string(),
        };
        return Err(CliError::new(
            FAILURE,
            format!("message returned by broker: {reason}"),
        ));
    }
    if confirmed == Some(false) {
        return Err(CliError::new(FAILURE, "message was nacked by broker"));
    }

    let out = PublishOutput {
        exchange: &args.exchange,
        routing_key: &args.routing_key,
        body_size,
        confirmed,
    };
    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table | OutputFormat::Pretty => println!(
            "published {} bytes to {} with routing key {}",
            out.body_size,
            display_exchange(out.exchange),
            out.routing_key
        ),
        OutputFormat::Raw => {}
    }
    Ok(SUCCESS)
}

fn resolve_payload(args: &PublishArgs) -> CliResult<Vec<u8>> {
    if let Some(json) = &args.json {
        serde_json::from_str::<serde_json::Value>(json)
            .map_err(|err| CliError::new(USAGE, format!("--json is not valid JSON: {err}")))?;
        return Ok(json.as_bytes().to_vec());
    }
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Ok(Vec::new())
}
