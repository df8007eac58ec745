use amqprims_client::{FieldTable, FieldValue};
use serde::Serialize;

use crate::cmd::InfoArgs;
use crate::exit::{client_error, CliResult, SUCCESS};
use crate::output::{print_json, OutputFormat};

#[derive(Serialize)]
struct InfoOutput {
    host: String,
    port: u16,
    vhost: String,
    product: Option<String>,
    version: Option<String>,
    platform: Option<String>,
    capabilities: Vec<String>,
    channel_max: u16,
    frame_max: u32,
    heartbeat: u16,
    connected: bool,
}

pub fn run(args: InfoArgs, format: OutputFormat) -> CliResult<i32> {
    let options = args.conn.connect_options()?;
    let mut conn = amqprims_client::connect(&args.conn.host, &options)
        .map_err(|err| client_error("connect failed", err))?;

    let properties = conn.server_properties();
    let out = InfoOutput {
        host: args.conn.host.clone(),
        port: options.port,
        vhost: options.vhost.clone(),
        product: string_property(properties, "product"),
        version: string_property(properties, "version"),
        platform: string_property(properties, "platform"),
        capabilities: enabled_capabilities(properties),
        channel_max: conn.channel_max(),
        frame_max: conn.frame_max(),
        heartbeat: conn.heartbeat_interval(),
        connected: conn.is_connected(),
    };
    conn.disconnect()
        .map_err(|err| client_error("disconnect failed", err))?;

    print_info(&out, format);
    Ok(SUCCESS)
}

fn string_property(table: &FieldTable, key: &str) -> Option<String> {
    table.get(key).and_then(FieldValue::as_str).map(str::to_string)
}

/// Names of the capabilities the broker advertises as true.
fn enabled_capabilities(properties: &FieldTable) -> Vec<String> {
    properties
        .get("capabilities")
        .and_then(FieldValue::as_table)
        .map(|caps| {
            caps.iter()
                .filter(|(_, value)| value.as_bool() == Some(true))
                .map(|(name, _)| name.to_string())
                .collect()
        })
        .unwrap_or_default()
}

fn print_info(out: &InfoOutput, format: OutputFormat) {
    let unknown = |value: &Option<String>| value.clone().unwrap_or_else(|| "unknown".to_string());
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("Connection Info:");
            println!("  Broker:        {}:{} vhost={}", out.host, out.port, out.vhost);
            println!(
                "  Server:        {} {} ({})",
                unknown(&out.product),
                unknown(&out.version),
                unknown(&out.platform)
            );
            println!("  Channel max:   {}", out.channel_max);
            match out.frame_max {
                0 => println!("  Frame max:     unlimited"),
                n => println!("  Frame max:     {n}"),
            }
            match out.heartbeat {
                0 => println!("  Heartbeat:     disabled"),
                n => println!("  Heartbeat:     {n}s"),
            }
            println!("  Capabilities:  {}", out.capabilities.join(", "));
        }
        OutputFormat::Raw => {
            println!("{}", unknown(&out.product));
        }
    }
}
