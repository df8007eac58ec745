use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use amqprims_client::{Message, MessageSource};
use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct MessageOutput<'a> {
    channel: u16,
    exchange: &'a str,
    routing_key: &'a str,
    delivery_tag: u64,
    redelivered: bool,
    consumer_tag: Option<&'a str>,
    message_count: Option<u32>,
    content_type: Option<&'a str>,
    body_size: usize,
    body: String,
    timestamp: String,
}

pub fn print_message(message: &Message, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let message_count = match message.source {
                MessageSource::Fetched { message_count } => Some(message_count),
                _ => None,
            };
            let out = MessageOutput {
                channel: message.channel,
                exchange: &message.exchange,
                routing_key: &message.routing_key,
                delivery_tag: message.delivery_tag,
                redelivered: message.redelivered,
                consumer_tag: message.consumer_tag(),
                message_count,
                content_type: message.properties.content_type.as_deref(),
                body_size: message.body.len(),
                body: body_preview(&message.body),
                timestamp: now_unix_seconds(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["TAG", "EXCHANGE", "ROUTING KEY", "SIZE", "BODY"])
                .add_row(vec![
                    message.delivery_tag.to_string(),
                    display_exchange(&message.exchange).to_string(),
                    message.routing_key.clone(),
                    message.body.len().to_string(),
                    body_preview(&message.body),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "tag={} exchange={} routing_key={} size={} body={}",
                message.delivery_tag,
                display_exchange(&message.exchange),
                message.routing_key,
                message.body.len(),
                body_preview(&message.body)
            );
        }
        OutputFormat::Raw => {
            print_raw(&message.body);
        }
    }
}

pub fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

/// The default exchange has an empty name.
pub fn display_exchange(name: &str) -> &str {
    if name.is_empty() {
        "(default)"
    } else {
        name
    }
}

fn body_preview(body: &[u8]) -> String {
    match std::str::from_utf8(body) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", body.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
