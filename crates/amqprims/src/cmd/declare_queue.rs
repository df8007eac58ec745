use amqprims_client::{QueueDeclareOk, QueueDeclareOptions};
use serde::Serialize;

use crate::cmd::{DeclareQueueArgs, CHANNEL};
use crate::exit::{client_error, CliResult, SUCCESS};
use crate::output::{print_json, OutputFormat};

#[derive(Serialize)]
pub struct QueueOutput {
    pub queue: String,
    pub message_count: u32,
    pub consumer_count: Option<u32>,
}

impl From<QueueDeclareOk> for QueueOutput {
    fn from(ok: QueueDeclareOk) -> Self {
        Self {
            queue: ok.queue,
            message_count: ok.message_count,
            consumer_count: Some(ok.consumer_count),
        }
    }
}

pub fn run(args: DeclareQueueArgs, format: OutputFormat) -> CliResult<i32> {
    let mut conn = args.conn.open()?;
    let options = QueueDeclareOptions {
        passive: args.passive,
        durable: args.durable,
        exclusive: args.exclusive,
        auto_delete: args.auto_delete,
        ..QueueDeclareOptions::default()
    };
    let declared = conn
        .queue_declare(CHANNEL, &args.queue, &options)
        .map_err(|err| client_error("declare failed", err))?;
    conn.disconnect()
        .map_err(|err| client_error("disconnect failed", err))?;

    print_queue(&QueueOutput::from(declared), format);
    Ok(SUCCESS)
}

pub fn print_queue(out: &QueueOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(out),
        OutputFormat::Table | OutputFormat::Pretty => {
            print!("queue={} messages={}", out.queue, out.message_count);
            match out.consumer_count {
                Some(consumers) => println!(" consumers={consumers}"),
                None => println!(),
            }
        }
        OutputFormat::Raw => println!("{}", out.queue),
    }
}
