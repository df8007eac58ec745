use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use amqprims_client::{ConsumeOptions, QosOptions};

use crate::cmd::{ConsumeArgs, CHANNEL};
use crate::exit::{client_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_message, OutputFormat};

/// How long each receive waits before checking for Ctrl-C.
const POLL_MS: i64 = 200;

pub fn run(args: ConsumeArgs, format: OutputFormat) -> CliResult<i32> {
    let running = Arc::new(AtomicBool::new(true));
    install_ctrlc_handler(running.clone())?;

    let mut conn = args.conn.open()?;
    if args.prefetch > 0 {
        let qos = QosOptions {
            prefetch_count: args.prefetch,
            ..QosOptions::default()
        };
        conn.basic_qos(CHANNEL, &qos)
            .map_err(|err| client_error("qos failed", err))?;
    }

    let options = ConsumeOptions {
        consumer_tag: args.consumer_tag.clone(),
        no_ack: !args.ack,
        ..ConsumeOptions::default()
    };
    let tag = conn
        .consume(CHANNEL, &args.queue, &options)
        .map_err(|err| client_error("consume failed", err))?;
    tracing::info!(queue = %args.queue, consumer_tag = %tag, "consuming");

    let mut printed = 0usize;
    while running.load(Ordering::SeqCst) {
        if args.count.is_some_and(|count| printed >= count) {
            break;
        }
        let Some(message) = conn
            .recv(POLL_MS)
            .map_err(|err| client_error("receive failed", err))?
        else {
            continue;
        };

        print_message(&message, format);
        if args.ack {
            conn.ack(message.channel, message.delivery_tag, false)
                .map_err(|err| client_error("ack failed", err))?;
        }
        printed = printed.saturating_add(1);
    }

    conn.cancel(CHANNEL, &tag)
        .map_err(|err| client_error("cancel failed", err))?;
    conn.disconnect()
        .map_err(|err| client_error("disconnect failed", err))?;
    Ok(SUCCESS)
}

fn install_ctrlc_handler(running: Arc<AtomicBool>) -> CliResult<()> {
    ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
