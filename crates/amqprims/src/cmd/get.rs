use amqprims_client::GetOptions;

use crate::cmd::{GetArgs, CHANNEL};
use crate::exit::{client_error, CliResult, EMPTY, SUCCESS};
use crate::output::{print_message, OutputFormat};

pub fn run(args: GetArgs, format: OutputFormat) -> CliResult<i32> {
    let mut conn = args.conn.open()?;
    let options = GetOptions { no_ack: !args.ack };
    let message = conn
        .get(CHANNEL, &args.queue, &options)
        .map_err(|err| client_error("get failed", err))?;

    let code = match message {
        Some(message) => {
            print_message(&message, format);
            if args.ack {
                conn.ack(CHANNEL, message.delivery_tag, false)
                    .map_err(|err| client_error("ack failed", err))?;
            }
            SUCCESS
        }
        None => {
            tracing::info!(queue = %args.queue, "queue is empty");
            EMPTY
        }
    };

    conn.disconnect()
        .map_err(|err| client_error("disconnect failed", err))?;
    Ok(code)
}
