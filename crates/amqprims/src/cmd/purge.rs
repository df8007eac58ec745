use amqprims_client::QueuePurgeOptions;

use crate::cmd::declare_queue::{print_queue, QueueOutput};
use crate::cmd::{PurgeArgs, CHANNEL};
use crate::exit::{client_error, CliResult, SUCCESS};
use crate::output::OutputFormat;

pub fn run(args: PurgeArgs, format: OutputFormat) -> CliResult<i32> {
    let mut conn = args.conn.open()?;
    let purged = conn
        .queue_purge(CHANNEL, &args.queue, &QueuePurgeOptions::default())
        .map_err(|err| client_error("purge failed", err))?;
    conn.disconnect()
        .map_err(|err| client_error("disconnect failed", err))?;

    let out = QueueOutput {
        queue: args.queue,
        message_count: purged,
        consumer_count: None,
    };
    print_queue(&out, format);
    Ok(SUCCESS)
}
