use std::path::PathBuf;

use clap::Subcommand;

use waymark_core::host::JsonLinesSink;
use waymark_core::storage::data_dir;
use waymark_core::OfflineQueue;

#[derive(Subcommand)]
pub enum QueueAction {
    /// Show the pending backlog
    Stats,
    /// Attempt to deliver the backlog to the sink file.
    /// Must not run while `start` is active: the queue file has a single
    /// writer and concurrent enqueues would be lost.
    Flush {
        /// File the consumer tails for delivered readings
        /// (default: <data dir>/readings.jsonl)
        #[arg(long)]
        sink_path: Option<PathBuf>,
    },
}

pub fn run(action: QueueAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        QueueAction::Stats => {
            let queue = OfflineQueue::open()?;
            println!("{} pending reading(s)", queue.len());
            for reading in queue.pending() {
                println!(
                    "  {} lat={} lon={} captured_at_ms={}",
                    reading.id, reading.latitude, reading.longitude, reading.captured_at_ms
                );
            }
        }
        QueueAction::Flush { sink_path } => {
            let mut queue = OfflineQueue::open()?;
            let sink_path = match sink_path {
                Some(path) => path,
                None => data_dir()?.join("readings.jsonl"),
            };
            let sink = JsonLinesSink::new(sink_path);
            let outcome = queue.flush(&sink)?;
            println!(
                "delivered={}, remaining={}",
                outcome.delivered, outcome.remaining
            );
        }
    }
    Ok(())
}
