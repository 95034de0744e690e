use std::path::PathBuf;
use std::sync::Arc;

use clap::Args;

use waymark_core::host::{CommandProvider, JsonLinesSink};
use waymark_core::liveness::{AlwaysAlive, LivenessProbe, ProcessLivenessProbe};
use waymark_core::storage::data_dir;
use waymark_core::supervisor::{
    restart_channel, Supervisor, SupervisorConfig, TrackingController,
};
use waymark_core::{OfflineQueue, PolicyStore};

use super::AuthorityArgs;

#[derive(Args)]
pub struct StartArgs {
    /// User id registered with the policy authority
    #[arg(long)]
    pub user_id: String,
    #[command(flatten)]
    pub authority: AuthorityArgs,
    /// Command that prints one "<latitude> <longitude>" fix on stdout
    #[arg(long, default_value = "")]
    pub fix_command: String,
    /// File the consumer tails for delivered readings
    /// (default: <data dir>/readings.jsonl)
    #[arg(long)]
    pub sink_path: Option<PathBuf>,
    /// Consumer process name the watchdog monitors; omitted means the
    /// consumer is assumed alive
    #[arg(long)]
    pub consumer_process: Option<String>,
}

pub fn run(args: StartArgs) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let store = PolicyStore::open()?;
        let queue = OfflineQueue::open()?;
        let synchronizer = args.authority.synchronizer()?;

        let provider = Arc::new(CommandProvider::new(args.fix_command));
        let sink_path = match args.sink_path {
            Some(path) => path,
            None => data_dir()?.join("readings.jsonl"),
        };
        let sink = Arc::new(JsonLinesSink::new(sink_path));
        let probe: Box<dyn LivenessProbe> = match args.consumer_process {
            Some(name) => Box::new(ProcessLivenessProbe::new(name)),
            None => Box::new(AlwaysAlive),
        };

        let (restart_tx, mut restart_rx) = restart_channel();
        let supervisor = Supervisor::new(
            SupervisorConfig::new(args.user_id),
            provider,
            sink,
            probe,
            store,
            queue,
            Some(synchronizer),
            restart_tx,
        );

        let mut controller = TrackingController::new();
        if !controller.start(supervisor)? {
            return Err("tracking not started (permission check failed)".into());
        }
        println!("tracking started");

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("stopping");
                controller.stop().await;
            }
            reason = restart_rx.recv() => {
                if let Some(reason) = reason {
                    log::warn!("supervisor stopped ({reason:?}), restart requested");
                    eprintln!("supervisor stopped ({reason:?}), restart requested");
                }
                controller.join().await;
            }
        }
        Ok(())
    })
}
