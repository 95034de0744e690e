use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "waymark-cli", version, about = "Waymark tracking CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the tracking supervisor
    Start(commands::start::StartArgs),
    /// Policy management
    Policy {
        #[command(subcommand)]
        action: commands::policy::PolicyAction,
    },
    /// Offline queue management
    Queue {
        #[command(subcommand)]
        action: commands::queue::QueueAction,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Start(args) => commands::start::run(args),
        Commands::Policy { action } => commands::policy::run(action),
        Commands::Queue { action } => commands::queue::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
