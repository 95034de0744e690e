use clap::Subcommand;

use waymark_core::PolicyStore;

use super::AuthorityArgs;

#[derive(Subcommand)]
pub enum PolicyAction {
    /// Show the stored policy
    Show,
    /// Fetch the policy from the remote authority and store it
    Sync {
        /// User id registered with the policy authority
        #[arg(long)]
        user_id: String,
        #[command(flatten)]
        authority: AuthorityArgs,
    },
}

pub fn run(action: PolicyAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        PolicyAction::Show => {
            let store = PolicyStore::open()?;
            let policy = store.load()?;
            print!("{}", toml::to_string_pretty(&policy)?);
        }
        PolicyAction::Sync { user_id, authority } => {
            let store = PolicyStore::open()?;
            let synchronizer = authority.synchronizer()?;
            let runtime = tokio::runtime::Runtime::new()?;
            let policy = runtime.block_on(synchronizer.sync(&user_id, &store))?;
            println!(
                "policy updated: enabled={}, interval={}s, window={:02}:{:02}-{:02}:{:02}",
                policy.tracking_enabled,
                policy.effective_interval_ms() / 1000,
                policy.window_start / 60,
                policy.window_start % 60,
                policy.window_end / 60,
                policy.window_end % 60,
            );
        }
    }
    Ok(())
}
