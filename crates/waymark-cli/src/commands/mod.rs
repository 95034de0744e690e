pub mod policy;
pub mod queue;
pub mod start;

use url::Url;
use waymark_core::SettingsSynchronizer;

/// Authority connection flags shared by `start` and `policy sync`.
#[derive(clap::Args)]
pub struct AuthorityArgs {
    /// Policy authority endpoint
    #[arg(long, default_value = "http://127.0.0.1:8080/policy")]
    pub authority: String,
    /// Basic-auth user for the authority
    #[arg(long, default_value = "admin")]
    pub username: String,
    /// Basic-auth password for the authority
    #[arg(long, default_value = "", hide_default_value = true)]
    pub password: String,
}

impl AuthorityArgs {
    pub fn synchronizer(&self) -> Result<SettingsSynchronizer, Box<dyn std::error::Error>> {
        let endpoint = Url::parse(&self.authority)?;
        Ok(SettingsSynchronizer::new(
            endpoint,
            &self.username,
            &self.password,
        )?)
    }
}
