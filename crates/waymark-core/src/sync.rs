//! Settings synchronizer: fetches the tracking policy from the remote
//! authority and writes it through the policy store.
//!
//! The synchronizer has no retry loop of its own -- a failed fetch leaves
//! the last-known-good policy in place and the next scheduled tick (or an
//! explicit re-invocation) tries again. It is run as a spawned task so a
//! slow or hung remote call never blocks sample scheduling.

use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::error::SyncError;
use crate::policy::{parse_minute_of_day, Policy};
use crate::storage::PolicyStore;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Wire payload returned by the policy authority.
///
/// `result` is the explicit accepted flag; everything else is optional
/// with the authority's documented defaults.
#[derive(Debug, Deserialize)]
struct PolicyPayload {
    result: bool,
    #[serde(default)]
    gps: bool,
    /// Polling interval in seconds.
    #[serde(default = "default_interval_secs")]
    interval: i64,
    #[serde(default = "default_from")]
    from: String,
    #[serde(default = "default_to")]
    to: String,
}

fn default_interval_secs() -> i64 {
    600
}
fn default_from() -> String {
    "0001-01-01T08:00:00".to_string()
}
fn default_to() -> String {
    "0001-01-01T18:00:00".to_string()
}

impl PolicyPayload {
    fn into_policy(self) -> Result<Policy, SyncError> {
        let window_start = parse_minute_of_day(&self.from)
            .ok_or_else(|| SyncError::Malformed(format!("bad 'from' value: {}", self.from)))?;
        let window_end = parse_minute_of_day(&self.to)
            .ok_or_else(|| SyncError::Malformed(format!("bad 'to' value: {}", self.to)))?;
        if self.interval <= 0 {
            return Err(SyncError::Malformed(format!(
                "non-positive interval: {}",
                self.interval
            )));
        }
        Ok(Policy {
            tracking_enabled: self.gps,
            interval_ms: self.interval * 1000,
            window_start,
            window_end,
        })
    }
}

/// Client for the remote policy authority.
#[derive(Debug, Clone)]
pub struct SettingsSynchronizer {
    client: Client,
    endpoint: Url,
    username: String,
    password: String,
}

impl SettingsSynchronizer {
    /// Build a synchronizer against `endpoint` with basic credentials.
    ///
    /// # Errors
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(endpoint: Url, username: &str, password: &str) -> Result<Self, SyncError> {
        let client = Client::builder()
            .connect_timeout(HTTP_TIMEOUT)
            .timeout(HTTP_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            endpoint,
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    /// Fetch the policy for `user_id` without persisting it.
    ///
    /// Fails fast with [`SyncError::MissingIdentity`] on an empty id; no
    /// network call is made in that case.
    pub async fn fetch_policy(&self, user_id: &str) -> Result<Policy, SyncError> {
        if user_id.trim().is_empty() {
            return Err(SyncError::MissingIdentity);
        }

        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("user_id", user_id);

        let auth = STANDARD.encode(format!("{}:{}", self.username, self.password));
        log::debug!("fetching policy from {url}");

        let response = self
            .client
            .get(url)
            .header("Authorization", format!("Basic {auth}"))
            .header("Content-Type", "application/json")
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() != 200 {
            log::warn!("policy authority returned HTTP {status}");
            return Err(SyncError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        let payload: PolicyPayload =
            serde_json::from_str(&body).map_err(|e| SyncError::Malformed(e.to_string()))?;

        if !payload.result {
            log::warn!("policy authority rejected the request for user {user_id}");
            return Err(SyncError::Rejected);
        }

        payload.into_policy()
    }

    /// Fetch the policy for `user_id` and replace the stored policy
    /// atomically. On any error the previous policy is left untouched.
    pub async fn sync(&self, user_id: &str, store: &PolicyStore) -> Result<Policy, SyncError> {
        let policy = self.fetch_policy(user_id).await?;
        store.save(&policy)?;
        log::info!(
            "policy updated: enabled={}, interval={}ms, window={}..{}",
            policy.tracking_enabled,
            policy.interval_ms,
            policy.window_start,
            policy.window_end
        );
        Ok(policy)
    }
}
