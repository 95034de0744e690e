//! TOML-backed persistence for the tracking policy.
//!
//! The record lives at `~/.config/waymark/policy.toml`. Loading a missing
//! file writes and returns the conservative default policy; a file that
//! exists but cannot be parsed is an error rather than a silent reset, so
//! a half-corrupted deployment is noticed instead of reverting to
//! tracking-disabled without a trace.

use std::path::PathBuf;

use crate::error::StoreError;
use crate::policy::Policy;
use crate::storage::{atomic_write, data_dir};

/// Durable home of the current [`Policy`].
///
/// The store is the only writable copy of the policy; the supervisor and
/// poller read through it, the settings synchronizer replaces it.
#[derive(Debug, Clone)]
pub struct PolicyStore {
    path: PathBuf,
}

impl PolicyStore {
    /// Open the store at the default data-directory location.
    pub fn open() -> Result<Self, StoreError> {
        Ok(Self {
            path: data_dir()?.join("policy.toml"),
        })
    }

    /// Open the store at a specific path (for testing).
    pub fn open_at(path: PathBuf) -> Self {
        Self { path }
    }

    /// Load the persisted policy, writing the default if none exists.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed,
    /// or if the default cannot be written.
    pub fn load(&self) -> Result<Policy, StoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => toml::from_str(&content).map_err(|e| StoreError::ParseFailed {
                path: self.path.clone(),
                message: e.to_string(),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let policy = Policy::default();
                self.save(&policy)?;
                Ok(policy)
            }
            Err(e) => Err(StoreError::LoadFailed {
                path: self.path.clone(),
                message: e.to_string(),
            }),
        }
    }

    /// Replace the persisted policy atomically.
    pub fn save(&self, policy: &Policy) -> Result<(), StoreError> {
        let content = toml::to_string_pretty(policy).map_err(|e| StoreError::SaveFailed {
            path: self.path.clone(),
            message: e.to_string(),
        })?;
        atomic_write(&self.path, &content)
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_written_default() {
        let dir = TempDir::new().unwrap();
        let store = PolicyStore::open_at(dir.path().join("policy.toml"));

        let policy = store.load().unwrap();
        assert_eq!(policy, Policy::default());
        assert!(store.path().exists());
    }

    #[test]
    fn save_then_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = PolicyStore::open_at(dir.path().join("policy.toml"));

        let policy = Policy {
            tracking_enabled: true,
            interval_ms: 120_000,
            window_start: 360,
            window_end: 1200,
        };
        store.save(&policy).unwrap();
        assert_eq!(store.load().unwrap(), policy);
    }

    #[test]
    fn corrupt_file_is_an_error_not_a_reset() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("policy.toml");
        std::fs::write(&path, "interval_ms = \"not a number\"").unwrap();

        let store = PolicyStore::open_at(path);
        assert!(matches!(
            store.load(),
            Err(StoreError::ParseFailed { .. })
        ));
    }

    #[test]
    fn save_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let store = PolicyStore::open_at(dir.path().join("policy.toml"));
        store.save(&Policy::default()).unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
