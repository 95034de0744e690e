//! Durable storage: the policy record and the pending-reading queue.
//!
//! Both records live under the data directory and are written with
//! write-temp-then-rename discipline so a crash mid-write never leaves a
//! partially written file behind.

mod policy_store;

pub use policy_store::PolicyStore;

use std::path::{Path, PathBuf};

use crate::error::StoreError;

/// Returns `~/.config/waymark[-dev]/` based on WAYMARK_ENV.
///
/// Set WAYMARK_ENV=dev to use the development data directory.
///
/// # Errors
/// Returns an error if the home directory cannot be determined or if
/// creating the directory fails.
pub fn data_dir() -> Result<PathBuf, StoreError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("WAYMARK_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("waymark-dev")
    } else {
        base_dir.join("waymark")
    };

    std::fs::create_dir_all(&dir).map_err(|e| StoreError::DataDir(e.to_string()))?;
    Ok(dir)
}

/// Write `content` to `path` atomically: serialize into a sibling temp
/// file, then rename over the target.
pub(crate) fn atomic_write(path: &Path, content: &str) -> Result<(), StoreError> {
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, content).map_err(|e| StoreError::SaveFailed {
        path: tmp.clone(),
        message: e.to_string(),
    })?;
    std::fs::rename(&tmp, path).map_err(|e| StoreError::SaveFailed {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(())
}
