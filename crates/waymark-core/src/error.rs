//! Core error types for waymark-core.
//!
//! This module defines the error hierarchy using thiserror. Transient
//! errors (provider timeouts, detached sink, failed policy fetch) are
//! absorbed at the component that produced them; only `PermissionDenied`
//! escalates to the supervisor.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for waymark-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Durable store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Policy synchronization errors
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    /// Location polling errors
    #[error("Poll error: {0}")]
    Poll(#[from] PollError),

    /// Delivery sink errors
    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{0}")]
    Custom(String),
}

/// Durable-store errors (policy record and pending queue).
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to read a persisted record
    #[error("Failed to load {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to write a persisted record
    #[error("Failed to save {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Record exists but cannot be parsed
    #[error("Failed to parse {path}: {message}")]
    ParseFailed { path: PathBuf, message: String },

    /// Data directory could not be resolved or created
    #[error("Data directory unavailable: {0}")]
    DataDir(String),
}

/// Policy-synchronization errors. All variants leave the stored policy
/// untouched; retry happens on the next scheduled tick or explicit call.
#[derive(Error, Debug)]
pub enum SyncError {
    /// No user id configured -- fatal to sync, non-fatal to tracking
    #[error("No user id configured")]
    MissingIdentity,

    /// Remote authority returned a non-200 status
    #[error("Policy authority returned HTTP {0}")]
    Status(u16),

    /// Remote authority explicitly rejected the request (result: false)
    #[error("Policy authority rejected the request")]
    Rejected,

    /// Response body could not be interpreted as a policy payload
    #[error("Malformed policy payload: {0}")]
    Malformed(String),

    /// Transport-level failure (connect/read timeout, DNS, TLS)
    #[error("Policy fetch failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Fetched policy could not be persisted
    #[error("Failed to persist fetched policy: {0}")]
    Store(#[from] StoreError),
}

/// Location-polling errors.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollError {
    /// Provider reports itself disabled -- skip this tick
    #[error("Location provider is disabled")]
    ProviderDisabled,

    /// Provider did not produce a fix within the deadline -- skip this tick
    #[error("Location provider timed out")]
    ProviderTimeout,

    /// Location permission revoked -- fatal, supervisor shuts down
    #[error("Location permission denied")]
    PermissionDenied,
}

impl PollError {
    /// Whether this error forces the supervisor to stop.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PollError::PermissionDenied)
    }
}

/// Delivery-sink errors. The sink either accepts a reading or it does not;
/// there are no partial-delivery states.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkError {
    /// Consumer bridge is not currently attached -- buffer and retry later
    #[error("Delivery sink is unavailable")]
    Unavailable,
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
