//! A captured position sample.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One position sample with the moment it was captured.
///
/// Immutable once created. The id is opaque and exists only so the offline
/// queue can remove a reading idempotently after a confirmed hand-off.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
    /// Capture time, milliseconds since the Unix epoch.
    pub captured_at_ms: i64,
}

impl Reading {
    /// Create a reading captured now.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            id: Uuid::new_v4(),
            latitude,
            longitude,
            captured_at_ms: Utc::now().timestamp_millis(),
        }
    }
}
