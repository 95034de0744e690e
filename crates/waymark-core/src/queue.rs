//! Durable offline queue for undelivered readings.
//!
//! When the delivery sink is unreachable, readings land here and survive
//! process restarts. Removal is confirmed-per-item: a reading is deleted
//! from the durable file immediately after the sink accepts it and before
//! the next one is attempted, so a crash mid-flush can lose at most the
//! in-flight delivery confirmation, never an already-confirmed removal.
//!
//! The queue file has exactly one writer at a time. An open queue owns the
//! file: there is no cross-process lock, so two processes writing the same
//! path can lose each other's enqueues.

use std::collections::HashMap;
use std::path::PathBuf;

use uuid::Uuid;

use crate::error::{SinkError, StoreError};
use crate::reading::Reading;
use crate::sink::DeliverySink;
use crate::storage::{atomic_write, data_dir};

/// Result of one flush pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushOutcome {
    /// Readings accepted by the sink and removed from the queue.
    pub delivered: usize,
    /// Readings still pending after the pass.
    pub remaining: usize,
}

/// Persistent buffer of readings awaiting delivery.
///
/// Keyed by reading id: insertion order is irrelevant for delivery
/// correctness, and a re-enqueued reading collapses onto itself instead of
/// accumulating duplicates.
pub struct OfflineQueue {
    pending: HashMap<Uuid, Reading>,
    queue_file: PathBuf,
}

impl OfflineQueue {
    /// Open the queue at the default data-directory location, loading any
    /// persisted backlog.
    pub fn open() -> Result<Self, StoreError> {
        let queue_file = data_dir()?.join("pending_readings.json");
        Self::open_at(queue_file)
    }

    /// Open the queue at a specific path (for testing).
    pub fn open_at(queue_file: PathBuf) -> Result<Self, StoreError> {
        let mut queue = Self {
            pending: HashMap::new(),
            queue_file,
        };
        queue.load()?;
        Ok(queue)
    }

    /// Buffer a reading durably. Persists before returning.
    pub fn enqueue(&mut self, reading: Reading) -> Result<(), StoreError> {
        log::info!(
            "queueing reading {} (lat={}, lon={})",
            reading.id,
            reading.latitude,
            reading.longitude
        );
        self.pending.insert(reading.id, reading);
        self.persist()
    }

    /// Attempt to drain the backlog through `sink`.
    ///
    /// Iterates a snapshot of the queue taken at call time. Each accepted
    /// reading is removed and the removal persisted before the next
    /// attempt. The pass ends early on the first [`SinkError::Unavailable`]
    /// -- a detached sink will not accept the remainder either.
    pub fn flush(&mut self, sink: &dyn DeliverySink) -> Result<FlushOutcome, StoreError> {
        if self.pending.is_empty() {
            return Ok(FlushOutcome {
                delivered: 0,
                remaining: 0,
            });
        }

        let snapshot: Vec<Uuid> = self.pending.keys().copied().collect();
        let mut delivered = 0;

        for id in snapshot {
            let Some(reading) = self.pending.get(&id) else {
                continue;
            };
            match sink.deliver(reading) {
                Ok(()) => {
                    self.pending.remove(&id);
                    self.persist()?;
                    delivered += 1;
                }
                Err(SinkError::Unavailable) => {
                    log::warn!(
                        "sink unavailable during flush, {} reading(s) left pending",
                        self.pending.len()
                    );
                    break;
                }
            }
        }

        if delivered > 0 {
            log::info!(
                "flushed {delivered} reading(s), {} remaining",
                self.pending.len()
            );
        }
        Ok(FlushOutcome {
            delivered,
            remaining: self.pending.len(),
        })
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Pending readings in no particular order (for inspection).
    pub fn pending(&self) -> Vec<&Reading> {
        self.pending.values().collect()
    }

    fn persist(&self) -> Result<(), StoreError> {
        let data =
            serde_json::to_string_pretty(&self.pending).map_err(|e| StoreError::SaveFailed {
                path: self.queue_file.clone(),
                message: e.to_string(),
            })?;
        atomic_write(&self.queue_file, &data)
    }

    fn load(&mut self) -> Result<(), StoreError> {
        if !self.queue_file.exists() {
            return Ok(());
        }
        let content =
            std::fs::read_to_string(&self.queue_file).map_err(|e| StoreError::LoadFailed {
                path: self.queue_file.clone(),
                message: e.to_string(),
            })?;
        self.pending =
            serde_json::from_str(&content).map_err(|e| StoreError::ParseFailed {
                path: self.queue_file.clone(),
                message: e.to_string(),
            })?;
        Ok(())
    }
}
