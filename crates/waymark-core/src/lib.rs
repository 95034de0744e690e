//! # Waymark Core Library
//!
//! Core business logic for Waymark, a background location-tracking
//! supervisor. The CLI binary is a thin layer over this library; host
//! platforms embed it by implementing the capability traits.
//!
//! ## Architecture
//!
//! - **Supervisor**: a fixed-delay scheduling loop with a watchdog that
//!   monitors consumer liveness and signals an external relaunch facility
//!   on failure
//! - **Policy**: remotely configured sampling parameters, persisted as
//!   TOML and replaced only by the settings synchronizer
//! - **Offline queue**: durable JSON buffer for readings the consumer
//!   bridge could not accept, flushed whenever the sink proves reachable
//! - **Capabilities**: location provider, delivery sink, and liveness
//!   probe are traits injected at supervisor construction
//!
//! ## Key Components
//!
//! - [`Supervisor`] / [`TrackingController`]: scheduling loop and lifecycle
//! - [`SettingsSynchronizer`]: remote policy fetch
//! - [`OfflineQueue`]: durable pending-reading buffer
//! - [`PolicyStore`]: atomic policy persistence

pub mod error;
pub mod host;
pub mod liveness;
pub mod policy;
pub mod poller;
pub mod provider;
pub mod queue;
pub mod reading;
pub mod sink;
pub mod storage;
pub mod supervisor;
pub mod sync;

pub use error::{CoreError, PollError, SinkError, StoreError, SyncError};
pub use liveness::{LivenessProbe, ProcessLivenessProbe};
pub use policy::Policy;
pub use provider::{LocationProvider, Position};
pub use queue::{FlushOutcome, OfflineQueue};
pub use reading::Reading;
pub use sink::DeliverySink;
pub use storage::PolicyStore;
pub use supervisor::{
    restart_channel, RestartReason, SkipReason, Supervisor, SupervisorConfig, SupervisorState,
    TickOutcome, TrackingController,
};
pub use sync::SettingsSynchronizer;
