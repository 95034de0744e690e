//! Tracking supervisor and watchdog.
//!
//! The supervisor owns the scheduling loop. It is a wall-clock state
//! machine (`Stopped -> Starting -> Running -> Stopped`) whose decision
//! phase, [`Supervisor::tick_at`], is driven either by the fixed-delay
//! loop in [`Supervisor::run`] or directly by tests. Fixed delay means
//! each tick schedules the next one after it completes, so overlapping
//! ticks are impossible by construction.
//!
//! Each tick, in order: the watchdog polls consumer liveness; any policy
//! fetched by the background synchronizer is applied (never mid-tick);
//! the sampling decision is evaluated; on permit, one fix is requested
//! under a deadline; the reading goes to the sink directly or, if the
//! sink is detached, into the durable offline queue. A successful direct
//! delivery triggers an opportunistic backlog flush, since the sink has
//! just proven reachable.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{CoreError, PollError, SinkError};
use crate::liveness::LivenessProbe;
use crate::policy::{current_minute_of_day, Policy};
use crate::poller::{request_sample, should_sample_now};
use crate::provider::LocationProvider;
use crate::queue::OfflineQueue;
use crate::sink::DeliverySink;
use crate::storage::PolicyStore;
use crate::sync::SettingsSynchronizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Stopped,
    Starting,
    Running,
}

/// Why the supervisor asked the external relaunch facility for a restart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestartReason {
    /// Consumer process stayed dead for the liveness threshold.
    ConsumerDead,
    /// Location permission was revoked; a fresh grant is needed before
    /// the next attempt.
    PermissionLost,
}

/// Why sampling was suppressed on a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    TrackingDisabled,
    ProviderDisabled,
    WindowClosed,
    ProviderTimeout,
}

/// Result of one scheduling tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Watchdog threshold reached; the supervisor must stop and signal
    /// the restart facility.
    ConsumerDead,
    /// No sample was requested this tick.
    Skipped(SkipReason),
    /// Sample delivered directly to the sink.
    Delivered,
    /// Sink unavailable; sample buffered durably.
    Queued,
    /// Permission revoked during sampling; fatal.
    PermissionLost,
}

/// Knobs for the supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub user_id: String,
    /// Consecutive dead liveness polls before the watchdog stops the
    /// supervisor.
    pub liveness_threshold: u32,
    /// Deadline for a single fix request.
    pub sample_deadline: Duration,
}

impl SupervisorConfig {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            liveness_threshold: 3,
            sample_deadline: Duration::from_secs(30),
        }
    }
}

/// Create the restart-signal channel consumed by the external relaunch
/// facility.
pub fn restart_channel() -> (
    mpsc::UnboundedSender<RestartReason>,
    mpsc::UnboundedReceiver<RestartReason>,
) {
    mpsc::unbounded_channel()
}

/// The tracking supervisor.
///
/// All capabilities are injected at construction; the supervisor holds the
/// only writable handles to the policy store and the offline queue while
/// it runs.
pub struct Supervisor {
    config: SupervisorConfig,
    provider: Arc<dyn LocationProvider>,
    sink: Arc<dyn DeliverySink>,
    probe: Box<dyn LivenessProbe>,
    store: PolicyStore,
    queue: OfflineQueue,
    synchronizer: Option<SettingsSynchronizer>,
    restart_tx: mpsc::UnboundedSender<RestartReason>,

    state: SupervisorState,
    policy: Policy,
    dead_polls: u32,
    /// Receives the policy fetched by the background sync task. Dropped
    /// on stop so a late result is discarded instead of applied.
    policy_rx: Option<mpsc::UnboundedReceiver<Policy>>,
    sync_task: Option<JoinHandle<()>>,
}

impl Supervisor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: SupervisorConfig,
        provider: Arc<dyn LocationProvider>,
        sink: Arc<dyn DeliverySink>,
        probe: Box<dyn LivenessProbe>,
        store: PolicyStore,
        queue: OfflineQueue,
        synchronizer: Option<SettingsSynchronizer>,
        restart_tx: mpsc::UnboundedSender<RestartReason>,
    ) -> Self {
        Self {
            config,
            provider,
            sink,
            probe,
            store,
            queue,
            synchronizer,
            restart_tx,
            state: SupervisorState::Stopped,
            policy: Policy::default(),
            dead_polls: 0,
            policy_rx: None,
            sync_task: None,
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Run the activation sequence: permission check, degraded-mode
    /// decision, policy load, background policy sync, backlog flush.
    ///
    /// Returns `Ok(false)` when the permission capability check fails --
    /// the only start outcome the consumer ever distinguishes. Calling
    /// this while already running is a no-op returning `Ok(true)`.
    ///
    /// # Panics
    /// Must be called from within a Tokio runtime: the policy fetch is
    /// spawned onto it.
    pub fn activate(&mut self) -> Result<bool, CoreError> {
        if self.state != SupervisorState::Stopped {
            log::debug!("activate: already running");
            return Ok(true);
        }
        self.state = SupervisorState::Starting;

        if !self.provider.permission_granted() {
            log::error!("activate: location permission missing, not starting");
            self.state = SupervisorState::Stopped;
            return Ok(false);
        }

        if !self.sink.is_attached() {
            // Degraded mode: keep sampling, everything goes to the queue
            // until the bridge attaches.
            log::warn!("activate: consumer bridge not attached, entering queue-only mode");
        }

        self.policy = self.store.load()?;
        self.spawn_policy_sync();

        let outcome = self.queue.flush(&*self.sink)?;
        if outcome.delivered > 0 || outcome.remaining > 0 {
            log::info!(
                "activation flush: delivered={}, remaining={}",
                outcome.delivered,
                outcome.remaining
            );
        }

        self.dead_polls = 0;
        self.state = SupervisorState::Running;
        log::info!(
            "tracking started for user {} (interval {}ms)",
            self.config.user_id,
            self.policy.effective_interval_ms()
        );
        Ok(true)
    }

    /// Kick off the non-blocking policy fetch. The result crosses back to
    /// the tick context through a channel and is applied between ticks.
    fn spawn_policy_sync(&mut self) {
        let Some(synchronizer) = self.synchronizer.clone() else {
            return;
        };
        let user_id = self.config.user_id.clone();
        let (tx, rx) = mpsc::unbounded_channel();
        self.policy_rx = Some(rx);
        self.sync_task = Some(tokio::spawn(async move {
            match synchronizer.fetch_policy(&user_id).await {
                Ok(policy) => {
                    // Receiver may already be gone if the supervisor
                    // stopped; the result is simply discarded then.
                    let _ = tx.send(policy);
                }
                Err(e) => log::warn!("policy sync failed, keeping stored policy: {e}"),
            }
        }));
    }

    /// Apply any policy the sync task has produced. Runs at the start of
    /// a tick, never mid-tick, and only while running.
    fn apply_policy_updates(&mut self) {
        if self.state != SupervisorState::Running {
            return;
        }
        let Some(rx) = self.policy_rx.as_mut() else {
            return;
        };
        let mut latest = None;
        while let Ok(policy) = rx.try_recv() {
            latest = Some(policy);
        }
        if let Some(policy) = latest {
            if let Err(e) = self.store.save(&policy) {
                log::error!("failed to persist synced policy: {e}");
            }
            self.policy = policy;
            log::info!(
                "policy applied: enabled={}, interval={}ms",
                policy.tracking_enabled,
                policy.effective_interval_ms()
            );
        }
    }

    /// One scheduling tick at the given wall-clock minute-of-day.
    ///
    /// The watchdog runs first; a `ConsumerDead`/`PermissionLost` outcome
    /// obliges the caller to stop the supervisor.
    pub async fn tick_at(&mut self, minute_of_day: u16) -> Result<TickOutcome, CoreError> {
        if self.probe.consumer_alive() {
            self.dead_polls = 0;
        } else {
            self.dead_polls += 1;
            log::warn!(
                "consumer not alive ({}/{})",
                self.dead_polls,
                self.config.liveness_threshold
            );
            if self.dead_polls >= self.config.liveness_threshold {
                return Ok(TickOutcome::ConsumerDead);
            }
        }

        self.apply_policy_updates();

        if !self.policy.tracking_enabled {
            return Ok(TickOutcome::Skipped(SkipReason::TrackingDisabled));
        }
        let provider_enabled = self.provider.is_enabled();
        if !provider_enabled {
            return Ok(TickOutcome::Skipped(SkipReason::ProviderDisabled));
        }
        if !should_sample_now(&self.policy, provider_enabled, minute_of_day) {
            return Ok(TickOutcome::Skipped(SkipReason::WindowClosed));
        }

        // The provider may block up to the deadline; keep it off the
        // scheduling context.
        let provider = Arc::clone(&self.provider);
        let deadline = self.config.sample_deadline;
        let sampled =
            tokio::task::spawn_blocking(move || request_sample(&*provider, deadline)).await;

        let reading = match sampled {
            Ok(Ok(reading)) => reading,
            Ok(Err(PollError::PermissionDenied)) => {
                log::error!("permission denied while sampling");
                return Ok(TickOutcome::PermissionLost);
            }
            Ok(Err(PollError::ProviderDisabled)) => {
                return Ok(TickOutcome::Skipped(SkipReason::ProviderDisabled));
            }
            Ok(Err(PollError::ProviderTimeout)) => {
                return Ok(TickOutcome::Skipped(SkipReason::ProviderTimeout));
            }
            Err(e) => {
                log::error!("sample task failed: {e}");
                return Ok(TickOutcome::Skipped(SkipReason::ProviderTimeout));
            }
        };

        match self.sink.deliver(&reading) {
            Ok(()) => {
                // Sink just proved reachable: drain the backlog now.
                let outcome = self.queue.flush(&*self.sink)?;
                if outcome.delivered > 0 {
                    log::info!("drained {} queued reading(s)", outcome.delivered);
                }
                Ok(TickOutcome::Delivered)
            }
            Err(SinkError::Unavailable) => {
                self.queue.enqueue(reading)?;
                Ok(TickOutcome::Queued)
            }
        }
    }

    /// Transition to `Stopped`, release resources, and optionally emit
    /// the restart signal. The signal fires at most once per stop.
    pub fn stop(&mut self, reason: Option<RestartReason>) {
        if self.state == SupervisorState::Stopped {
            return;
        }
        self.state = SupervisorState::Stopped;
        self.dead_polls = 0;
        // Dropping the receiver is the stale-write guard: an in-flight
        // sync result now has nowhere to land.
        self.policy_rx = None;
        if let Some(task) = self.sync_task.take() {
            task.abort();
        }
        match reason {
            Some(reason) => {
                log::warn!("tracking stopped ({reason:?}), signaling restart facility");
                let _ = self.restart_tx.send(reason);
            }
            None => log::info!("tracking stopped"),
        }
    }

    /// The fixed-delay scheduling loop. Consumes the supervisor; exits when
    /// cancelled or on a fatal tick outcome.
    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            match self.tick_at(current_minute_of_day()).await {
                Ok(TickOutcome::ConsumerDead) => {
                    self.stop(Some(RestartReason::ConsumerDead));
                    return;
                }
                Ok(TickOutcome::PermissionLost) => {
                    self.stop(Some(RestartReason::PermissionLost));
                    return;
                }
                Ok(outcome) => log::debug!("tick: {outcome:?}"),
                // Transient store/queue failures are absorbed; the durable
                // state on disk is the fallback.
                Err(e) => log::error!("tick failed: {e}"),
            }

            // Interval is read after the tick completes, so a policy
            // update takes effect on the immediately following delay.
            let delay = Duration::from_millis(self.policy.effective_interval_ms() as u64);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => {
                    self.stop(None);
                    return;
                }
            }
        }
    }
}

/// Owns the spawned supervisor task: the host-facing start/stop surface.
pub struct TrackingController {
    handle: Option<JoinHandle<()>>,
    cancel: Option<CancellationToken>,
}

impl TrackingController {
    pub fn new() -> Self {
        Self {
            handle: None,
            cancel: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Start tracking. Idempotent: if the supervisor task is already
    /// running this is a no-op returning `Ok(true)`.
    ///
    /// Returns `Ok(false)` when activation fails the permission check.
    pub fn start(&mut self, mut supervisor: Supervisor) -> Result<bool, CoreError> {
        if self.is_running() {
            return Ok(true);
        }
        if !supervisor.activate()? {
            return Ok(false);
        }
        let cancel = CancellationToken::new();
        self.handle = Some(tokio::spawn(supervisor.run(cancel.clone())));
        self.cancel = Some(cancel);
        Ok(true)
    }

    /// Cancel the pending tick and wait for the loop to wind down.
    pub async fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }

    /// Wait for the supervisor task to finish on its own (watchdog stop or
    /// fatal error).
    pub async fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
        self.cancel = None;
    }
}

impl Default for TrackingController {
    fn default() -> Self {
        Self::new()
    }
}
