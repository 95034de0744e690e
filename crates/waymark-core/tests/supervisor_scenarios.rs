//! End-to-end supervisor behavior with scripted capabilities.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tempfile::TempDir;

use waymark_core::error::{PollError, SinkError};
use waymark_core::liveness::LivenessProbe;
use waymark_core::policy::Policy;
use waymark_core::provider::{LocationProvider, Position};
use waymark_core::queue::OfflineQueue;
use waymark_core::reading::Reading;
use waymark_core::sink::DeliverySink;
use waymark_core::storage::PolicyStore;
use waymark_core::supervisor::{
    restart_channel, RestartReason, SkipReason, Supervisor, SupervisorConfig, SupervisorState,
    TickOutcome, TrackingController,
};

struct FakeProvider {
    enabled: AtomicBool,
    permission: AtomicBool,
    fix: Mutex<Result<Position, PollError>>,
    requests: AtomicUsize,
}

impl FakeProvider {
    fn returning(fix: Result<Position, PollError>) -> Arc<Self> {
        Arc::new(Self {
            enabled: AtomicBool::new(true),
            permission: AtomicBool::new(true),
            fix: Mutex::new(fix),
            requests: AtomicUsize::new(0),
        })
    }

    fn healthy() -> Arc<Self> {
        Self::returning(Ok(Position {
            latitude: 59.93,
            longitude: 30.33,
        }))
    }
}

impl LocationProvider for FakeProvider {
    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }
    fn permission_granted(&self) -> bool {
        self.permission.load(Ordering::SeqCst)
    }
    fn request_fix(&self, _deadline: Duration) -> Result<Position, PollError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        *self.fix.lock().unwrap()
    }
}

#[derive(Default)]
struct FakeSink {
    attached: AtomicBool,
    delivered: Mutex<Vec<Reading>>,
}

impl FakeSink {
    fn attached() -> Arc<Self> {
        let sink = Self::default();
        sink.attached.store(true, Ordering::SeqCst);
        Arc::new(sink)
    }

    fn detached() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn delivered_count(&self) -> usize {
        self.delivered.lock().unwrap().len()
    }
}

impl DeliverySink for FakeSink {
    fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }
    fn deliver(&self, reading: &Reading) -> Result<(), SinkError> {
        if !self.is_attached() {
            return Err(SinkError::Unavailable);
        }
        self.delivered.lock().unwrap().push(reading.clone());
        Ok(())
    }
}

/// Sink whose `deliver` parks until the test releases (or drops) the gate.
struct BlockingSink {
    gate: Mutex<std::sync::mpsc::Receiver<()>>,
    delivered: AtomicUsize,
}

impl BlockingSink {
    fn gated() -> (Arc<Self>, std::sync::mpsc::Sender<()>) {
        let (tx, rx) = std::sync::mpsc::channel();
        let sink = Arc::new(Self {
            gate: Mutex::new(rx),
            delivered: AtomicUsize::new(0),
        });
        (sink, tx)
    }
}

impl DeliverySink for BlockingSink {
    fn is_attached(&self) -> bool {
        true
    }
    fn deliver(&self, _reading: &Reading) -> Result<(), SinkError> {
        // A closed gate (dropped sender) releases every later delivery.
        let _ = self.gate.lock().unwrap().recv();
        self.delivered.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct SharedProbe(Arc<AtomicBool>);

impl LivenessProbe for SharedProbe {
    fn consumer_alive(&mut self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

struct Fixture {
    _dir: TempDir,
    store: PolicyStore,
    queue_path: std::path::PathBuf,
    consumer_alive: Arc<AtomicBool>,
}

impl Fixture {
    fn new(policy: Policy) -> Self {
        let dir = TempDir::new().unwrap();
        let store = PolicyStore::open_at(dir.path().join("policy.toml"));
        store.save(&policy).unwrap();
        let queue_path = dir.path().join("pending.json");
        Self {
            _dir: dir,
            store,
            queue_path,
            consumer_alive: Arc::new(AtomicBool::new(true)),
        }
    }

    fn supervisor(
        &self,
        provider: Arc<FakeProvider>,
        sink: Arc<dyn DeliverySink>,
    ) -> (Supervisor, tokio::sync::mpsc::UnboundedReceiver<RestartReason>) {
        let (restart_tx, restart_rx) = restart_channel();
        let queue = OfflineQueue::open_at(self.queue_path.clone()).unwrap();
        let supervisor = Supervisor::new(
            SupervisorConfig::new("user-42"),
            provider,
            sink,
            Box::new(SharedProbe(Arc::clone(&self.consumer_alive))),
            self.store.clone(),
            queue,
            None,
            restart_tx,
        );
        (supervisor, restart_rx)
    }
}

fn tracking_policy() -> Policy {
    Policy {
        tracking_enabled: true,
        interval_ms: 600_000,
        window_start: 8 * 60,
        window_end: 18 * 60,
    }
}

// Scenario A: inside the window a sample is requested and delivered.
#[tokio::test]
async fn sample_delivered_inside_window() {
    let fixture = Fixture::new(tracking_policy());
    let provider = FakeProvider::healthy();
    let sink = FakeSink::attached();
    let (mut supervisor, _rx) = fixture.supervisor(Arc::clone(&provider), Arc::clone(&sink) as Arc<dyn DeliverySink>);

    assert!(supervisor.activate().unwrap());
    assert_eq!(supervisor.state(), SupervisorState::Running);
    assert!(supervisor.policy().tracking_enabled);

    let outcome = supervisor.tick_at(9 * 60).await.unwrap();
    assert_eq!(outcome, TickOutcome::Delivered);
    assert_eq!(provider.requests.load(Ordering::SeqCst), 1);
    assert_eq!(sink.delivered_count(), 1);
}

// Scenario B: outside the window the tick is a no-op.
#[tokio::test]
async fn no_sample_outside_window() {
    let fixture = Fixture::new(tracking_policy());
    let provider = FakeProvider::healthy();
    let sink = FakeSink::attached();
    let (mut supervisor, _rx) = fixture.supervisor(Arc::clone(&provider), Arc::clone(&sink) as Arc<dyn DeliverySink>);

    supervisor.activate().unwrap();
    let outcome = supervisor.tick_at(19 * 60).await.unwrap();
    assert_eq!(outcome, TickOutcome::Skipped(SkipReason::WindowClosed));
    assert_eq!(provider.requests.load(Ordering::SeqCst), 0);
    assert_eq!(sink.delivered_count(), 0);
}

// Scenario D: three samples buffered while the sink is detached, all
// delivered exactly once after it attaches.
#[tokio::test]
async fn backlog_drains_when_sink_attaches() {
    let fixture = Fixture::new(tracking_policy());
    let provider = FakeProvider::healthy();
    let sink = FakeSink::detached();
    let (mut supervisor, _rx) = fixture.supervisor(Arc::clone(&provider), Arc::clone(&sink) as Arc<dyn DeliverySink>);

    supervisor.activate().unwrap();
    for _ in 0..3 {
        let outcome = supervisor.tick_at(10 * 60).await.unwrap();
        assert_eq!(outcome, TickOutcome::Queued);
    }
    assert_eq!(supervisor.queue_len(), 3);

    sink.attached.store(true, Ordering::SeqCst);
    let outcome = supervisor.tick_at(10 * 60).await.unwrap();
    assert_eq!(outcome, TickOutcome::Delivered);

    // One live sample plus the three buffered ones, no duplicates.
    assert_eq!(sink.delivered_count(), 4);
    assert_eq!(supervisor.queue_len(), 0);
    let delivered = sink.delivered.lock().unwrap();
    let mut ids: Vec<_> = delivered.iter().map(|r| r.id).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 4);
}

// Scenario E: permission revocation stops the supervisor and fires the
// restart signal exactly once.
#[tokio::test]
async fn permission_denied_stops_and_signals_once() {
    // Whole-day window: the loop ticks at the real wall-clock minute.
    let fixture = Fixture::new(Policy {
        window_start: 0,
        window_end: 1440,
        ..tracking_policy()
    });
    let provider = FakeProvider::returning(Err(PollError::PermissionDenied));
    let sink = FakeSink::attached();
    let (supervisor, mut restart_rx) = fixture.supervisor(provider, sink);

    let mut controller = TrackingController::new();
    assert!(controller.start(supervisor).unwrap());
    controller.join().await;

    assert_eq!(restart_rx.recv().await, Some(RestartReason::PermissionLost));
    assert!(restart_rx.try_recv().is_err());
    assert!(!controller.is_running());
}

#[tokio::test]
async fn watchdog_stops_after_consecutive_dead_polls() {
    let fixture = Fixture::new(tracking_policy());
    let provider = FakeProvider::healthy();
    let sink = FakeSink::attached();
    let (mut supervisor, _rx) = fixture.supervisor(Arc::clone(&provider), sink);

    supervisor.activate().unwrap();
    fixture.consumer_alive.store(false, Ordering::SeqCst);

    // Below the threshold the tick still proceeds.
    assert_ne!(
        supervisor.tick_at(10 * 60).await.unwrap(),
        TickOutcome::ConsumerDead
    );
    assert_ne!(
        supervisor.tick_at(10 * 60).await.unwrap(),
        TickOutcome::ConsumerDead
    );
    assert_eq!(
        supervisor.tick_at(10 * 60).await.unwrap(),
        TickOutcome::ConsumerDead
    );
}

#[tokio::test]
async fn one_alive_poll_resets_the_watchdog() {
    let fixture = Fixture::new(tracking_policy());
    let provider = FakeProvider::healthy();
    let sink = FakeSink::attached();
    let (mut supervisor, _rx) = fixture.supervisor(provider, sink);

    supervisor.activate().unwrap();

    fixture.consumer_alive.store(false, Ordering::SeqCst);
    supervisor.tick_at(10 * 60).await.unwrap();
    supervisor.tick_at(10 * 60).await.unwrap();

    fixture.consumer_alive.store(true, Ordering::SeqCst);
    supervisor.tick_at(10 * 60).await.unwrap();

    // The dead count restarted from zero.
    fixture.consumer_alive.store(false, Ordering::SeqCst);
    assert_ne!(
        supervisor.tick_at(10 * 60).await.unwrap(),
        TickOutcome::ConsumerDead
    );
}

#[tokio::test]
async fn tracking_disabled_suppresses_sampling() {
    let fixture = Fixture::new(Policy {
        tracking_enabled: false,
        ..tracking_policy()
    });
    let provider = FakeProvider::healthy();
    let sink = FakeSink::attached();
    let (mut supervisor, _rx) = fixture.supervisor(Arc::clone(&provider), sink);

    supervisor.activate().unwrap();
    assert_eq!(
        supervisor.tick_at(10 * 60).await.unwrap(),
        TickOutcome::Skipped(SkipReason::TrackingDisabled)
    );
    assert_eq!(provider.requests.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn provider_timeout_skips_the_tick() {
    let fixture = Fixture::new(tracking_policy());
    let provider = FakeProvider::returning(Err(PollError::ProviderTimeout));
    let sink = FakeSink::attached();
    let (mut supervisor, _rx) = fixture.supervisor(provider, Arc::clone(&sink) as Arc<dyn DeliverySink>);

    supervisor.activate().unwrap();
    assert_eq!(
        supervisor.tick_at(10 * 60).await.unwrap(),
        TickOutcome::Skipped(SkipReason::ProviderTimeout)
    );
    assert_eq!(supervisor.queue_len(), 0);
    assert_eq!(sink.delivered_count(), 0);
}

#[tokio::test]
async fn activation_flushes_persisted_backlog() {
    let fixture = Fixture::new(tracking_policy());

    // A previous process left a reading behind.
    {
        let mut queue = OfflineQueue::open_at(fixture.queue_path.clone()).unwrap();
        queue.enqueue(Reading::new(40.71, -74.00)).unwrap();
    }

    let provider = FakeProvider::healthy();
    let sink = FakeSink::attached();
    let (mut supervisor, _rx) = fixture.supervisor(provider, Arc::clone(&sink) as Arc<dyn DeliverySink>);

    assert!(supervisor.activate().unwrap());
    assert_eq!(sink.delivered_count(), 1);
    assert_eq!(supervisor.queue_len(), 0);
}

#[tokio::test]
async fn missing_permission_refuses_activation() {
    let fixture = Fixture::new(tracking_policy());
    let provider = FakeProvider::healthy();
    provider.permission.store(false, Ordering::SeqCst);
    let sink = FakeSink::attached();
    let (mut supervisor, mut restart_rx) = fixture.supervisor(provider, sink);

    assert!(!supervisor.activate().unwrap());
    assert_eq!(supervisor.state(), SupervisorState::Stopped);
    // Refusing to start is not a restartable failure.
    assert!(restart_rx.try_recv().is_err());
}

#[tokio::test]
async fn detached_sink_degrades_to_queue_only() {
    let fixture = Fixture::new(tracking_policy());
    let provider = FakeProvider::healthy();
    let sink = FakeSink::detached();
    let (mut supervisor, _rx) = fixture.supervisor(provider, Arc::clone(&sink) as Arc<dyn DeliverySink>);

    // Missing bridge must not block activation.
    assert!(supervisor.activate().unwrap());
    assert_eq!(
        supervisor.tick_at(10 * 60).await.unwrap(),
        TickOutcome::Queued
    );
    assert_eq!(supervisor.queue_len(), 1);
}

#[tokio::test]
async fn start_is_idempotent() {
    let fixture = Fixture::new(Policy {
        tracking_enabled: false,
        ..tracking_policy()
    });

    let mut controller = TrackingController::new();
    let (first, _rx1) = fixture.supervisor(FakeProvider::healthy(), FakeSink::attached());
    assert!(controller.start(first).unwrap());
    assert!(controller.is_running());

    // Second start while running is a no-op success.
    let (second, _rx2) = fixture.supervisor(FakeProvider::healthy(), FakeSink::attached());
    assert!(controller.start(second).unwrap());

    controller.stop().await;
    assert!(!controller.is_running());
}

// Fixed-delay scheduling: a tick stuck in a slow delivery must finish
// before the loop evaluates the next one.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_delivery_never_overlaps_the_next_tick() {
    let fixture = Fixture::new(Policy {
        tracking_enabled: true,
        interval_ms: 1000,
        window_start: 0,
        window_end: 1440,
    });
    let provider = FakeProvider::healthy();
    let (sink, release) = BlockingSink::gated();
    let (supervisor, _rx) = fixture.supervisor(Arc::clone(&provider), sink.clone());

    let mut controller = TrackingController::new();
    assert!(controller.start(supervisor).unwrap());

    // Wait until the first sample is in flight, parked inside deliver.
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while provider.requests.load(Ordering::SeqCst) == 0 {
        assert!(std::time::Instant::now() < deadline, "first tick never sampled");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    // Several intervals elapse while delivery is blocked; no second fix
    // may be requested.
    tokio::time::sleep(Duration::from_millis(2500)).await;
    assert_eq!(provider.requests.load(Ordering::SeqCst), 1);
    assert_eq!(sink.delivered.load(Ordering::SeqCst), 0);

    // Open the gate: the stuck tick completes and the loop resumes.
    drop(release);
    let deadline = std::time::Instant::now() + Duration::from_secs(5);
    while provider.requests.load(Ordering::SeqCst) < 2 {
        assert!(std::time::Instant::now() < deadline, "loop never resumed");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    controller.stop().await;
}

#[tokio::test]
async fn stop_cancels_the_pending_tick() {
    let fixture = Fixture::new(Policy {
        tracking_enabled: false,
        interval_ms: 600_000,
        ..tracking_policy()
    });
    let (supervisor, mut restart_rx) =
        fixture.supervisor(FakeProvider::healthy(), FakeSink::attached());

    let mut controller = TrackingController::new();
    controller.start(supervisor).unwrap();

    // The loop is sleeping out its 10-minute delay; stop must not wait it out.
    tokio::time::timeout(Duration::from_secs(5), controller.stop())
        .await
        .expect("stop should cancel the pending tick promptly");
    // An externally requested stop emits no restart signal.
    assert!(restart_rx.try_recv().is_err());
}
