//! Single-flight speed test scheduling.
//!
//! At most one measurement runs at a time. Manual and scheduled triggers
//! share the same gate; a trigger that arrives while a run is in flight is
//! ignored rather than queued. After every run, successful or not, the next
//! automatic run is due one interval after completion.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::task::JoinHandle;

use super::ProviderChain;
use crate::models::{SpeedTestResult, SUMMARY_FAILED};
use crate::store::StateStore;
use crate::ui::{PresentationBridge, UiMutation};
use crate::utils::KeepRunning;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    Scheduled,
    Manual,
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriggerKind::Scheduled => write!(f, "scheduled"),
            TriggerKind::Manual => write!(f, "manual"),
        }
    }
}

/// Due time plus the single-flight flag, always read and written together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerState {
    pub next_due: DateTime<Utc>,
    pub running: bool,
}

/// First due time at startup.
///
/// A persisted result schedules the next run one interval after it, unless
/// that moment has already passed, in which case the run starts after a
/// short grace period.
pub fn initial_due(
    persisted: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    interval: TimeDelta,
    grace: TimeDelta,
) -> DateTime<Utc> {
    match persisted {
        Some(ts) if ts + interval > now => ts + interval,
        _ => now + grace,
    }
}

#[derive(Clone)]
pub struct SpeedTestScheduler {
    state: Arc<Mutex<SchedulerState>>,
    chain: Arc<ProviderChain>,
    store: Arc<StateStore>,
    bridge: PresentationBridge,
    interval: TimeDelta,
}

impl SpeedTestScheduler {
    pub fn new(
        chain: Arc<ProviderChain>,
        store: Arc<StateStore>,
        bridge: PresentationBridge,
        interval: TimeDelta,
        next_due: DateTime<Utc>,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(SchedulerState {
                next_due,
                running: false,
            })),
            chain,
            store,
            bridge,
            interval,
        }
    }

    /// Consistent copy of the current state.
    pub fn state(&self) -> SchedulerState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Request a run. Returns false if one is already in flight.
    pub fn trigger(&self, kind: TriggerKind) -> bool {
        self.try_start(kind).is_some()
    }

    /// Start a run unless one is in flight, handing back the worker.
    pub fn try_start(&self, kind: TriggerKind) -> Option<JoinHandle<()>> {
        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            if state.running {
                log::debug!("speed test already running, ignoring {} trigger", kind);
                return None;
            }
            state.running = true;
        }

        log::info!("[SPEEDTEST] Speedtest run ({})", kind);
        self.bridge.post(UiMutation::SpeedTestStarted);
        if kind == TriggerKind::Manual {
            self.bridge.post(UiMutation::SpeedTestLabelsReset);
        }

        let worker = self.clone();
        Some(tokio::spawn(async move { worker.run_once().await }))
    }

    async fn run_once(&self) {
        let outcome = self.chain.run().await;
        let completed = Utc::now();

        match outcome {
            Ok(outcome) => {
                let result = SpeedTestResult::new(outcome.throughput, completed);
                log::info!(
                    "[SPEEDTEST] Result via {}: down={:.2} Mb/s, up={:.2} Mb/s",
                    outcome.provider,
                    result.down_mbps,
                    result.up_mbps
                );
                self.store.set_speedtest(&result);
                self.bridge.post(UiMutation::SpeedTestSummary(result.summary()));
                self.bridge.post(UiMutation::SpeedTestResultReady(result));
            }
            Err(e) => {
                log::warn!("[SPEEDTEST] {}", e);
                self.bridge
                    .post(UiMutation::SpeedTestSummary(SUMMARY_FAILED.to_string()));
            }
        }

        {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            state.next_due = completed + self.interval;
            state.running = false;
        }
        self.bridge.post(UiMutation::SpeedTestFinished);
    }

    /// Idle and past the due time.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        let state = self.state();
        !state.running && now >= state.next_due
    }

    /// Check the due time every `poll` until the flag is cleared.
    pub async fn run_poll(self, poll: Duration, keep_running: KeepRunning) {
        while keep_running.is_set() {
            if self.is_due(Utc::now()) {
                self.trigger(TriggerKind::Scheduled);
            }
            tokio::time::sleep(poll).await;
        }
        log::debug!("speed test scheduler stopped");
    }

    pub fn spawn_poll(&self, poll: Duration, keep_running: KeepRunning) -> JoinHandle<()> {
        tokio::spawn(self.clone().run_poll(poll, keep_running))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Throughput;
    use crate::speedtest::testing::FixedProvider;
    use crate::speedtest::{MeasurementProvider, Unavailable};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::sync::Notify;

    struct GatedProvider {
        gate: Arc<Notify>,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl MeasurementProvider for GatedProvider {
        fn name(&self) -> &str {
            "gated"
        }

        async fn measure(&self) -> Result<Throughput, Unavailable> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.gate.notified().await;
            Ok(Throughput {
                down_mbps: 100.0,
                up_mbps: 20.0,
            })
        }
    }

    fn interval() -> TimeDelta {
        TimeDelta::hours(4)
    }

    fn scheduler(
        chain: ProviderChain,
        dir: &tempfile::TempDir,
    ) -> (SpeedTestScheduler, UnboundedReceiver<UiMutation>) {
        let (bridge, rx) = PresentationBridge::channel();
        let store = Arc::new(StateStore::open(dir.path().join("state.json")));
        let s = SpeedTestScheduler::new(Arc::new(chain), store, bridge, interval(), Utc::now());
        (s, rx)
    }

    fn drain(rx: &mut UnboundedReceiver<UiMutation>) -> Vec<UiMutation> {
        let mut out = Vec::new();
        while let Ok(m) = rx.try_recv() {
            out.push(m);
        }
        out
    }

    #[test]
    fn initial_due_without_history_uses_grace() {
        let now = Utc::now();
        let grace = TimeDelta::seconds(20);
        assert_eq!(initial_due(None, now, interval(), grace), now + grace);
    }

    #[test]
    fn initial_due_honours_recent_result() {
        let now = Utc::now();
        let ts = now - TimeDelta::hours(1);
        let due = initial_due(Some(ts), now, interval(), TimeDelta::seconds(20));
        assert_eq!(due, ts + interval());
    }

    #[test]
    fn initial_due_overdue_result_waits_only_for_grace() {
        let now = Utc::now();
        let grace = TimeDelta::seconds(20);
        let ts = now - interval() * 2;
        assert_eq!(initial_due(Some(ts), now, interval(), grace), now + grace);
    }

    #[tokio::test]
    async fn second_trigger_while_running_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let gate = Arc::new(Notify::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let chain = ProviderChain::new(vec![Box::new(GatedProvider {
            gate: gate.clone(),
            calls: calls.clone(),
        })]);
        let (s, mut rx) = scheduler(chain, &dir);

        let worker = s.try_start(TriggerKind::Scheduled).unwrap();
        let running = s.state();
        assert!(running.running);
        assert!(!s.trigger(TriggerKind::Manual));
        assert!(!s.trigger(TriggerKind::Scheduled));
        assert!(s.try_start(TriggerKind::Manual).is_none());
        assert_eq!(s.state(), running);
        assert_eq!(drain(&mut rx), vec![UiMutation::SpeedTestStarted]);

        gate.notify_one();
        worker.await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!s.state().running);
    }

    #[tokio::test]
    async fn completion_sets_next_due_one_interval_later() {
        let dir = tempfile::tempdir().unwrap();
        let (s, _rx) = scheduler(
            ProviderChain::new(vec![Box::new(FixedProvider::ok("fixed", 50.0, 5.0))]),
            &dir,
        );
        let before = Utc::now();
        s.try_start(TriggerKind::Scheduled).unwrap().await.unwrap();
        let after = Utc::now();

        let completed = s.state().next_due - interval();
        assert!(completed >= before && completed <= after);
        assert!(!s.is_due(after));
    }

    #[tokio::test]
    async fn manual_success_posts_in_order_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let (s, mut rx) = scheduler(
            ProviderChain::new(vec![Box::new(FixedProvider::ok("fixed", 95.1, 10.2))]),
            &dir,
        );
        s.try_start(TriggerKind::Manual).unwrap().await.unwrap();

        let posted = drain(&mut rx);
        assert_eq!(posted.len(), 5);
        assert_eq!(posted[0], UiMutation::SpeedTestStarted);
        assert_eq!(posted[1], UiMutation::SpeedTestLabelsReset);
        assert_eq!(
            posted[2],
            UiMutation::SpeedTestSummary("Speedtest: 95.1↓ | 10.2↑ Mb/s".into())
        );
        assert!(matches!(posted[3], UiMutation::SpeedTestResultReady(_)));
        assert_eq!(posted[4], UiMutation::SpeedTestFinished);

        let saved = s.store.speedtest().unwrap();
        assert_eq!(saved.down_mbps, 95.1);
    }

    #[tokio::test]
    async fn all_failed_reports_failure_and_still_reschedules() {
        let dir = tempfile::tempdir().unwrap();
        let (s, mut rx) = scheduler(
            ProviderChain::new(vec![Box::new(FixedProvider::failing("broken"))]),
            &dir,
        );
        let before = Utc::now();
        s.try_start(TriggerKind::Scheduled).unwrap().await.unwrap();

        let posted = drain(&mut rx);
        assert_eq!(
            posted,
            vec![
                UiMutation::SpeedTestStarted,
                UiMutation::SpeedTestSummary("Speedtest: failed".into()),
                UiMutation::SpeedTestFinished,
            ]
        );
        assert!(s.store.speedtest().is_none());
        assert!(s.state().next_due >= before + interval());
        assert!(!s.state().running);
    }

    #[tokio::test]
    async fn poll_loop_triggers_when_due_and_stops_on_flag() {
        let dir = tempfile::tempdir().unwrap();
        let provider = FixedProvider::ok("fixed", 1.0, 1.0);
        let calls = provider.calls.clone();
        let (s, _rx) = scheduler(ProviderChain::new(vec![Box::new(provider)]), &dir);

        let keep_running = KeepRunning::new();
        let handle = s.spawn_poll(Duration::from_millis(10), keep_running.clone());

        for _ in 0..200 {
            if calls.load(Ordering::SeqCst) > 0 && !s.state().running {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        keep_running.stop();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();

        // Due four hours out after the first run, so exactly one run
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
