//! Reachability monitor
//!
//! Combines the interface flag, an active probe and optional link metadata
//! into one `NetworkStatus`. `evaluate()` is the only path that writes the
//! status; everything else reads snapshots from the watch channel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::link::LinkSignal;
use super::probe::Probe;
use super::status::{ConnectionQuality, NetworkStatus};
use crate::config::{BackoffConfig, MonitorConfig};

/// A change in `is_online` or `is_slow_connection`
#[derive(Debug, Clone)]
pub struct StatusTransition {
    pub previous: NetworkStatus,
    pub current: NetworkStatus,
}

impl StatusTransition {
    /// The offline -> online edge that triggers a queue flush
    pub fn came_online(&self) -> bool {
        !self.previous.is_online && self.current.is_online
    }

    pub fn went_offline(&self) -> bool {
        self.previous.is_online && !self.current.is_online
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reading {
    Reachable,
    ProbeFailed,
    InterfaceDown,
}

pub struct ReachabilityMonitor {
    config: MonitorConfig,
    backoff: BackoffConfig,
    probe: Arc<dyn Probe>,
    link: Arc<dyn LinkSignal>,
    status_tx: watch::Sender<NetworkStatus>,
    transitions: broadcast::Sender<StatusTransition>,
    /// When the last probe was started
    last_probe: Mutex<Option<Instant>>,
    probes_started: AtomicU64,
}

impl ReachabilityMonitor {
    /// Create a monitor; the initial status mirrors the interface flag
    pub fn new(
        config: MonitorConfig,
        backoff: BackoffConfig,
        probe: Arc<dyn Probe>,
        link: Arc<dyn LinkSignal>,
    ) -> Self {
        let initial = NetworkStatus::initial(link.interface_online());
        let (status_tx, _) = watch::channel(initial);
        let (transitions, _) = broadcast::channel(32);

        Self {
            config,
            backoff,
            probe,
            link,
            status_tx,
            transitions,
            last_probe: Mutex::new(None),
            probes_started: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Current status snapshot
    pub fn status(&self) -> NetworkStatus {
        self.status_tx.borrow().clone()
    }

    /// Watch every status update (including failure-count changes)
    pub fn subscribe_status(&self) -> watch::Receiver<NetworkStatus> {
        self.status_tx.subscribe()
    }

    /// Receive online/slow transitions only
    pub fn subscribe_transitions(&self) -> broadcast::Receiver<StatusTransition> {
        self.transitions.subscribe()
    }

    /// Number of probes started since creation or the last reset
    pub fn probes_started(&self) -> u64 {
        self.probes_started.load(Ordering::SeqCst)
    }

    pub fn connection_quality(&self) -> ConnectionQuality {
        self.status_tx.borrow().connection_quality()
    }

    pub fn should_limit_data(&self) -> bool {
        self.status_tx.borrow().should_limit_data()
    }

    pub fn retry_delay(&self) -> Duration {
        self.status_tx.borrow().retry_delay(&self.backoff)
    }

    /// Re-evaluate reachability
    ///
    /// Calls closer together than half the poll interval return the last
    /// status without probing. When the interface is down no probe is
    /// needed, so the throttle does not apply. Never fails: probe errors
    /// and timeouts simply yield an offline status.
    pub async fn evaluate(&self) -> NetworkStatus {
        self.evaluate_with(false).await
    }

    /// Re-evaluate ignoring the throttle
    ///
    /// For callers holding fresh evidence that the cached status is wrong,
    /// such as a request that just failed for lack of connectivity.
    pub async fn evaluate_now(&self) -> NetworkStatus {
        self.evaluate_with(true).await
    }

    async fn evaluate_with(&self, force: bool) -> NetworkStatus {
        if !self.link.interface_online() {
            debug!("Interface reported offline, skipping probe");
            return self.record(Reading::InterfaceDown);
        }

        if !self.claim_probe_slot(force) {
            debug!("Reachability evaluation throttled");
            return self.status();
        }

        let reading = if self.run_probe().await {
            Reading::Reachable
        } else {
            Reading::ProbeFailed
        };
        self.record(reading)
    }

    /// Forget history and return to the initial status
    pub fn reset(&self) {
        *self.last_probe.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self.probes_started.store(0, Ordering::SeqCst);
        self.status_tx
            .send_replace(NetworkStatus::initial(self.link.interface_online()));
    }

    fn claim_probe_slot(&self, force: bool) -> bool {
        let now = Instant::now();
        let mut last = self.last_probe.lock().unwrap_or_else(PoisonError::into_inner);
        match *last {
            Some(prev) if !force && now.duration_since(prev) < self.config.min_evaluation_gap() => {
                false
            }
            _ => {
                *last = Some(now);
                true
            }
        }
    }

    async fn run_probe(&self) -> bool {
        self.probes_started.fetch_add(1, Ordering::SeqCst);
        let timeout = self.config.probe_timeout();

        // Dropping the probe future on timeout aborts the request
        match tokio::time::timeout(timeout, self.probe.check()).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                debug!(error = %e, "Reachability probe failed");
                false
            }
            Err(_) => {
                warn!(timeout_secs = timeout.as_secs(), "Reachability probe timed out");
                false
            }
        }
    }

    fn record(&self, reading: Reading) -> NetworkStatus {
        let previous = self.status();
        let is_online = reading == Reading::Reachable;
        // only a probe that ran and failed counts
        let failures = match reading {
            Reading::Reachable => 0,
            Reading::ProbeFailed => previous.consecutive_failures.saturating_add(1),
            Reading::InterfaceDown => previous.consecutive_failures,
        };

        let current = NetworkStatus::evaluated(
            is_online,
            self.link.link_info(),
            self.config.slow_downlink_mbps,
            failures,
        );
        self.status_tx.send_replace(current.clone());

        if current.differs_from(&previous) {
            info!(
                online = current.is_online,
                slow = current.is_slow_connection,
                failures = current.consecutive_failures,
                "Network status changed"
            );
            // No subscribers is fine
            let _ = self.transitions.send(StatusTransition {
                previous,
                current: current.clone(),
            });
        }

        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::link::SharedLink;
    use crate::network::status::{EffectiveType, LinkInfo};
    use crate::testing::{ProbeStep, ScriptedProbe};

    fn monitor_with(probe: Arc<ScriptedProbe>, link: Arc<SharedLink>) -> ReachabilityMonitor {
        ReachabilityMonitor::new(
            MonitorConfig::default(),
            BackoffConfig::default(),
            probe,
            link,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_interface_up_but_probe_fails_is_offline() {
        let probe = Arc::new(ScriptedProbe::always(ProbeStep::Fail));
        let monitor = monitor_with(probe.clone(), Arc::new(SharedLink::new(true)));

        let status = monitor.evaluate().await;
        assert!(!status.is_online);
        assert_eq!(status.consecutive_failures, 1);
        assert_eq!(probe.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interface_down_is_offline_without_probe() {
        let probe = Arc::new(ScriptedProbe::always(ProbeStep::Succeed));
        let monitor = monitor_with(probe.clone(), Arc::new(SharedLink::new(false)));

        let status = monitor.evaluate().await;
        assert!(!status.is_online);
        assert_eq!(probe.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_online_requires_both_signals() {
        let probe = Arc::new(ScriptedProbe::always(ProbeStep::Succeed));
        let link = Arc::new(SharedLink::new(true));
        let monitor = monitor_with(probe, link.clone());

        assert!(monitor.evaluate().await.is_online);

        link.set_online(false);
        assert!(!monitor.evaluate().await.is_online);
    }

    #[tokio::test(start_paused = true)]
    async fn test_evaluate_is_throttled_within_half_interval() {
        let probe = Arc::new(ScriptedProbe::always(ProbeStep::Succeed));
        let monitor = monitor_with(probe.clone(), Arc::new(SharedLink::new(true)));

        monitor.evaluate().await;
        monitor.evaluate().await;
        assert_eq!(probe.calls(), 1);

        tokio::time::advance(Duration::from_secs(14)).await;
        monitor.evaluate().await;
        assert_eq!(probe.calls(), 1);

        tokio::time::advance(Duration::from_secs(1)).await;
        monitor.evaluate().await;
        assert_eq!(probe.calls(), 2);
        assert_eq!(monitor.probes_started(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttled_call_returns_last_status() {
        let probe = Arc::new(ScriptedProbe::new(
            vec![ProbeStep::Fail, ProbeStep::Succeed],
            ProbeStep::Succeed,
        ));
        let monitor = monitor_with(probe, Arc::new(SharedLink::new(true)));

        let first = monitor.evaluate().await;
        let second = monitor.evaluate().await;
        assert!(!first.is_online);
        assert_eq!(first, second);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interface_down_bypasses_throttle() {
        let probe = Arc::new(ScriptedProbe::always(ProbeStep::Succeed));
        let link = Arc::new(SharedLink::new(true));
        let monitor = monitor_with(probe.clone(), link.clone());

        assert!(monitor.evaluate().await.is_online);

        link.set_online(false);
        let status = monitor.evaluate().await;
        assert!(!status.is_online);
        assert_eq!(probe.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interface_down_does_not_count_failures() {
        let probe = Arc::new(ScriptedProbe::always(ProbeStep::Fail));
        let link = Arc::new(SharedLink::new(true));
        let monitor = monitor_with(probe, link.clone());

        assert_eq!(monitor.evaluate().await.consecutive_failures, 1);

        link.set_online(false);
        for _ in 0..5 {
            monitor.evaluate().await;
        }
        let status = monitor.status();
        assert!(!status.is_online);
        assert_eq!(status.consecutive_failures, 1);
        assert!(!monitor.should_limit_data());
    }

    #[tokio::test(start_paused = true)]
    async fn test_evaluate_now_skips_throttle() {
        let probe = Arc::new(ScriptedProbe::new(vec![ProbeStep::Succeed], ProbeStep::Fail));
        let monitor = monitor_with(probe.clone(), Arc::new(SharedLink::new(true)));

        assert!(monitor.evaluate().await.is_online);
        assert!(monitor.evaluate().await.is_online);
        assert_eq!(probe.calls(), 1);

        let status = monitor.evaluate_now().await;
        assert_eq!(probe.calls(), 2);
        assert!(!status.is_online);
        assert_eq!(status.consecutive_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_probe_times_out() {
        let probe = Arc::new(ScriptedProbe::always(ProbeStep::Hang(Duration::from_secs(6))));
        let monitor = monitor_with(probe, Arc::new(SharedLink::new(true)));

        let started = Instant::now();
        let status = monitor.evaluate().await;

        assert!(!status.is_online);
        assert_eq!(status.consecutive_failures, 1);
        assert_eq!(started.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_accumulate_and_reset() {
        let probe = Arc::new(ScriptedProbe::new(
            vec![ProbeStep::Fail, ProbeStep::Fail, ProbeStep::Fail],
            ProbeStep::Succeed,
        ));
        let monitor = monitor_with(probe, Arc::new(SharedLink::new(true)));

        for expected in 1..=3 {
            let status = monitor.evaluate().await;
            assert_eq!(status.consecutive_failures, expected);
            tokio::time::advance(Duration::from_secs(15)).await;
        }
        assert!(monitor.should_limit_data());
        assert_eq!(monitor.retry_delay(), Duration::from_secs(8));

        let status = monitor.evaluate().await;
        assert!(status.is_online);
        assert_eq!(status.consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transition_emitted_only_on_change() {
        let probe = Arc::new(ScriptedProbe::new(
            vec![ProbeStep::Fail, ProbeStep::Fail, ProbeStep::Succeed],
            ProbeStep::Succeed,
        ));
        let monitor = monitor_with(probe, Arc::new(SharedLink::new(true)));
        let mut transitions = monitor.subscribe_transitions();

        // Initial status is online (interface flag), first probe fails
        monitor.evaluate().await;
        let went_down = transitions.try_recv().unwrap();
        assert!(went_down.went_offline());

        tokio::time::advance(Duration::from_secs(15)).await;
        monitor.evaluate().await;
        assert!(transitions.try_recv().is_err());

        tokio::time::advance(Duration::from_secs(15)).await;
        monitor.evaluate().await;
        let came_up = transitions.try_recv().unwrap();
        assert!(came_up.came_online());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_link_change_is_a_transition() {
        let probe = Arc::new(ScriptedProbe::always(ProbeStep::Succeed));
        let link = Arc::new(SharedLink::new(true));
        let monitor = monitor_with(probe, link.clone());
        let mut transitions = monitor.subscribe_transitions();

        monitor.evaluate().await;
        assert!(transitions.try_recv().is_err());

        link.set_link_info(Some(LinkInfo {
            effective_type: EffectiveType::Slow2g,
            ..LinkInfo::default()
        }));
        tokio::time::advance(Duration::from_secs(15)).await;
        let status = monitor.evaluate().await;

        assert!(status.is_slow_connection);
        assert_eq!(status.connection_quality(), ConnectionQuality::Poor);
        let transition = transitions.try_recv().unwrap();
        assert!(!transition.came_online());
        assert!(transition.current.is_slow_connection);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_clears_history() {
        let probe = Arc::new(ScriptedProbe::always(ProbeStep::Fail));
        let monitor = monitor_with(probe.clone(), Arc::new(SharedLink::new(true)));

        monitor.evaluate().await;
        monitor.reset();

        assert_eq!(monitor.status().consecutive_failures, 0);
        assert_eq!(monitor.probes_started(), 0);

        // Throttle window forgotten too
        monitor.evaluate().await;
        assert_eq!(probe.calls(), 2);
    }
}
