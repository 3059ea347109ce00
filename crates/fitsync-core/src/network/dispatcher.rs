//! Monitor task
//!
//! Every source that may warrant a re-check (periodic tick, interface
//! online/offline events, window focus, visibility, link changes, an
//! explicit "check now") is normalised into a `Trigger` and funnelled into
//! the monitor's single throttled `evaluate()`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::monitor::ReachabilityMonitor;

/// Why a re-evaluation was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Periodic timer
    Tick,
    /// Interface reported up
    InterfaceOnline,
    /// Interface reported down
    InterfaceOffline,
    /// Application became visible
    Visible,
    /// Application window regained focus
    Focus,
    /// Link metadata changed
    LinkChanged,
    /// User asked for a refresh
    Manual,
}

/// Commands sent to the monitor task
#[derive(Debug, Clone, Copy)]
pub enum MonitorCommand {
    Evaluate(Trigger),
    Shutdown,
}

/// Handle to control the monitor task
pub struct MonitorHandle {
    command_tx: mpsc::Sender<MonitorCommand>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    /// Ask for a re-evaluation; returns false if the task has stopped
    pub async fn trigger(&self, trigger: Trigger) -> bool {
        self.command_tx
            .send(MonitorCommand::Evaluate(trigger))
            .await
            .is_ok()
    }

    /// Command sender usable without holding the handle
    pub fn commands(&self) -> mpsc::Sender<MonitorCommand> {
        self.command_tx.clone()
    }

    /// Stop the task and wait for it to exit
    pub async fn shutdown(self) {
        let _ = self.command_tx.send(MonitorCommand::Shutdown).await;
        let _ = self.task.await;
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

/// Spawn the monitor task
///
/// The first tick fires immediately, so the monitor evaluates once on start.
pub fn spawn_monitor(monitor: Arc<ReachabilityMonitor>) -> MonitorHandle {
    let (command_tx, command_rx) = mpsc::channel(16);
    let task = tokio::spawn(monitor_loop(monitor, command_rx));
    MonitorHandle { command_tx, task }
}

async fn monitor_loop(
    monitor: Arc<ReachabilityMonitor>,
    mut command_rx: mpsc::Receiver<MonitorCommand>,
) {
    // tokio intervals reject a zero period
    let period = monitor.config().poll_interval().max(Duration::from_secs(1));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(poll_secs = period.as_secs(), "Reachability monitor started");

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                monitor.evaluate().await;
            }
            cmd = command_rx.recv() => {
                match cmd {
                    Some(MonitorCommand::Evaluate(trigger)) => {
                        debug!(?trigger, "Re-evaluating reachability");
                        monitor.evaluate().await;
                    }
                    Some(MonitorCommand::Shutdown) | None => break,
                }
            }
        }
    }

    info!("Reachability monitor stopped");
}
