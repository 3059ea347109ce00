//! Sync engine
//!
//! Wires the reachability monitor, the mutation queue and the store into
//! one object with an explicit lifecycle:
//!
//! - `init` hydrates the store, recovers the queue and builds the monitor
//! - `start` spawns the monitor task and a bridge task that pushes status
//!   into the store and flushes the queue whenever the server is reachable
//!   and work is waiting
//! - `shutdown` stops both tasks; `reset` forgets all state
//!
//! ## Usage
//!
//! ```ignore
//! let config = Config::load()?;
//! let engine = SyncEngine::init(config.clone(), Collaborators::from_config(&config)?);
//! engine.start();
//! engine.submit(OperationType::CompleteSession, json!({"session_id": id})).await?;
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::events::SyncEvent;
use crate::network::{
    spawn_monitor, LinkSignal, MonitorCommand, MonitorHandle, NetworkStatus, Probe,
    ReachabilityMonitor, SharedLink, StatusTransition, Trigger,
};
use crate::queue::{
    FlushOutcome, FlushReport, MutationQueue, OperationType, QueueError, SyncQueueEntry,
};
use crate::remote::{HandlerRegistry, HttpRemote, RemoteError};
use crate::storage::{open_storage, DurableStorage};
use crate::store::Store;

/// External dependencies of the engine
pub struct Collaborators {
    pub storage: Arc<dyn DurableStorage>,
    pub probe: Arc<dyn Probe>,
    pub link: Arc<dyn LinkSignal>,
    pub handlers: HandlerRegistry,
}

impl Collaborators {
    /// Production wiring: configured storage backend and the HTTP API
    ///
    /// The interface flag is assumed up; the probe decides reachability.
    pub fn from_config(config: &Config) -> Result<Self> {
        let storage = open_storage(config).context("Failed to open durable storage")?;
        let remote = HttpRemote::from_config(config).context("Failed to build HTTP client")?;

        Ok(Self {
            storage,
            probe: Arc::new(remote.probe(&config.monitor.health_path)),
            link: Arc::new(SharedLink::default()),
            handlers: HandlerRegistry::http(remote),
        })
    }
}

/// Result of `SyncEngine::submit`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Delivered to the server right away
    Sent(Uuid),
    /// Stored in the queue for a later flush
    Queued(Uuid),
}

impl Submission {
    pub fn id(&self) -> Uuid {
        match self {
            Submission::Sent(id) | Submission::Queued(id) => *id,
        }
    }
}

struct Running {
    monitor: MonitorHandle,
    bridge: JoinHandle<()>,
}

pub struct SyncEngine {
    config: Config,
    store: Arc<Store>,
    queue: Arc<MutationQueue>,
    monitor: Arc<ReachabilityMonitor>,
    handlers: HandlerRegistry,
    events: broadcast::Sender<SyncEvent>,
    started: AtomicBool,
    /// Held while a background flush (and its follow-up check) runs
    flush_task: Arc<AtomicBool>,
    running: Mutex<Option<Running>>,
}

impl SyncEngine {
    /// Build the engine and restore persisted state
    pub fn init(config: Config, collaborators: Collaborators) -> Self {
        let Collaborators {
            storage,
            probe,
            link,
            handlers,
        } = collaborators;

        let store = Arc::new(Store::hydrate(storage.clone(), config.snapshot_key()));
        let monitor = Arc::new(ReachabilityMonitor::new(
            config.monitor.clone(),
            config.backoff,
            probe,
            link,
        ));
        store.set_network_status(monitor.status());

        let (events, _) = broadcast::channel(64);
        let queue = MutationQueue::new(
            storage,
            config.queue_key(),
            store.clone(),
            handlers.clone(),
            monitor.subscribe_status(),
        )
        .with_backoff(config.backoff)
        .with_retry_ceiling(config.queue.retry_ceiling)
        .with_events(events.clone());
        queue.recover();

        Self {
            config,
            store,
            queue: Arc::new(queue),
            monitor,
            handlers,
            events,
            started: AtomicBool::new(false),
            flush_task: Arc::new(AtomicBool::new(false)),
            running: Mutex::new(None),
        }
    }

    /// Start background monitoring; later calls do nothing
    ///
    /// The monitor evaluates immediately, so a queue recovered at startup
    /// is flushed as soon as the server answers.
    pub fn start(&self) {
        if self
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        // Subscribe before the first evaluation so it is not missed
        let transitions = self.monitor.subscribe_transitions();
        let status = self.monitor.subscribe_status();
        let bridge = tokio::spawn(bridge_loop(
            self.store.clone(),
            self.queue.clone(),
            self.monitor.clone(),
            self.events.clone(),
            self.flush_task.clone(),
            transitions,
            status,
        ));
        let monitor = spawn_monitor(self.monitor.clone());

        *self.running.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(Running { monitor, bridge });
        info!(api = %self.config.api_url, "Sync engine started");
    }

    pub fn is_running(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Stop the background tasks
    pub async fn shutdown(&self) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(running) = running {
            running.monitor.shutdown().await;
            running.bridge.abort();
            let _ = running.bridge.await;
            info!("Sync engine stopped");
        }
        self.started.store(false, Ordering::SeqCst);
    }

    /// Forget queued operations, persisted state and monitor history
    pub fn reset(&self) {
        self.queue.reset();
        self.store.reset();
        self.monitor.reset();
        self.store.set_network_status(self.monitor.status());
        info!("Sync state reset");
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn queue(&self) -> &Arc<MutationQueue> {
        &self.queue
    }

    pub fn monitor(&self) -> &Arc<ReachabilityMonitor> {
        &self.monitor
    }

    pub fn network_status(&self) -> NetworkStatus {
        self.monitor.status()
    }

    pub fn pending_sync_count(&self) -> usize {
        self.store.pending_sync_count()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Re-check reachability now (subject to the monitor's throttle)
    pub async fn refresh_status(&self) -> NetworkStatus {
        let status = self.monitor.evaluate().await;
        self.store.set_network_status(status.clone());
        status
    }

    /// Forward an external event to the monitor task
    ///
    /// Returns false when the engine is not running.
    pub async fn trigger(&self, trigger: Trigger) -> bool {
        let commands = {
            let running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
            running.as_ref().map(|r| r.monitor.commands())
        };
        match commands {
            Some(commands) => commands.send(MonitorCommand::Evaluate(trigger)).await.is_ok(),
            None => false,
        }
    }

    /// Queue an operation for the next flush
    pub fn enqueue(&self, operation: OperationType, payload: Value) -> Uuid {
        let id = self.queue.enqueue(operation, payload);
        if self.is_running()
            && self.monitor.status().is_online
            && !self.flush_task.swap(true, Ordering::SeqCst)
        {
            spawn_flush(self.queue.clone(), self.monitor.clone(), self.flush_task.clone());
        }
        id
    }

    /// Send an operation now when possible, otherwise queue it
    ///
    /// Direct delivery is only attempted when online and nothing is
    /// queued, so operations never overtake older ones. Connectivity and
    /// transient failures fall back to the queue under the same id; a
    /// rejection is returned to the caller.
    pub async fn submit(
        &self,
        operation: OperationType,
        payload: Value,
    ) -> Result<Submission, RemoteError> {
        let entry = SyncQueueEntry::new(operation, payload);
        let id = entry.id;

        if !self.monitor.status().is_online || !self.queue.is_empty() {
            self.queue.enqueue_entry(entry);
            return Ok(Submission::Queued(id));
        }

        match self.handlers.dispatch(&entry).await {
            Ok(()) => {
                debug!(%id, %operation, "Operation sent directly");
                Ok(Submission::Sent(id))
            }
            Err(e) if e.is_permanent() => Err(e),
            Err(e) => {
                info!(%id, error = %e, "Direct send failed, queueing");
                self.queue.enqueue_entry(entry);
                if e.is_connectivity() {
                    self.refresh_status().await;
                }
                Ok(Submission::Queued(id))
            }
        }
    }

    pub async fn retry_failed_entry(&self, id: Uuid) -> Result<FlushReport, QueueError> {
        self.queue.retry_failed_entry(id).await
    }

    /// Drop an entry and roll back its optimistic change, if any
    pub fn discard_entry(&self, id: Uuid) -> Result<SyncQueueEntry, QueueError> {
        let entry = self.queue.discard(id)?;
        self.store.compensate(id);
        Ok(entry)
    }

    /// Flush now, regardless of the background task
    pub async fn flush(&self) -> FlushReport {
        self.queue.flush().await
    }
}

/// Flush in the background and release `claim` once settled
///
/// An interrupted flush means a request found no connection, so the
/// cached status is re-checked right away instead of waiting for a tick.
fn spawn_flush(
    queue: Arc<MutationQueue>,
    monitor: Arc<ReachabilityMonitor>,
    claim: Arc<AtomicBool>,
) {
    tokio::spawn(async move {
        let report = queue.flush().await;
        if report.outcome == FlushOutcome::Interrupted {
            let status = monitor.evaluate_now().await;
            if status.is_online {
                // probe answers but requests do not; hold off until a later update
                let delay = monitor.retry_delay();
                debug!(delay_ms = delay.as_millis() as u64, "Requests unreachable despite probe, backing off");
                tokio::time::sleep(delay).await;
            }
        }
        claim.store(false, Ordering::SeqCst);
    });
}

async fn bridge_loop(
    store: Arc<Store>,
    queue: Arc<MutationQueue>,
    monitor: Arc<ReachabilityMonitor>,
    events: broadcast::Sender<SyncEvent>,
    flush_task: Arc<AtomicBool>,
    mut transitions: broadcast::Receiver<StatusTransition>,
    mut status: watch::Receiver<NetworkStatus>,
) {
    loop {
        tokio::select! {
            transition = transitions.recv() => match transition {
                Ok(transition) => {
                    store.record_transition(&transition);
                    let _ = events.send(SyncEvent::StatusChanged(transition.current));
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Missed status transitions");
                    store.set_network_status(monitor.status());
                }
                Err(RecvError::Closed) => break,
            },
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let online = status.borrow_and_update().is_online;
                if online
                    && queue.pending_count() > 0
                    && !queue.is_flushing()
                    && !flush_task.swap(true, Ordering::SeqCst)
                {
                    spawn_flush(queue.clone(), monitor.clone(), flush_task.clone());
                }
            }
        }
    }
}
