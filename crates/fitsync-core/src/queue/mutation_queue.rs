//! Durable FIFO of operations waiting for connectivity
//!
//! Entries are replayed strictly in creation order by a single flusher.
//! The in-memory list is authoritative; it is written to durable storage
//! after every change, while the lock is held, so the stored copy never
//! reflects an older state than one already written.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::entry::{EntryStatus, OperationType, SyncQueueEntry};
use crate::config::{BackoffConfig, QueueConfig};
use crate::events::SyncEvent;
use crate::network::NetworkStatus;
use crate::remote::{HandlerRegistry, RemoteError};
use crate::storage::DurableStorage;
use crate::store::Store;

/// Current persisted queue format version
pub const QUEUE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("queue entry {0} not found")]
    NotFound(Uuid),

    #[error("queue entry {0} has not failed")]
    NotFailed(Uuid),

    #[error("queue entry {0} is being sent")]
    InFlight(Uuid),
}

/// How a flush ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// No pending entries left
    Drained,
    /// Offline when the flush started or between entries
    Paused,
    /// Connectivity was lost during a request
    Interrupted,
    /// Another flush was running; nothing was done
    AlreadyRunning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlushReport {
    pub completed: usize,
    pub failed: usize,
    /// Transient failures that were retried
    pub retried: usize,
    pub outcome: FlushOutcome,
}

impl FlushReport {
    fn new() -> Self {
        Self {
            completed: 0,
            failed: 0,
            retried: 0,
            outcome: FlushOutcome::Drained,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct PersistedQueue {
    version: u32,
    entries: Vec<SyncQueueEntry>,
}

/// Result of a settled transient failure
enum Attempt {
    Retry { attempts: u32 },
    Exhausted,
}

/// Clears the flushing flag even if the flush future is dropped
struct FlushGuard<'a>(&'a AtomicBool);

impl Drop for FlushGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct MutationQueue {
    entries: Mutex<VecDeque<SyncQueueEntry>>,
    handlers: HandlerRegistry,
    storage: Arc<dyn DurableStorage>,
    key: String,
    store: Arc<Store>,
    status: watch::Receiver<NetworkStatus>,
    backoff: BackoffConfig,
    retry_ceiling: u32,
    flushing: AtomicBool,
    events: broadcast::Sender<SyncEvent>,
}

impl MutationQueue {
    /// Create an empty queue; call `recover` to load stored entries
    pub fn new(
        storage: Arc<dyn DurableStorage>,
        key: impl Into<String>,
        store: Arc<Store>,
        handlers: HandlerRegistry,
        status: watch::Receiver<NetworkStatus>,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            entries: Mutex::new(VecDeque::new()),
            handlers,
            storage,
            key: key.into(),
            store,
            status,
            backoff: BackoffConfig::default(),
            retry_ceiling: QueueConfig::default().retry_ceiling,
            flushing: AtomicBool::new(false),
            events,
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffConfig) -> Self {
        self.backoff = backoff;
        self
    }

    /// Maximum handler invocations per entry; at least one
    pub fn with_retry_ceiling(mut self, ceiling: u32) -> Self {
        self.retry_ceiling = ceiling.max(1);
        self
    }

    /// Publish lifecycle events on an existing channel
    pub fn with_events(mut self, events: broadcast::Sender<SyncEvent>) -> Self {
        self.events = events;
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// Load the stored queue, replacing the in-memory one
    ///
    /// Missing or malformed data yields an empty queue. Entries that were
    /// in flight when the process stopped are pending again. Returns the
    /// number of recovered entries.
    pub fn recover(&self) -> usize {
        let mut recovered = self.load_persisted();
        for entry in recovered.iter_mut() {
            if entry.status == EntryStatus::InFlight {
                debug!(id = %entry.id, "Recovered in-flight entry as pending");
                entry.status = EntryStatus::Pending;
            }
        }

        let count = recovered.len();
        let mut entries = self.lock();
        *entries = recovered;
        self.persist(&entries);
        drop(entries);

        self.store.set_pending(count);
        if count > 0 {
            info!(count, "Recovered queued operations");
        }
        count
    }

    /// Append an operation; it is sent on the next flush
    pub fn enqueue(&self, operation: OperationType, payload: Value) -> Uuid {
        self.enqueue_entry(SyncQueueEntry::new(operation, payload))
    }

    /// Append an entry built elsewhere, keeping its id
    ///
    /// The entry is reset to a fresh pending state.
    pub fn enqueue_entry(&self, mut entry: SyncQueueEntry) -> Uuid {
        entry.status = EntryStatus::Pending;
        entry.attempt_count = 0;
        entry.last_error = None;
        let id = entry.id;
        let operation = entry.operation;

        let mut entries = self.lock();
        entries.push_back(entry);
        self.persist(&entries);
        drop(entries);

        self.store.increment_pending();
        debug!(%id, %operation, "Queued operation");
        id
    }

    /// Replay pending entries in order until drained, offline or interrupted
    ///
    /// Only one flush runs at a time; a concurrent call returns at once
    /// with `FlushOutcome::AlreadyRunning`.
    pub async fn flush(&self) -> FlushReport {
        let mut report = FlushReport::new();
        if self
            .flushing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Flush already running");
            report.outcome = FlushOutcome::AlreadyRunning;
            return report;
        }
        let _guard = FlushGuard(&self.flushing);

        loop {
            if !self.status.borrow().is_online {
                debug!("Offline, pausing flush");
                report.outcome = FlushOutcome::Paused;
                break;
            }

            let Some(entry) = self.claim_next() else {
                report.outcome = FlushOutcome::Drained;
                let _ = self.events.send(SyncEvent::QueueDrained);
                break;
            };

            match self.handlers.dispatch(&entry).await {
                Ok(()) => {
                    self.complete(&entry);
                    report.completed += 1;
                }
                Err(e) if e.is_connectivity() => {
                    info!(id = %entry.id, error = %e, "Connectivity lost during flush");
                    self.release(entry.id);
                    report.outcome = FlushOutcome::Interrupted;
                    break;
                }
                Err(e) if e.is_permanent() => {
                    self.fail(&entry, &e);
                    report.failed += 1;
                }
                Err(e) => match self.record_attempt(entry.id, &e) {
                    Attempt::Exhausted => {
                        self.fail(&entry, &e);
                        report.failed += 1;
                    }
                    Attempt::Retry { attempts } => {
                        report.retried += 1;
                        let delay = {
                            let status = self.status.borrow();
                            let exponent = status.consecutive_failures.max(attempts - 1);
                            self.backoff.delay_for(exponent, status.is_slow_connection)
                        };
                        debug!(
                            id = %entry.id,
                            attempts,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Retrying after backoff"
                        );
                        tokio::time::sleep(delay).await;
                    }
                },
            }
        }

        if report.completed > 0 || report.failed > 0 {
            info!(
                completed = report.completed,
                failed = report.failed,
                outcome = ?report.outcome,
                "Flush finished"
            );
        }
        report
    }

    pub fn is_flushing(&self) -> bool {
        self.flushing.load(Ordering::SeqCst)
    }

    /// Give a failed entry a fresh set of attempts and flush
    pub async fn retry_failed_entry(&self, id: Uuid) -> Result<FlushReport, QueueError> {
        {
            let mut entries = self.lock();
            let entry = entries
                .iter_mut()
                .find(|e| e.id == id)
                .ok_or(QueueError::NotFound(id))?;
            if !entry.is_failed() {
                return Err(QueueError::NotFailed(id));
            }
            entry.status = EntryStatus::Pending;
            entry.attempt_count = 0;
            entry.last_error = None;
            self.persist(&entries);
        }

        self.store.clear_entry_notifications(id);
        info!(%id, "Retrying failed entry");
        Ok(self.flush().await)
    }

    /// Remove an entry the user gave up on
    pub fn discard(&self, id: Uuid) -> Result<SyncQueueEntry, QueueError> {
        let removed = {
            let mut entries = self.lock();
            let index = entries
                .iter()
                .position(|e| e.id == id)
                .ok_or(QueueError::NotFound(id))?;
            if entries[index].status == EntryStatus::InFlight {
                return Err(QueueError::InFlight(id));
            }
            let removed = entries.remove(index).ok_or(QueueError::NotFound(id))?;
            self.persist(&entries);
            removed
        };

        self.store.decrement_pending();
        self.store.clear_entry_notifications(id);
        info!(%id, operation = %removed.operation, "Discarded queued operation");
        Ok(removed)
    }

    /// Cloned snapshot of all entries in queue order
    pub fn entries(&self) -> Vec<SyncQueueEntry> {
        self.lock().iter().cloned().collect()
    }

    pub fn get(&self, id: Uuid) -> Option<SyncQueueEntry> {
        self.lock().iter().find(|e| e.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.lock().iter().filter(|e| e.is_pending()).count()
    }

    pub fn failed_entries(&self) -> Vec<SyncQueueEntry> {
        self.lock().iter().filter(|e| e.is_failed()).cloned().collect()
    }

    /// Drop every entry, including the stored copy
    pub fn reset(&self) {
        self.lock().clear();
        if let Err(e) = self.storage.remove(&self.key) {
            warn!(error = %e, "Failed to remove stored queue");
        }
        self.store.set_pending(0);
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<SyncQueueEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark the oldest pending entry in flight and return a copy of it
    fn claim_next(&self) -> Option<SyncQueueEntry> {
        let mut entries = self.lock();
        let entry = entries.iter_mut().find(|e| e.is_pending())?;
        entry.status = EntryStatus::InFlight;
        let claimed = entry.clone();
        self.persist(&entries);
        Some(claimed)
    }

    fn complete(&self, entry: &SyncQueueEntry) {
        {
            let mut entries = self.lock();
            entries.retain(|e| e.id != entry.id);
            self.persist(&entries);
        }

        self.store.decrement_pending();
        self.store.confirm_optimistic(entry.id);
        debug!(id = %entry.id, operation = %entry.operation, "Queued operation synced");
        let _ = self.events.send(SyncEvent::EntryCompleted {
            id: entry.id,
            operation: entry.operation,
        });
    }

    /// Put an interrupted entry back without counting the attempt
    fn release(&self, id: Uuid) {
        let mut entries = self.lock();
        if let Some(entry) = entries.iter_mut().find(|e| e.id == id) {
            entry.status = EntryStatus::Pending;
        }
        self.persist(&entries);
    }

    fn record_attempt(&self, id: Uuid, error: &RemoteError) -> Attempt {
        let mut entries = self.lock();
        let Some(entry) = entries.iter_mut().find(|e| e.id == id) else {
            return Attempt::Exhausted;
        };

        entry.attempt_count = entry.attempt_count.saturating_add(1);
        entry.last_error = Some(error.to_string());
        let attempts = entry.attempt_count;
        if attempts >= self.retry_ceiling {
            return Attempt::Exhausted;
        }

        entry.status = EntryStatus::Pending;
        self.persist(&entries);
        Attempt::Retry { attempts }
    }

    fn fail(&self, entry: &SyncQueueEntry, error: &RemoteError) {
        let reason = error.to_string();
        {
            let mut entries = self.lock();
            if let Some(stored) = entries.iter_mut().find(|e| e.id == entry.id) {
                stored.status = EntryStatus::Failed;
                stored.last_error = Some(reason.clone());
            }
            self.persist(&entries);
        }

        warn!(id = %entry.id, operation = %entry.operation, error = %reason, "Queued operation failed");
        // A refusal will not change on retry; roll the local change back
        if error.is_permanent() {
            self.store.compensate(entry.id);
        }
        self.store.surface_failure(entry.id, entry.operation, &reason);
        let _ = self.events.send(SyncEvent::EntryFailed {
            id: entry.id,
            operation: entry.operation,
            reason,
        });
    }

    fn persist(&self, entries: &VecDeque<SyncQueueEntry>) {
        let record = PersistedQueue {
            version: QUEUE_VERSION,
            entries: entries.iter().cloned().collect(),
        };
        let raw = match serde_json::to_string(&record) {
            Ok(raw) => raw,
            Err(e) => {
                error!(error = %e, "Cannot encode mutation queue");
                return;
            }
        };

        let mut result = self.storage.write(&self.key, &raw);
        if matches!(&result, Err(e) if e.is_transient()) {
            debug!("Retrying mutation queue write");
            result = self.storage.write(&self.key, &raw);
        }
        match result {
            Ok(()) => {}
            Err(e) if e.is_transient() => {
                warn!(error = %e, "Failed to persist mutation queue, keeping it in memory")
            }
            Err(e) => error!(
                error = %e,
                "Mutation queue cannot be persisted; queued changes will not survive a restart"
            ),
        }
    }

    fn load_persisted(&self) -> VecDeque<SyncQueueEntry> {
        let raw = match self.storage.read(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return VecDeque::new(),
            Err(e) => {
                warn!(error = %e, "Cannot read stored queue, starting empty");
                return VecDeque::new();
            }
        };

        match serde_json::from_str::<PersistedQueue>(&raw) {
            Ok(record) => record.entries.into(),
            Err(e) => {
                warn!(error = %e, "Malformed stored queue, starting empty");
                VecDeque::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use crate::store::{EquipmentItem, Slice};
    use crate::testing::{FlakyStorage, RecordingHandler};
    use serde_json::json;
    use std::time::Duration;

    const KEY: &str = "fitfusion-sync-queue";

    struct Harness {
        queue: Arc<MutationQueue>,
        store: Arc<Store>,
        storage: Arc<MemoryStorage>,
        handler: Arc<RecordingHandler>,
        status: watch::Sender<NetworkStatus>,
    }

    fn harness() -> Harness {
        harness_with(Arc::new(MemoryStorage::new()))
    }

    fn harness_with(storage: Arc<MemoryStorage>) -> Harness {
        let store = Arc::new(Store::hydrate(storage.clone(), "fitfusion"));
        let handler = Arc::new(RecordingHandler::new());
        let (status, status_rx) = watch::channel(NetworkStatus::initial(true));
        let queue = MutationQueue::new(
            storage.clone(),
            KEY,
            store.clone(),
            HandlerRegistry::new().with_fallback(handler.clone()),
            status_rx,
        );

        Harness {
            queue: Arc::new(queue),
            store,
            storage,
            handler,
            status,
        }
    }

    fn op(label: &str, script: &str) -> Value {
        json!({"label": label, "script": script, "session_id": label})
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_is_fifo_and_exactly_once() {
        let h = harness();
        for label in ["A", "B", "C"] {
            h.queue.enqueue(OperationType::CompleteSession, op(label, "ok"));
        }
        assert_eq!(h.store.pending_sync_count(), 3);

        let report = h.queue.flush().await;
        assert_eq!(report.outcome, FlushOutcome::Drained);
        assert_eq!(report.completed, 3);
        assert_eq!(h.handler.labels(), vec!["A", "B", "C"]);
        assert!(h.queue.is_empty());
        assert_eq!(h.store.pending_sync_count(), 0);

        h.queue.flush().await;
        assert_eq!(h.handler.calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_entry_fails_without_blocking_others() {
        let h = harness();
        let mut events = h.queue.subscribe();
        h.queue.enqueue(OperationType::UpdateEquipment, op("A", "ok"));
        let b = h.queue.enqueue(OperationType::UpdateEquipment, op("B", "reject"));
        h.queue.enqueue(OperationType::UpdateEquipment, op("C", "ok"));

        let report = h.queue.flush().await;

        assert_eq!(h.handler.labels(), vec!["A", "B", "C"]);
        assert_eq!(report.completed, 2);
        assert_eq!(report.failed, 1);
        let remaining = h.queue.entries();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, b);
        assert!(remaining[0].is_failed());
        assert_eq!(remaining[0].attempt_count, 0);
        assert_eq!(h.store.pending_sync_count(), 1);

        let mut failed = Vec::new();
        while let Ok(event) = events.try_recv() {
            if let SyncEvent::EntryFailed { id, .. } = event {
                failed.push(id);
            }
        }
        assert_eq!(failed, vec![b]);
        assert_eq!(h.store.notifications()[0].entry_id, Some(b));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_ceiling_then_next_entry() {
        let h = harness();
        let a = h.queue.enqueue(OperationType::StartSession, op("A", "transient"));
        h.queue.enqueue(OperationType::StartSession, op("B", "ok"));

        let started = tokio::time::Instant::now();
        let report = h.queue.flush().await;

        assert_eq!(h.handler.labels(), vec!["A", "A", "A", "A", "A", "B"]);
        assert_eq!(report.retried, 4);
        assert_eq!(report.failed, 1);
        let failed = h.queue.get(a).unwrap();
        assert!(failed.is_failed());
        assert_eq!(failed.attempt_count, 5);
        assert!(failed.last_error.unwrap().contains("503"));
        // 1 + 2 + 4 + 8 seconds of backoff between the five attempts
        assert_eq!(started.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failure_recovers_within_ceiling() {
        let h = harness();
        h.queue.enqueue(OperationType::SkipSession, op("A", "transient-then-ok:2"));

        let report = h.queue.flush().await;
        assert_eq!(report.completed, 1);
        assert_eq!(report.retried, 2);
        assert_eq!(h.handler.calls().len(), 3);
        assert!(h.queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_pauses_flush() {
        let h = harness();
        h.status.send_replace(NetworkStatus::initial(false));
        h.queue.enqueue(OperationType::CompleteSession, op("A", "ok"));

        let report = h.queue.flush().await;
        assert_eq!(report.outcome, FlushOutcome::Paused);
        assert!(h.handler.calls().is_empty());
        assert_eq!(h.store.pending_sync_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connectivity_loss_interrupts_without_counting() {
        let h = harness();
        let a = h.queue.enqueue(OperationType::CompleteSession, op("A", "offline"));
        h.queue.enqueue(OperationType::CompleteSession, op("B", "ok"));

        let report = h.queue.flush().await;

        assert_eq!(report.outcome, FlushOutcome::Interrupted);
        assert_eq!(h.handler.labels(), vec!["A"]);
        let entry = h.queue.get(a).unwrap();
        assert!(entry.is_pending());
        assert_eq!(entry.attempt_count, 0);
        assert_eq!(h.store.pending_sync_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_flush_is_rejected() {
        let h = harness();
        let gate = h.handler.gated();
        let a = h.queue.enqueue(OperationType::CompleteSession, op("A", "ok"));

        let queue = h.queue.clone();
        let first = tokio::spawn(async move { queue.flush().await });
        while h.handler.calls().is_empty() {
            tokio::task::yield_now().await;
        }

        assert!(h.queue.is_flushing());
        assert_eq!(h.queue.flush().await.outcome, FlushOutcome::AlreadyRunning);
        assert_eq!(h.queue.get(a).unwrap().status, EntryStatus::InFlight);
        assert_eq!(h.queue.discard(a), Err(QueueError::InFlight(a)));

        gate.notify_one();
        let report = first.await.unwrap();
        assert_eq!(report.completed, 1);
        assert!(!h.queue.is_flushing());
        assert_eq!(h.handler.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recover_restores_order_and_in_flight() {
        let storage = Arc::new(MemoryStorage::new());
        let mut in_flight = SyncQueueEntry::new(OperationType::UpdateProfile, op("A", "ok"));
        in_flight.status = EntryStatus::InFlight;
        let mut failed = SyncQueueEntry::new(OperationType::UpdateProfile, op("B", "ok"));
        failed.status = EntryStatus::Failed;
        failed.attempt_count = 5;
        let record = PersistedQueue {
            version: QUEUE_VERSION,
            entries: vec![in_flight.clone(), failed.clone()],
        };
        storage
            .write(KEY, &serde_json::to_string(&record).unwrap())
            .unwrap();

        let h = harness_with(storage);
        assert_eq!(h.queue.recover(), 2);

        let entries = h.queue.entries();
        assert_eq!(entries[0].id, in_flight.id);
        assert!(entries[0].is_pending());
        assert!(entries[1].is_failed());
        assert_eq!(h.store.pending_sync_count(), 2);
        assert_eq!(h.queue.pending_count(), 1);
        assert_eq!(h.queue.failed_entries().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueued_entries_survive_restart() {
        let storage = Arc::new(MemoryStorage::new());
        let first = harness_with(storage.clone());
        first.status.send_replace(NetworkStatus::initial(false));
        let ids: Vec<_> = ["A", "B"]
            .into_iter()
            .map(|l| first.queue.enqueue(OperationType::ActivateProgram, op(l, "ok")))
            .collect();

        let second = harness_with(storage);
        second.queue.recover();
        let recovered: Vec<_> = second.queue.entries().iter().map(|e| e.id).collect();
        assert_eq!(recovered, ids);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_queue_recovers_empty() {
        let storage = Arc::new(MemoryStorage::new());
        storage.write(KEY, "[{\"garbage\":").unwrap();

        let h = harness_with(storage);
        assert_eq!(h.queue.recover(), 0);
        assert!(h.queue.is_empty());
        assert_eq!(h.store.pending_sync_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_failed_entry_resets_attempts() {
        let h = harness();
        let a = h.queue.enqueue(OperationType::CompleteSession, op("A", "reject"));
        h.queue.flush().await;
        assert!(h.queue.get(a).unwrap().is_failed());

        h.handler.heal();
        let report = h.queue.retry_failed_entry(a).await.unwrap();

        assert_eq!(report.completed, 1);
        assert!(h.queue.is_empty());
        assert_eq!(h.store.pending_sync_count(), 0);
        assert!(h.store.notifications().iter().all(|n| n.entry_id != Some(a)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_and_discard_errors() {
        let h = harness();
        h.status.send_replace(NetworkStatus::initial(false));
        let a = h.queue.enqueue(OperationType::CompleteSession, op("A", "ok"));
        let missing = Uuid::new_v4();

        assert_eq!(h.queue.retry_failed_entry(a).await, Err(QueueError::NotFailed(a)));
        assert_eq!(
            h.queue.retry_failed_entry(missing).await,
            Err(QueueError::NotFound(missing))
        );
        assert_eq!(h.queue.discard(missing), Err(QueueError::NotFound(missing)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_discard_keeps_counter_consistent() {
        let h = harness();
        h.queue.enqueue(OperationType::DeleteEquipment, op("A", "reject"));
        h.queue.enqueue(OperationType::DeleteEquipment, op("B", "ok"));
        h.queue.flush().await;
        assert_eq!(h.store.pending_sync_count(), h.queue.len());

        let failed = h.queue.failed_entries();
        h.queue.discard(failed[0].id).unwrap();
        assert_eq!(h.store.pending_sync_count(), 0);
        assert_eq!(h.queue.len(), 0);
        assert!(h.store.notifications().is_empty());

        // Extra decrements cannot go negative
        h.store.decrement_pending();
        assert_eq!(h.store.pending_sync_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_compensates_optimistic_change() {
        let h = harness();
        h.status.send_replace(NetworkStatus::initial(false));
        let id = h.queue.enqueue(OperationType::CreateEquipment, op("A", "reject"));
        h.store.apply_optimistic(id, Slice::Equipment, |s| {
            s.equipment.items.push(EquipmentItem {
                id: "tmp".to_string(),
                name: "Bands".to_string(),
                category: None,
                is_available: true,
            })
        });

        h.status.send_replace(NetworkStatus::initial(true));
        h.queue.flush().await;

        assert!(h.store.state().equipment.items.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejected_change_does_not_undo_accepted_one() {
        let h = harness();
        h.status.send_replace(NetworkStatus::initial(false));
        for (label, script) in [("a", "reject"), ("b", "ok")] {
            let id = h.queue.enqueue(OperationType::CreateEquipment, op(label, script));
            h.store.apply_optimistic(id, Slice::Equipment, |s| {
                s.equipment.items.push(EquipmentItem {
                    id: label.to_string(),
                    name: label.to_uppercase(),
                    category: None,
                    is_available: true,
                })
            });
        }

        h.status.send_replace(NetworkStatus::initial(true));
        let report = h.queue.flush().await;

        assert_eq!((report.completed, report.failed), (1, 1));
        let ids: Vec<String> = h.store.state().equipment.items.into_iter().map(|i| i.id).collect();
        assert_eq!(ids, vec!["b"]);
        assert!(h.store.optimistic_records().is_empty());
    }

    fn queue_on(storage: Arc<FlakyStorage>) -> MutationQueue {
        let store = Arc::new(Store::hydrate(Arc::new(MemoryStorage::new()), "fitfusion"));
        let (_status, status_rx) = watch::channel(NetworkStatus::initial(false));
        MutationQueue::new(
            storage,
            KEY,
            store,
            HandlerRegistry::new().with_fallback(Arc::new(RecordingHandler::new())),
            status_rx,
        )
    }

    #[test]
    fn test_transient_write_failure_is_retried() {
        let storage = Arc::new(FlakyStorage::default());
        let queue = queue_on(storage.clone());

        storage.fail_writes(1, false);
        let id = queue.enqueue(OperationType::CompleteSession, op("A", "ok"));

        assert_eq!(storage.write_calls(), 2);
        let raw = storage.read(KEY).unwrap().unwrap();
        assert!(raw.contains(&id.to_string()));
    }

    #[test]
    fn test_permanent_write_failure_is_not_retried() {
        let storage = Arc::new(FlakyStorage::default());
        let queue = queue_on(storage.clone());

        storage.fail_writes(1, true);
        queue.enqueue(OperationType::CompleteSession, op("A", "ok"));

        assert_eq!(storage.write_calls(), 1);
        assert!(storage.read(KEY).unwrap().is_none());
        // still queued in memory
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_clears_storage() {
        let h = harness();
        h.status.send_replace(NetworkStatus::initial(false));
        h.queue.enqueue(OperationType::CompleteSession, op("A", "ok"));

        h.queue.reset();
        assert!(h.queue.is_empty());
        assert_eq!(h.store.pending_sync_count(), 0);
        assert!(h.storage.read(KEY).unwrap().is_none());
    }
}
