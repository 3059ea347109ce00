//! Client state store
//!
//! The `Store` owns `AppState` and keeps the persisted subset of it in
//! durable storage:
//! - on start, `hydrate` merges the stored snapshot over fresh defaults
//! - every mutation goes through `update`, which writes a new snapshot
//!   whenever the persisted slices changed
//!
//! Persistence never fails a caller. Read problems mean "no snapshot",
//! write problems are logged and the in-memory state stays authoritative.
//!
//! ## Usage
//!
//! ```ignore
//! let store = Store::hydrate(storage, "fitfusion");
//! store.update(|state| state.preferences.theme = Theme::Dark);
//! ```

mod optimistic;
mod snapshot;
mod state;

use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, warn};
use uuid::Uuid;

pub use optimistic::OptimisticRecord;
pub use snapshot::{PersistedSnapshot, SNAPSHOT_VERSION};
pub use state::{
    ActiveSession, AppState, EquipmentItem, EquipmentState, LoadingFlags, Navigation,
    Notification, NotificationKind, Preferences, Profile, ProgressState, Slice, Theme, UiState,
    Units, WorkoutState,
};

use crate::network::{NetworkStatus, StatusTransition};
use crate::queue::OperationType;
use crate::storage::{DurableStorage, StorageResult};
use optimistic::{revert_change, OptimisticLog};

pub struct Store {
    storage: Arc<dyn DurableStorage>,
    app_id: String,
    state: RwLock<AppState>,
    optimistic: OptimisticLog,
}

impl Store {
    /// Build the initial state from defaults and the stored snapshot
    pub fn hydrate(storage: Arc<dyn DurableStorage>, app_id: impl Into<String>) -> Self {
        let app_id = app_id.into();
        let state = match load_snapshot(storage.as_ref(), &app_id) {
            Some(snapshot) => {
                debug!(saved_at = %snapshot.saved_at, "Hydrating from snapshot");
                snapshot.merge_into(AppState::default())
            }
            None => AppState::default(),
        };

        Self {
            storage,
            app_id,
            state: RwLock::new(state),
            optimistic: OptimisticLog::default(),
        }
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// Cloned snapshot of the whole state
    pub fn state(&self) -> AppState {
        self.read(AppState::clone)
    }

    /// Read part of the state without cloning all of it
    pub fn read<R>(&self, f: impl FnOnce(&AppState) -> R) -> R {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Apply a mutation, persisting if the persisted slices changed
    pub fn update<R>(&self, f: impl FnOnce(&mut AppState) -> R) -> R {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        let before = state.clone();
        let result = f(&mut state);

        // Written under the lock so snapshots land in mutation order
        if !state.same_persisted(&before) {
            if let Err(e) = self.write_snapshot(&state) {
                warn!(error = %e, "Failed to persist state snapshot");
            }
        }
        result
    }

    /// Write the current snapshot now
    pub fn persist(&self) -> StorageResult<()> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        self.write_snapshot(&state)
    }

    /// Drop all state and the stored snapshot
    pub fn reset(&self) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = AppState::default();
        self.optimistic.clear();
        if let Err(e) = self.storage.remove(&self.app_id) {
            warn!(error = %e, "Failed to remove state snapshot");
        }
    }

    fn write_snapshot(&self, state: &AppState) -> StorageResult<()> {
        let snapshot = PersistedSnapshot::capture(state, &self.app_id)?;
        let raw = serde_json::to_string(&snapshot)?;
        self.storage.write(&self.app_id, &raw)
    }

    // ==================== Network ====================

    pub fn network_status(&self) -> NetworkStatus {
        self.read(|s| s.network.clone())
    }

    pub fn set_network_status(&self, status: NetworkStatus) {
        self.update(|s| s.network = status);
    }

    /// Record a reachability transition and tell the user about it
    pub fn record_transition(&self, transition: &StatusTransition) {
        let notice = if transition.came_online() {
            Some("Back online, syncing your changes")
        } else if transition.went_offline() {
            Some("You are offline. Changes will sync when the connection returns")
        } else if transition.current.is_slow_connection && !transition.previous.is_slow_connection {
            Some("Slow connection detected")
        } else {
            None
        };

        self.update(|s| {
            s.network = transition.current.clone();
            if let Some(message) = notice {
                s.ui.notifications.push(Notification::info(message));
            }
        });
    }

    // ==================== Pending counter ====================

    pub fn pending_sync_count(&self) -> usize {
        self.read(|s| s.pending_sync_count)
    }

    pub fn increment_pending(&self) {
        self.update(|s| s.pending_sync_count += 1);
    }

    /// Decrement, never going below zero
    pub fn decrement_pending(&self) {
        self.update(|s| s.pending_sync_count = s.pending_sync_count.saturating_sub(1));
    }

    pub fn set_pending(&self, count: usize) {
        self.update(|s| s.pending_sync_count = count);
    }

    // ==================== Notifications ====================

    pub fn notifications(&self) -> Vec<Notification> {
        self.read(|s| s.ui.notifications.clone())
    }

    pub fn push_notification(&self, notification: Notification) -> Uuid {
        let id = notification.id;
        self.update(|s| s.ui.notifications.push(notification));
        id
    }

    /// Remove a notification; returns false if it did not exist
    pub fn dismiss_notification(&self, id: Uuid) -> bool {
        self.update(|s| {
            let before = s.ui.notifications.len();
            s.ui.notifications.retain(|n| n.id != id);
            s.ui.notifications.len() != before
        })
    }

    /// Show a persistent error for a queue entry, replacing an older one
    pub fn surface_failure(&self, entry_id: Uuid, operation: OperationType, reason: &str) {
        let notification =
            Notification::error(format!("Could not sync {}: {}", operation, reason)).for_entry(entry_id);
        self.update(|s| {
            s.ui.notifications.retain(|n| n.entry_id != Some(entry_id));
            s.ui.notifications.push(notification);
        });
    }

    /// Drop notifications attached to a queue entry
    pub fn clear_entry_notifications(&self, entry_id: Uuid) {
        self.update(|s| s.ui.notifications.retain(|n| n.entry_id != Some(entry_id)));
    }

    // ==================== Optimistic updates ====================

    /// Apply a local mutation ahead of server confirmation
    ///
    /// The slice before and after the mutation is recorded against
    /// `entry_id` so `compensate` can undo exactly this change.
    pub fn apply_optimistic<R>(
        &self,
        entry_id: Uuid,
        slice: Slice,
        mutate: impl FnOnce(&mut AppState) -> R,
    ) -> R {
        self.update(|state| {
            let original = state.slice_value(slice);
            let result = mutate(state);
            match (original, state.slice_value(slice)) {
                (Ok(original), Ok(applied)) => {
                    self.optimistic.record(entry_id, slice, original, applied)
                }
                (Err(e), _) | (_, Err(e)) => {
                    warn!(%slice, error = %e, "Cannot record optimistic update")
                }
            }
            result
        })
    }

    /// Server accepted the change; forget the original
    pub fn confirm_optimistic(&self, entry_id: Uuid) -> bool {
        self.optimistic.take(&entry_id).is_some()
    }

    /// Server refused the change; undo it, keeping later changes
    pub fn compensate(&self, entry_id: Uuid) -> bool {
        let Some(record) = self.optimistic.take(&entry_id) else {
            return false;
        };

        self.update(|state| {
            let restored = state
                .slice_value(record.slice)
                .map(|current| revert_change(current, &record.original, &record.applied))
                .and_then(|restored| state.replace_slice(record.slice, restored));
            match restored {
                Ok(()) => {
                    debug!(id = %entry_id, slice = %record.slice, "Rolled back optimistic update");
                    true
                }
                Err(e) => {
                    warn!(id = %entry_id, error = %e, "Failed to roll back optimistic update");
                    false
                }
            }
        })
    }

    pub fn optimistic_records(&self) -> Vec<OptimisticRecord> {
        self.optimistic.pending()
    }
}

fn load_snapshot(storage: &dyn DurableStorage, key: &str) -> Option<PersistedSnapshot> {
    let raw = match storage.read(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            warn!(error = %e, "Cannot read state snapshot, starting from defaults");
            return None;
        }
    };

    match serde_json::from_str(&raw) {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            warn!(error = %e, "Malformed state snapshot, starting from defaults");
            None
        }
    }
}
