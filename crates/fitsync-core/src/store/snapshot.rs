//! Persisted snapshot and hydration merge

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use super::state::{AppState, Slice};

/// Current snapshot format version
pub const SNAPSHOT_VERSION: u32 = 1;

/// Serialized subset of state kept in durable storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedSnapshot {
    pub version: u32,
    pub app_id: String,
    pub saved_at: DateTime<Utc>,
    /// Slice name -> slice object
    #[serde(default)]
    pub slices: BTreeMap<String, Value>,
}

impl PersistedSnapshot {
    /// Capture the persisted slices of a state
    pub fn capture(state: &AppState, app_id: &str) -> serde_json::Result<Self> {
        let mut slices = BTreeMap::new();
        for slice in Slice::PERSISTED {
            slices.insert(slice.name().to_string(), state.slice_value(slice)?);
        }

        Ok(Self {
            version: SNAPSHOT_VERSION,
            app_id: app_id.to_string(),
            saved_at: Utc::now(),
            slices,
        })
    }

    /// Merge the snapshot into freshly initialised state
    ///
    /// Each persisted slice is merged key by key over the default slice, so
    /// keys added since the snapshot was written keep their defaults. A slice
    /// that no longer deserialises after the merge falls back to its default.
    /// Slices outside the persisted declaration are ignored even if present.
    pub fn merge_into(&self, mut state: AppState) -> AppState {
        if self.version > SNAPSHOT_VERSION {
            debug!(version = self.version, "Snapshot is newer than this build, merging known keys");
        }

        for slice in Slice::PERSISTED {
            let Some(persisted) = self.slices.get(slice.name()) else {
                continue;
            };
            let defaults = match state.slice_value(slice) {
                Ok(value) => value,
                Err(e) => {
                    warn!(%slice, error = %e, "Cannot serialise default slice");
                    continue;
                }
            };

            let merged = shallow_merge(defaults, persisted);
            if let Err(e) = state.replace_slice(slice, merged) {
                warn!(%slice, error = %e, "Persisted slice is incompatible, keeping defaults");
            }
        }

        state
    }
}

/// Overlay the top-level keys of `overlay` onto `base`
///
/// Non-object overlays are ignored.
fn shallow_merge(mut base: Value, overlay: &Value) -> Value {
    if let (Some(base_map), Some(overlay_map)) = (base.as_object_mut(), overlay.as_object()) {
        for (key, value) in overlay_map {
            base_map.insert(key.clone(), value.clone());
        }
    }
    base
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::state::{Notification, Theme};
    use serde_json::json;

    fn snapshot(slices: Value) -> PersistedSnapshot {
        PersistedSnapshot {
            version: SNAPSHOT_VERSION,
            app_id: "fitfusion".to_string(),
            saved_at: Utc::now(),
            slices: serde_json::from_value(slices).unwrap(),
        }
    }

    #[test]
    fn test_capture_contains_only_persisted_slices() {
        let mut state = AppState::default();
        state.ui.loading.workout = true;
        state.ui.notifications.push(Notification::info("hi"));
        state.pending_sync_count = 4;

        let captured = PersistedSnapshot::capture(&state, "fitfusion").unwrap();
        let names: Vec<_> = captured.slices.keys().cloned().collect();
        assert_eq!(names, vec!["navigation", "preferences", "profile"]);

        let raw = serde_json::to_string(&captured).unwrap();
        assert!(!raw.contains("loading"));
        assert!(!raw.contains("pending_sync_count"));
    }

    #[test]
    fn test_new_keys_keep_defaults() {
        // Snapshot written before `units` and `sound_enabled` existed
        let snap = snapshot(json!({"preferences": {"theme": "dark"}}));
        let state = snap.merge_into(AppState::default());

        assert_eq!(state.preferences.theme, Theme::Dark);
        assert!(state.preferences.sound_enabled);
        assert_eq!(state.preferences.session_duration, 45);
    }

    #[test]
    fn test_incompatible_slice_falls_back() {
        let snap = snapshot(json!({
            "preferences": {"theme": ["not", "a", "theme"]},
            "navigation": {"sidebar_collapsed": true}
        }));
        let state = snap.merge_into(AppState::default());

        assert_eq!(state.preferences.theme, Theme::System);
        assert!(state.navigation.sidebar_collapsed);
    }

    #[test]
    fn test_non_persisted_slices_are_ignored() {
        let snap = snapshot(json!({
            "equipment": {"items": [{"id": "e1", "name": "Bench", "category": null, "is_available": true}]},
            "ui": {"loading": {"profile": true}}
        }));
        let state = snap.merge_into(AppState::default());

        assert!(state.equipment.items.is_empty());
        assert!(!state.ui.loading.profile);
    }

    #[test]
    fn test_non_object_slice_is_ignored() {
        let snap = snapshot(json!({"profile": "corrupted"}));
        let state = snap.merge_into(AppState::default());
        assert_eq!(state.profile, AppState::default().profile);
    }
}
