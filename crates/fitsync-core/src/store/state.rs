//! Client state model
//!
//! State is organised in slices. Only the slices listed in
//! [`Slice::PERSISTED`] ever reach durable storage; everything else
//! (volatile UI state, network status, the pending counter and the
//! business slices reloaded from the server) is rebuilt on every start.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::network::NetworkStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    System,
    Light,
    Dark,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    #[default]
    Metric,
    Imperial,
}

/// User-facing preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    pub theme: Theme,
    pub units: Units,
    pub notifications_enabled: bool,
    pub sound_enabled: bool,
    /// Preferred workout length in minutes
    pub session_duration: u32,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            theme: Theme::System,
            units: Units::Metric,
            notifications_enabled: true,
            sound_enabled: true,
            session_duration: 45,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Navigation {
    pub last_route: String,
    pub sidebar_collapsed: bool,
    pub active_tab: Option<String>,
}

impl Default for Navigation {
    fn default() -> Self {
        Self {
            last_route: "/dashboard".to_string(),
            sidebar_collapsed: false,
            active_tab: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub user_id: Option<String>,
    pub display_name: Option<String>,
    pub fitness_goals: Vec<String>,
    pub experience_level: Option<String>,
    pub onboarding_complete: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquipmentItem {
    pub id: String,
    pub name: String,
    pub category: Option<String>,
    pub is_available: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EquipmentState {
    pub items: Vec<EquipmentItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveSession {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub completed_exercises: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkoutState {
    pub active_program_id: Option<String>,
    pub active_session: Option<ActiveSession>,
    pub completed_sessions: Vec<String>,
    pub skipped_sessions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressState {
    /// Latest logged progress per exercise id
    pub exercises: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadingFlags {
    pub profile: bool,
    pub equipment: bool,
    pub workout: bool,
    pub generation: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub kind: NotificationKind,
    pub message: String,
    /// Queue entry this notification is about, if any
    pub entry_id: Option<Uuid>,
    /// Stays until dismissed
    pub persistent: bool,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn info(message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Info, message, false)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NotificationKind::Error, message, true)
    }

    fn new(kind: NotificationKind, message: impl Into<String>, persistent: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            message: message.into(),
            entry_id: None,
            persistent,
            created_at: Utc::now(),
        }
    }

    pub fn for_entry(mut self, entry_id: Uuid) -> Self {
        self.entry_id = Some(entry_id);
        self
    }
}

/// Volatile UI state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UiState {
    pub loading: LoadingFlags,
    /// Running AI workout generation, if any
    pub generation_task_id: Option<String>,
    pub notifications: Vec<Notification>,
}

/// Whole client state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppState {
    pub preferences: Preferences,
    pub navigation: Navigation,
    pub profile: Profile,
    pub equipment: EquipmentState,
    pub workout: WorkoutState,
    pub progress: ProgressState,
    pub ui: UiState,
    pub network: NetworkStatus,
    pub pending_sync_count: usize,
}

/// Named, independently serialisable part of `AppState`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Slice {
    Preferences,
    Navigation,
    Profile,
    Equipment,
    Workout,
    Progress,
}

impl Slice {
    /// The slices written to the snapshot
    pub const PERSISTED: [Slice; 3] = [Slice::Preferences, Slice::Navigation, Slice::Profile];

    pub fn name(self) -> &'static str {
        match self {
            Slice::Preferences => "preferences",
            Slice::Navigation => "navigation",
            Slice::Profile => "profile",
            Slice::Equipment => "equipment",
            Slice::Workout => "workout",
            Slice::Progress => "progress",
        }
    }

    pub fn is_persisted(self) -> bool {
        Slice::PERSISTED.contains(&self)
    }
}

impl fmt::Display for Slice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl AppState {
    /// JSON form of one slice
    pub fn slice_value(&self, slice: Slice) -> serde_json::Result<Value> {
        match slice {
            Slice::Preferences => serde_json::to_value(&self.preferences),
            Slice::Navigation => serde_json::to_value(&self.navigation),
            Slice::Profile => serde_json::to_value(&self.profile),
            Slice::Equipment => serde_json::to_value(&self.equipment),
            Slice::Workout => serde_json::to_value(&self.workout),
            Slice::Progress => serde_json::to_value(&self.progress),
        }
    }

    /// Replace one slice from its JSON form; on error the slice is untouched
    pub fn replace_slice(&mut self, slice: Slice, value: Value) -> serde_json::Result<()> {
        match slice {
            Slice::Preferences => self.preferences = serde_json::from_value(value)?,
            Slice::Navigation => self.navigation = serde_json::from_value(value)?,
            Slice::Profile => self.profile = serde_json::from_value(value)?,
            Slice::Equipment => self.equipment = serde_json::from_value(value)?,
            Slice::Workout => self.workout = serde_json::from_value(value)?,
            Slice::Progress => self.progress = serde_json::from_value(value)?,
        }
        Ok(())
    }

    /// Whether the persisted subset of two states is identical
    pub fn same_persisted(&self, other: &AppState) -> bool {
        self.preferences == other.preferences
            && self.navigation == other.navigation
            && self.profile == other.profile
    }
}
