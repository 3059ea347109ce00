//! Queue entry model

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Remote effect a queued entry replays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OperationType {
    UpdateProfile,
    UpdatePreferences,
    CreateEquipment,
    UpdateEquipment,
    DeleteEquipment,
    SetEquipmentAvailability,
    StartSession,
    CompleteSession,
    SkipSession,
    UpdateExerciseProgress,
    ActivateProgram,
    DeactivateProgram,
}

impl OperationType {
    pub const ALL: [OperationType; 12] = [
        OperationType::UpdateProfile,
        OperationType::UpdatePreferences,
        OperationType::CreateEquipment,
        OperationType::UpdateEquipment,
        OperationType::DeleteEquipment,
        OperationType::SetEquipmentAvailability,
        OperationType::StartSession,
        OperationType::CompleteSession,
        OperationType::SkipSession,
        OperationType::UpdateExerciseProgress,
        OperationType::ActivateProgram,
        OperationType::DeactivateProgram,
    ];

    /// Wire name, e.g. `complete-session`
    pub fn as_str(self) -> &'static str {
        match self {
            OperationType::UpdateProfile => "update-profile",
            OperationType::UpdatePreferences => "update-preferences",
            OperationType::CreateEquipment => "create-equipment",
            OperationType::UpdateEquipment => "update-equipment",
            OperationType::DeleteEquipment => "delete-equipment",
            OperationType::SetEquipmentAvailability => "set-equipment-availability",
            OperationType::StartSession => "start-session",
            OperationType::CompleteSession => "complete-session",
            OperationType::SkipSession => "skip-session",
            OperationType::UpdateExerciseProgress => "update-exercise-progress",
            OperationType::ActivateProgram => "activate-program",
            OperationType::DeactivateProgram => "deactivate-program",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OperationType::ALL
            .into_iter()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| format!("unknown operation type '{}'", s))
    }
}

/// Where an entry is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntryStatus {
    Pending,
    InFlight,
    /// Retries exhausted or rejected; waits for the user
    Failed,
}

impl fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EntryStatus::Pending => "pending",
            EntryStatus::InFlight => "in-flight",
            EntryStatus::Failed => "failed",
        })
    }
}

/// One state-changing operation waiting to reach the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncQueueEntry {
    pub id: Uuid,
    pub operation: OperationType,
    /// Plain data needed to replay the operation
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub attempt_count: u32,
    pub status: EntryStatus,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl SyncQueueEntry {
    pub fn new(operation: OperationType, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            operation,
            payload,
            created_at: Utc::now(),
            attempt_count: 0,
            status: EntryStatus::Pending,
            last_error: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == EntryStatus::Pending
    }

    pub fn is_failed(&self) -> bool {
        self.status == EntryStatus::Failed
    }
}
