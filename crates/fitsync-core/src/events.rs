//! Events published to subscribers of the sync engine

use uuid::Uuid;

use crate::network::NetworkStatus;
use crate::queue::OperationType;

#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// Online or slow-connection state changed
    StatusChanged(NetworkStatus),
    /// A flush finished and nothing is left to retry
    QueueDrained,
    EntryCompleted { id: Uuid, operation: OperationType },
    /// Entry moved to failed and now waits for the user
    EntryFailed {
        id: Uuid,
        operation: OperationType,
        reason: String,
    },
}
