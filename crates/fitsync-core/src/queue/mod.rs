//! Mutation queue
//!
//! State-changing operations made while the server is unreachable are
//! recorded as plain data and replayed, oldest first, once it is back.
//!
//! Lifecycle of an entry:
//!
//! ```text
//! pending -> in-flight -> (removed on success)
//!                      -> pending   (transient error, below the ceiling)
//!                      -> failed    (rejected, or retries exhausted)
//! failed  -> pending   (retry_failed_entry)
//! ```

mod entry;
mod mutation_queue;

pub use entry::{EntryStatus, OperationType, SyncQueueEntry};
pub use mutation_queue::{FlushOutcome, FlushReport, MutationQueue, QueueError, QUEUE_VERSION};
