//! fitsync Core Library
//!
//! Offline-first synchronization core for the fitness-coaching client:
//! decides whether the API server is reachable, queues state-changing
//! operations made while it is not, replays them in order once it is,
//! and keeps the persisted part of the client state across restarts.
//!
//! # Architecture
//!
//! - **Reachability monitor** (`network`): interface flag + active probe,
//!   throttled, publishing `NetworkStatus` over a watch channel
//! - **Mutation queue** (`queue`): durable FIFO with a single flusher,
//!   bounded retries and no head-of-line blocking
//! - **Store** (`store`): client state with snapshot hydration and
//!   optimistic updates
//!
//! `SyncEngine` wires the three together.
//!
//! # Quick Start
//!
//! ```text
//! let config = Config::load()?;
//! let engine = SyncEngine::init(config.clone(), Collaborators::from_config(&config)?);
//! engine.start();
//!
//! // Sent now if online, queued otherwise
//! engine.submit(OperationType::CompleteSession, json!({"session_id": "s1"})).await?;
//! ```
//!
//! # Modules
//!
//! - `engine`: lifecycle and wiring (main entry point)
//! - `network`: reachability monitor
//! - `queue`: mutation queue
//! - `store`: client state and snapshot
//! - `remote`: operation handlers and the HTTP client
//! - `storage`: durable key/value backends
//! - `events`: lifecycle events
//! - `config`: application configuration

pub mod config;
pub mod engine;
pub mod events;
pub mod network;
pub mod queue;
pub mod remote;
pub mod storage;
pub mod store;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use engine::{Collaborators, Submission, SyncEngine};
pub use events::SyncEvent;
pub use network::{ConnectionQuality, NetworkStatus, ReachabilityMonitor, Trigger};
pub use queue::{FlushOutcome, FlushReport, MutationQueue, OperationType, QueueError, SyncQueueEntry};
pub use remote::{HandlerRegistry, HttpRemote, OperationHandler, RemoteError};
pub use storage::{DurableStorage, StorageError};
pub use store::{AppState, Store};
