//! Remote operation handlers
//!
//! A queue entry is data; replaying it requires a handler for its
//! `OperationType`. The registry resolves handlers at flush time, so
//! entries restored from storage need no code attached to them.

mod error;
mod http;
mod routes;

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::BoxFuture;

pub use error::RemoteError;
pub use http::{HttpRemote, IDEMPOTENCY_HEADER};
pub use routes::{route_for, Route};

use crate::queue::{OperationType, SyncQueueEntry};

/// Performs the remote effect of one queue entry
pub trait OperationHandler: Send + Sync {
    fn apply<'a>(&'a self, entry: &'a SyncQueueEntry) -> BoxFuture<'a, Result<(), RemoteError>>;
}

/// Operation type -> handler lookup
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<OperationType, Arc<dyn OperationHandler>>,
    fallback: Option<Arc<dyn OperationHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry routing every operation through the HTTP API
    pub fn http(remote: HttpRemote) -> Self {
        Self::new().with_fallback(Arc::new(remote))
    }

    /// Handle one operation type with a dedicated handler
    pub fn with_handler(mut self, operation: OperationType, handler: Arc<dyn OperationHandler>) -> Self {
        self.handlers.insert(operation, handler);
        self
    }

    /// Handler used for operation types without a dedicated one
    pub fn with_fallback(mut self, handler: Arc<dyn OperationHandler>) -> Self {
        self.fallback = Some(handler);
        self
    }

    pub fn handler_for(&self, operation: OperationType) -> Option<&Arc<dyn OperationHandler>> {
        self.handlers.get(&operation).or(self.fallback.as_ref())
    }

    /// Replay an entry; a missing handler is a permanent failure
    pub async fn dispatch(&self, entry: &SyncQueueEntry) -> Result<(), RemoteError> {
        match self.handler_for(entry.operation) {
            Some(handler) => handler.apply(entry).await,
            None => Err(RemoteError::Unsupported(entry.operation)),
        }
    }
}
