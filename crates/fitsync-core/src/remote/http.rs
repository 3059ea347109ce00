//! HTTP handler for the coaching API

use futures_util::future::BoxFuture;
use tracing::debug;

use super::error::RemoteError;
use super::routes::route_for;
use super::OperationHandler;
use crate::config::{join_url, Config};
use crate::network::HttpProbe;
use crate::queue::SyncQueueEntry;

/// Header carrying the entry id so the server can drop replays
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Replays queue entries against the REST API
#[derive(Clone)]
pub struct HttpRemote {
    client: reqwest::Client,
    base_url: String,
}

impl HttpRemote {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }

    /// Build a client with the configured request timeout
    pub fn from_config(config: &Config) -> Result<Self, RemoteError> {
        let client = reqwest::Client::builder()
            .timeout(config.queue.request_timeout())
            .build()
            .map_err(|e| RemoteError::InvalidPayload(format!("cannot build HTTP client: {}", e)))?;
        Ok(Self::new(client, config.api_url.clone()))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Reachability probe sharing this client's connection pool
    pub fn probe(&self, health_path: &str) -> HttpProbe {
        HttpProbe::new(self.client.clone(), join_url(&self.base_url, health_path))
    }

    async fn send(&self, entry: &SyncQueueEntry) -> Result<(), RemoteError> {
        let route = route_for(entry.operation, &entry.payload)?;
        let url = join_url(&self.base_url, &route.path);

        debug!(
            id = %entry.id,
            operation = %entry.operation,
            method = %route.method,
            url = %url,
            "Replaying queued operation"
        );

        let mut request = self
            .client
            .request(route.method, &url)
            .header(IDEMPOTENCY_HEADER, entry.id.to_string());
        if !route.query.is_empty() {
            request = request.query(&route.query);
        }
        if let Some(body) = &route.body {
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RemoteError::from_transport(&e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(RemoteError::from_status(status, body))
    }
}

impl OperationHandler for HttpRemote {
    fn apply<'a>(&'a self, entry: &'a SyncQueueEntry) -> BoxFuture<'a, Result<(), RemoteError>> {
        Box::pin(self.send(entry))
    }
}
