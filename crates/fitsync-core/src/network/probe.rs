//! Active reachability probe
//!
//! The probe is cheap and side-effect free: a HEAD request against the
//! API health endpoint. The monitor bounds it with its own timeout, so an
//! implementation only has to report success or failure.

use futures_util::future::BoxFuture;
use thiserror::Error;

/// Why a probe did not succeed
#[derive(Debug, Error)]
pub enum ProbeError {
    /// Request never got a response (DNS, refused, reset, ...)
    #[error("probe request failed: {0}")]
    Network(String),
    /// Server answered with a non-2xx status
    #[error("probe returned HTTP {0}")]
    Status(u16),
    /// Probe did not finish within the monitor's timeout
    #[error("probe timed out")]
    Timeout,
}

/// Server reachability check
pub trait Probe: Send + Sync {
    fn check(&self) -> BoxFuture<'_, Result<(), ProbeError>>;
}

/// HEAD request against the health endpoint
pub struct HttpProbe {
    client: reqwest::Client,
    url: String,
}

impl HttpProbe {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Probe for HttpProbe {
    fn check(&self) -> BoxFuture<'_, Result<(), ProbeError>> {
        Box::pin(async move {
            let response = self
                .client
                .head(&self.url)
                .header(reqwest::header::CACHE_CONTROL, "no-cache")
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        ProbeError::Timeout
                    } else {
                        ProbeError::Network(e.to_string())
                    }
                })?;

            let status = response.status();
            if status.is_success() {
                Ok(())
            } else {
                Err(ProbeError::Status(status.as_u16()))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_http_probe_unreachable_host() {
        // Port 9 on loopback is the discard service; nothing listens there in CI
        let probe = HttpProbe::new(reqwest::Client::new(), "http://127.0.0.1:9/api/health");
        assert_eq!(probe.url(), "http://127.0.0.1:9/api/health");

        let result = probe.check().await;
        assert!(matches!(result, Err(ProbeError::Network(_))));
    }

    #[test]
    fn test_probe_error_display() {
        assert_eq!(ProbeError::Status(503).to_string(), "probe returned HTTP 503");
        assert_eq!(ProbeError::Timeout.to_string(), "probe timed out");
    }
}
