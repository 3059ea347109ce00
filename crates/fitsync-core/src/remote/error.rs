//! Remote call failures, classified by how the queue must react

use reqwest::StatusCode;
use thiserror::Error;

use crate::queue::OperationType;

#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    /// Connection could not be established; connectivity is gone
    #[error("server unreachable: {0}")]
    Offline(String),

    /// Timeout or server-side trouble; worth retrying with backoff
    #[error("temporary failure: {0}")]
    Transient(String),

    /// Server refused the operation for reasons unrelated to connectivity
    #[error("rejected by server (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },

    /// Payload lacks what the operation needs
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("no handler registered for '{0}'")]
    Unsupported(OperationType),
}

impl RemoteError {
    /// Loss of connectivity, as opposed to a failure of this operation
    pub fn is_connectivity(&self) -> bool {
        matches!(self, RemoteError::Offline(_))
    }

    /// Retrying cannot help
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            RemoteError::Rejected { .. } | RemoteError::InvalidPayload(_) | RemoteError::Unsupported(_)
        )
    }

    /// Classify a transport error from reqwest
    pub fn from_transport(error: &reqwest::Error) -> Self {
        if error.is_connect() {
            RemoteError::Offline(error.to_string())
        } else if error.is_builder() {
            RemoteError::InvalidPayload(error.to_string())
        } else {
            RemoteError::Transient(error.to_string())
        }
    }

    /// Classify a non-2xx response
    pub fn from_status(status: StatusCode, body: String) -> Self {
        let retryable = status.is_server_error()
            || status == StatusCode::REQUEST_TIMEOUT
            || status == StatusCode::TOO_MANY_REQUESTS;
        if retryable {
            RemoteError::Transient(format!("HTTP {}", status.as_u16()))
        } else {
            RemoteError::Rejected {
                status: status.as_u16(),
                message: body,
            }
        }
    }
}
