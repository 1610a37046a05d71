//! Error taxonomy for the generation client.
//!
//! Three hard failure modes, none of which the run controller retries:
//! a missing credential (caught before any network I/O), a backend that
//! responded with a non-success status, and a transport-level failure
//! with no response at all. Length mismatch is not an error; it lives
//! entirely inside the retry policy.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// No API key configured. Checked before any network call.
    #[error("API key is missing")]
    Auth,

    /// The backend completed the exchange with a failure status. The
    /// message comes from the structured error body when parseable,
    /// otherwise the raw response body.
    #[error("backend error (HTTP {status}): {message}")]
    Backend { status: u16, message: String },

    /// Network-level failure: no response from the backend.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl GatewayError {
    /// Short code for logging.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::Auth => "auth_error",
            GatewayError::Backend { .. } => "backend_error",
            GatewayError::Transport(_) => "transport_error",
        }
    }

    /// HTTP status, when the backend produced one.
    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::Backend { status, .. } => Some(*status),
            _ => None,
        }
    }
}
