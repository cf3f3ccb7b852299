//! NMAgent client errors

use thiserror::Error;

/// Errors that can occur when talking to NMAgent
#[derive(Debug, Error)]
pub enum NmAgentError {
    /// HTTP request/response error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// NMAgent answered with a non-success status
    #[error("NMAgent returned status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The call did not complete within the per-call timeout
    #[error("NMAgent call timed out after {0:?}")]
    Timeout(std::time::Duration),
}
