//! DigitalOcean client errors

use thiserror::Error;

/// Errors that can occur when interacting with the DigitalOcean API
#[derive(Debug, Error)]
pub enum ProviderError {
    /// HTTP request/response error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API returned a non-success status
    #[error("DigitalOcean API error ({status}): {message}")]
    Api {
        status: u16,
        message: String,
    },

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Authentication failed (missing, invalid or revoked token)
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// A tag expected to be unique matched more than one droplet
    #[error("tag {tag} matches {count} droplets, expected at most one")]
    AmbiguousTag {
        tag: String,
        count: usize,
    },

    /// Invalid request (e.g., missing required fields)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ProviderError {
    /// True when the error means the provider state itself needs attention
    /// rather than a transient failure talking to it.
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, ProviderError::AmbiguousTag { .. })
    }
}
