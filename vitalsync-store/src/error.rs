//! Error types for store and identity clients.

use thiserror::Error;

/// Errors that can occur when talking to the remote store or the identity
/// provider.
#[derive(Debug, Error)]
pub enum StoreError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Failed to parse response.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// Authentication failed or the store's access rules rejected the request.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Connection failed.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Timeout waiting for response.
    #[error("Request timed out")]
    Timeout,

    /// The store closed a subscription.
    #[error("Subscription cancelled: {0}")]
    Cancelled(String),
}

#[cfg(feature = "rtdb")]
impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            StoreError::Timeout
        } else if err.is_connect() {
            StoreError::Connection(err.to_string())
        } else if err.is_decode() {
            StoreError::Parse(err.to_string())
        } else {
            StoreError::Http(err.to_string())
        }
    }
}
