//! Error types for deskwire-core

use thiserror::Error;

/// Main error type for the deskwire-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Ticket not found (cache miss or the service returned 404)
    #[error("ticket not found: {0}")]
    NotFound(String),

    /// Operation requires an authenticated session
    #[error("not authenticated: {0}")]
    Unauthenticated(String),

    /// Request to the backing service failed (network, 5xx, timeout)
    #[error("transport error: {0}")]
    Transport(String),

    /// Push channel is unavailable for the requested operation
    #[error("channel error: {0}")]
    Channel(String),

    /// Pushed frame could not be decoded into a known event
    #[error("malformed event: {0}")]
    MalformedEvent(String),

    /// Query parameters are out of range
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Local snapshot storage error
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding/decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for deskwire-core
pub type Result<T> = std::result::Result<T, Error>;
