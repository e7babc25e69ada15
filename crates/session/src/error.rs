//! Transport-level errors (network failures, not HTTP status codes)

/// Errors from sending requests through a transport or session.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("connection to {url} failed: {reason}")]
    Connect { url: String, reason: String },

    #[error("HTTP request failed: {0}")]
    Request(String),

    #[error("too many redirects (limit {limit}) starting from {url}")]
    TooManyRedirects { limit: usize, url: String },

    #[error("invalid redirect location {location:?}: {reason}")]
    InvalidRedirect { location: String, reason: String },

    #[error("invalid response body: {0}")]
    Decode(String),

    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

/// Result alias for transport operations.
pub type Result<T> = std::result::Result<T, Error>;
