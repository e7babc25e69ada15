//! Error types for API client operations

/// Errors surfaced by `ApiClient`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Token acquisition failed, at construction or during a 401 retry
    #[error("authentication failed: {0}")]
    Authentication(#[from] worshiptools_auth::Error),

    /// Upstream answered with a non-2xx status
    #[error("api error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(#[from] session::Error),

    #[error("response is not valid JSON: {0}")]
    Decode(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl Error {
    /// Upstream status for `Api` errors.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result alias for API client operations.
pub type Result<T> = std::result::Result<T, Error>;
