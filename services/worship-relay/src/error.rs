//! Service-specific error types
//!
//! Startup failures go through `anyhow` in `main`; everything a route
//! handler can hit is one of these and becomes a 500 (or 400) JSON envelope.

use axum::http::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("cache I/O failed: {0}")]
    CacheIo(#[from] std::io::Error),

    #[error("cache document is not valid YAML: {0}")]
    CacheFormat(#[from] serde_yaml::Error),

    #[error("cache path {0} has no parent directory")]
    CachePath(String),

    #[error(transparent)]
    Upstream(#[from] worshiptools_client::Error),

    #[error("{0}")]
    BadRequest(String),
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Error::BadRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Result alias using service Error
pub type Result<T> = std::result::Result<T, Error>;
