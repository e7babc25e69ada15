//! Authentication errors
//!
//! Every failure inside a strategy, transport errors included, surfaces as
//! this type so callers only ever see "authentication failed" plus a reason.

/// Errors from authentication strategies.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("authentication rejected ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("invalid token response: {0}")]
    MalformedResponse(String),

    #[error("token response has neither access_token nor token")]
    MissingToken,

    #[error("could not initiate oauth: {0}")]
    Initiate(String),

    #[error("authorization code not received: {0}")]
    CodeNotReceived(String),

    #[error("token extraction failed")]
    TokenExtraction,

    #[error("oauth flow failed: {0}")]
    Flow(String),

    #[error("invalid URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] session::Error),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
