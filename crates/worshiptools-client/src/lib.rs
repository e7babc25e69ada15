//! Authenticated WorshipTools API client
//!
//! `ApiClient` wraps GET and POST against `{base}/account/{account_id}/...`
//! with bearer authentication:
//!
//! 1. A token is obtained eagerly at construction (or seeded from config)
//! 2. Every request carries `Authorization: Bearer <token>`
//! 3. A 401 triggers one re-authentication through the configured
//!    `AuthStrategy`, the stored token is swapped, the request retried once
//! 4. Anything else outside 2xx is returned as `Error::Api`

pub mod client;
pub mod error;

pub use client::{ApiClient, PostBody};
pub use error::{Error, Result};
