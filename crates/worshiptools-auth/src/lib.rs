//! WorshipTools authentication library
//!
//! Obtains bearer tokens for the WorshipTools API through one of two
//! strategies behind the `AuthStrategy` trait:
//!
//! 1. `DirectGrant` posts email and password to `{api}/auth/token`
//! 2. `BrowserOAuth2` replays the website login: initiate, follow redirects to
//!    the authorization server, submit the login form, chase the redirect
//!    chain to the authorization code, hit the callback, then read the token
//!    from a cookie (or scrape it from the landing page)
//!
//! Tokens live in the in-memory `CredentialStore`; the API client swaps them
//! atomically after each successful authentication.

pub mod browser;
pub mod constants;
pub mod credentials;
pub mod direct;
pub mod error;
pub mod extract;
pub mod strategy;

pub use browser::{BrowserEndpoints, BrowserOAuth2};
pub use constants::*;
pub use credentials::{CredentialStore, Credentials, IssuedToken};
pub use direct::DirectGrant;
pub use error::{Error, Result};
pub use strategy::{AuthMethod, AuthStrategy, build_strategy};
