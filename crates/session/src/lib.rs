//! HTTP session context for the WorshipTools client
//!
//! Outbound HTTP goes through the `Transport` trait so the authentication flow
//! and the API client can be driven by a scripted transport in tests. The
//! `HttpSession` wraps a transport with a cookie jar and follows redirects
//! itself, one hop at a time, so cookies set on intermediate hops of the
//! OAuth login flow are captured.
//!
//! Transports never follow redirects. `ReqwestTransport` is built with
//! `redirect::Policy::none()`; the session decides per request whether to
//! chase `Location` headers.

pub mod cookies;
pub mod error;
pub mod http;
pub mod reqwest_transport;
pub mod session;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use cookies::CookieJar;
pub use error::{Error, Result};
pub use http::{Body, FilePart, HttpRequest, HttpResponse, join_path};
pub use reqwest_transport::ReqwestTransport;
pub use session::{HttpSession, MAX_REDIRECTS, Redirects};

use std::future::Future;
use std::pin::Pin;

/// Sends a single HTTP request and returns the raw response.
///
/// Implementations must not follow redirects and must not manage cookies;
/// both belong to `HttpSession`. The returned `HttpResponse::url` is the URL
/// the request was sent to.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn Transport>`).
pub trait Transport: Send + Sync {
    fn send(
        &self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse>> + Send + '_>>;
}
