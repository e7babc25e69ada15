//! Cookie-carrying HTTP session with manual redirect following

use std::sync::{Arc, Mutex, MutexGuard};

use reqwest::Method;
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, COOKIE, HeaderValue};
use reqwest::StatusCode;
use tracing::{debug, warn};
use url::Url;

use crate::cookies::CookieJar;
use crate::error::{Error, Result};
use crate::http::{Body, HttpRequest, HttpResponse};
use crate::Transport;

/// Maximum redirects followed by a single `Redirects::Follow` send.
pub const MAX_REDIRECTS: usize = 10;

/// Whether `HttpSession::send` chases `Location` headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Redirects {
    Follow,
    Manual,
}

/// Persistent cookie and connection state. The login flow reads and writes
/// the jar; API calls share the transport but go through
/// `send_without_cookies`.
///
/// The jar lock is only held between awaits, never across one.
pub struct HttpSession {
    transport: Arc<dyn Transport>,
    jar: Mutex<CookieJar>,
}

impl HttpSession {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            jar: Mutex::new(CookieJar::new()),
        }
    }

    /// Drop every cookie. Called at the start of each browser login attempt.
    pub fn clear_cookies(&self) {
        self.jar().clear();
    }

    /// Current value of the cookie named `name`, on any domain.
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.jar().get(name).map(str::to_owned)
    }

    pub fn cookie_count(&self) -> usize {
        self.jar().len()
    }

    /// Send a request, attaching and recording cookies.
    ///
    /// With `Redirects::Follow`, up to `MAX_REDIRECTS` hops are followed and
    /// the final response is returned; its `url` is the last hop's URL.
    /// 301/302/303 turn the request into a bodyless GET, 307/308 replay it
    /// unchanged. `Authorization` is dropped when a hop changes host.
    pub async fn send(&self, request: HttpRequest, redirects: Redirects) -> Result<HttpResponse> {
        self.dispatch(request, redirects, true).await
    }

    /// Send a request without touching the jar: no `Cookie` header is
    /// attached and `Set-Cookie` on any hop is discarded.
    ///
    /// API calls go through here so only the login flow changes the jar.
    pub async fn send_without_cookies(
        &self,
        request: HttpRequest,
        redirects: Redirects,
    ) -> Result<HttpResponse> {
        self.dispatch(request, redirects, false).await
    }

    async fn dispatch(
        &self,
        request: HttpRequest,
        redirects: Redirects,
        use_jar: bool,
    ) -> Result<HttpResponse> {
        let origin = request.url.to_string();
        let mut request = request;
        let mut hops = 0;

        loop {
            let response = self.send_once(request.clone(), use_jar).await?;
            if redirects == Redirects::Manual || !response.is_redirect() {
                return Ok(response);
            }
            let Some(next) = response.location()? else {
                return Ok(response);
            };
            if hops == MAX_REDIRECTS {
                return Err(Error::TooManyRedirects {
                    limit: MAX_REDIRECTS,
                    url: origin,
                });
            }
            hops += 1;
            debug!(hop = hops, status = response.status.as_u16(), location = %next, "following redirect");
            request = redirected(request, response.status, next);
        }
    }

    async fn send_once(&self, mut request: HttpRequest, use_jar: bool) -> Result<HttpResponse> {
        request.headers.remove(COOKIE);
        if !use_jar {
            return self.transport.send(request).await;
        }
        let cookie_header = self.jar().header_for(&request.url);
        if let Some(cookies) = cookie_header {
            match HeaderValue::from_str(&cookies) {
                Ok(value) => {
                    request.headers.insert(COOKIE, value);
                }
                Err(e) => warn!(url = %request.url, error = %e, "cookie header not representable, sending without cookies"),
            }
        }

        let response = self.transport.send(request).await?;
        self.jar()
            .store_from_response(&response.url, &response.headers);
        Ok(response)
    }

    fn jar(&self) -> MutexGuard<'_, CookieJar> {
        self.jar.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn redirected(mut request: HttpRequest, status: StatusCode, next: Url) -> HttpRequest {
    let rewrite_to_get = matches!(
        status,
        StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND | StatusCode::SEE_OTHER
    ) && request.method != Method::GET
        && request.method != Method::HEAD;

    if rewrite_to_get {
        request.method = Method::GET;
        request.body = Body::Empty;
        request.headers.remove(CONTENT_TYPE);
        request.headers.remove(CONTENT_LENGTH);
    }
    if request.url.host_str() != next.host_str() {
        request.headers.remove(AUTHORIZATION);
    }
    request.url = next;
    request
}
