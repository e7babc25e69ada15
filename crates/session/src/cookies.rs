//! Cookie jar for the simulated browser session
//!
//! A thin wrapper over `cookie_store::CookieStore`, which applies RFC 6265
//! domain, path and expiry rules. A cookie re-set with `Max-Age=0` or an
//! `Expires` date in the past removes the stored one.

use cookie_store::{CookieStore, RawCookie};
use reqwest::header::{HeaderMap, SET_COOKIE};
use tracing::debug;
use url::Url;

#[derive(Default)]
pub struct CookieJar {
    store: CookieStore,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record every `Set-Cookie` header of a response served from `url`.
    pub fn store_from_response(&mut self, url: &Url, headers: &HeaderMap) {
        let cookies: Vec<RawCookie<'static>> = headers
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|value| match value.to_str() {
                Ok(raw) => parse(url, raw),
                Err(_) => {
                    debug!(url = %url, "ignoring non-ASCII Set-Cookie header");
                    None
                }
            })
            .collect();
        if !cookies.is_empty() {
            debug!(url = %url, count = cookies.len(), "storing response cookies");
            self.store.store_response_cookies(cookies.into_iter(), url);
        }
    }

    /// Record a single `Set-Cookie` header value.
    pub fn store(&mut self, url: &Url, set_cookie: &str) {
        if let Some(cookie) = parse(url, set_cookie) {
            self.store
                .store_response_cookies(std::iter::once(cookie), url);
        }
    }

    /// `Cookie` request header value for `url`, or `None` if nothing applies.
    pub fn header_for(&self, url: &Url) -> Option<String> {
        let pairs: Vec<String> = self
            .store
            .get_request_values(url)
            .map(|(name, value)| format!("{name}={value}"))
            .collect();
        if pairs.is_empty() {
            None
        } else {
            Some(pairs.join("; "))
        }
    }

    /// Value of an unexpired cookie named `name`, on any domain or path.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.store
            .iter_unexpired()
            .find(|c| c.name() == name)
            .map(|c| c.value())
    }

    pub fn clear(&mut self) {
        self.store.clear();
    }

    pub fn len(&self) -> usize {
        self.store.iter_unexpired().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn parse(url: &Url, raw: &str) -> Option<RawCookie<'static>> {
    match RawCookie::parse(raw) {
        Ok(cookie) => Some(cookie.into_owned()),
        Err(e) => {
            debug!(url = %url, error = %e, "ignoring malformed Set-Cookie header");
            None
        }
    }
}
