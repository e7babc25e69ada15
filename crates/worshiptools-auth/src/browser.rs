//! Browser-emulated OAuth2 authorization-code login
//!
//! Replays what a browser does when signing in on the website:
//!
//! 1. Clear cookies so every attempt starts from scratch
//! 2. GET the site login path; it must redirect to the authorization server
//! 3. Note the `state` parameter of that redirect
//! 4. Follow it to the login page, collecting cookies and hidden form fields
//! 5. POST the credentials with `Origin`/`Referer` set like a browser would
//! 6. Chase the resulting redirects by hand until a `code` parameter shows up
//! 7. GET that callback so the site backend exchanges the code
//! 8. Read the bearer token from the token cookie, or scrape a JWT from the page
//! 9. Pick up the refresh-token cookie if the site set one
//!
//! Continuity between steps lives in the session's cookie jar; the
//! `AuthFlow` record only exists for logging and the state cross-check.

use std::future::Future;
use std::pin::Pin;

use reqwest::header::{HeaderValue, ORIGIN, REFERER};
use serde::Deserialize;
use session::{Body, HttpRequest, HttpResponse, HttpSession, Redirects, join_path};
use tracing::{debug, info, warn};
use url::Url;

use crate::constants::{
    AUTH_URL, LOGIN_PATH, LOGIN_SUBMIT_PATH, MAX_CODE_HOPS, REFRESH_COOKIE, SITE_URL,
    TOKEN_COOKIE,
};
use crate::credentials::{Credentials, IssuedToken};
use crate::error::{Error, Result};
use crate::extract;
use crate::strategy::AuthStrategy;

/// Hosts, paths and cookie names of the website login.
///
/// Deserializes from the `[worshiptools.browser]` config table; every field
/// falls back to the production value.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserEndpoints {
    pub site_url: String,
    pub auth_url: String,
    pub login_path: String,
    pub login_submit_path: String,
    pub token_cookie: String,
    pub refresh_cookie: String,
}

impl Default for BrowserEndpoints {
    fn default() -> Self {
        Self {
            site_url: SITE_URL.to_string(),
            auth_url: AUTH_URL.to_string(),
            login_path: LOGIN_PATH.to_string(),
            login_submit_path: LOGIN_SUBMIT_PATH.to_string(),
            token_cookie: TOKEN_COOKIE.to_string(),
            refresh_cookie: REFRESH_COOKIE.to_string(),
        }
    }
}

/// Parsed, ready-to-use URLs derived from `BrowserEndpoints`.
struct ResolvedEndpoints {
    login_start: Url,
    login_submit: Url,
    auth_origin: HeaderValue,
}

impl ResolvedEndpoints {
    fn resolve(endpoints: &BrowserEndpoints) -> Result<Self> {
        let site = parse(&endpoints.site_url)?;
        let auth = parse(&endpoints.auth_url)?;
        let login_start = join_path(&site, &endpoints.login_path)
            .map_err(|e| invalid(&endpoints.login_path, e))?;
        let login_submit = join_path(&auth, &endpoints.login_submit_path)
            .map_err(|e| invalid(&endpoints.login_submit_path, e))?;
        let origin = auth.origin().ascii_serialization();
        let auth_origin = HeaderValue::from_str(&origin).map_err(|e| Error::InvalidUrl {
            url: origin.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            login_start,
            login_submit,
            auth_origin,
        })
    }
}

/// State of one login attempt. Never persisted.
#[derive(Debug, Default)]
struct AuthFlow {
    /// `state` from the initiating redirect
    state: Option<String>,
    /// Locations visited while chasing the post-login redirects
    redirect_chain: Vec<Url>,
    code: Option<String>,
    /// `state` that came back with the code
    callback_state: Option<String>,
}

/// Authorization-code login driven through the website, as a browser would.
pub struct BrowserOAuth2 {
    credentials: Credentials,
    endpoints: BrowserEndpoints,
    resolved: ResolvedEndpoints,
}

impl BrowserOAuth2 {
    /// Validates the endpoint URLs up front so a bad configuration fails at
    /// startup rather than on the first login.
    pub fn new(credentials: Credentials, endpoints: BrowserEndpoints) -> Result<Self> {
        let resolved = ResolvedEndpoints::resolve(&endpoints)?;
        Ok(Self {
            credentials,
            endpoints,
            resolved,
        })
    }

    async fn login(&self, session: &HttpSession) -> Result<IssuedToken> {
        session.clear_cookies();
        let mut flow = AuthFlow::default();

        // Initiate: the site must bounce us to the authorization server
        let start = session
            .send(
                HttpRequest::get(self.resolved.login_start.clone()),
                Redirects::Manual,
            )
            .await?;
        if !start.is_redirect() {
            return Err(Error::Initiate(format!(
                "login start returned {}",
                start.status
            )));
        }
        let authorize_url = start
            .location()?
            .ok_or_else(|| Error::Initiate("redirect without Location header".into()))?;
        flow.state = query_param(&authorize_url, "state");
        debug!(has_state = flow.state.is_some(), "oauth login initiated");

        // Land on the login page
        let login_page = session.send(HttpRequest::get(authorize_url), Redirects::Follow).await?;
        if !login_page.status.is_success() {
            return Err(Error::Flow(format!(
                "login page returned {}",
                login_page.status
            )));
        }

        // Submit credentials
        let referer = HeaderValue::from_str(login_page.url.as_str())
            .map_err(|e| Error::Flow(format!("login page URL not usable as Referer: {e}")))?;
        let submit = HttpRequest::post(self.resolved.login_submit.clone())
            .header(ORIGIN, self.resolved.auth_origin.clone())
            .header(REFERER, referer)
            .body(Body::Form(self.login_form(&login_page)));
        let submitted = session.send(submit, Redirects::Manual).await?;

        // Chase redirects to the authorization code
        let callback = chase_code(session, submitted, &mut flow).await?;
        if let (Some(sent), Some(received)) = (&flow.state, &flow.callback_state) {
            if sent != received {
                warn!("oauth state changed between initiation and callback");
            }
        }
        debug!(
            hops = flow.redirect_chain.len(),
            has_code = flow.code.is_some(),
            "authorization code received"
        );

        // Let the site backend exchange the code and set its cookies
        let landing = session.send(HttpRequest::get(callback), Redirects::Follow).await?;
        if !landing.status.is_success() {
            warn!(status = landing.status.as_u16(), "callback landed on a non-success page");
        }

        let access = session
            .cookie(&self.endpoints.token_cookie)
            .filter(|token| !token.is_empty())
            .or_else(|| {
                let scraped = extract::find_jwt(&landing.text()).map(str::to_owned);
                if scraped.is_some() {
                    debug!("token cookie absent, using JWT scraped from callback page");
                }
                scraped
            })
            .ok_or(Error::TokenExtraction)?;
        let refresh = session
            .cookie(&self.endpoints.refresh_cookie)
            .filter(|token| !token.is_empty());

        Ok(IssuedToken::new(access, refresh))
    }

    /// Hidden fields from the login page plus the credentials.
    fn login_form(&self, login_page: &HttpResponse) -> Vec<(String, String)> {
        let mut form: Vec<(String, String)> = extract::hidden_inputs(&login_page.text())
            .into_iter()
            .filter(|(name, _)| name != "email" && name != "password")
            .collect();
        form.push(("email".to_string(), self.credentials.email.clone()));
        form.push((
            "password".to_string(),
            self.credentials.password.expose().clone(),
        ));
        form
    }
}

impl AuthStrategy for BrowserOAuth2 {
    fn name(&self) -> &'static str {
        "browser"
    }

    fn authenticate<'a>(
        &'a self,
        session: &'a HttpSession,
    ) -> Pin<Box<dyn Future<Output = Result<IssuedToken>> + Send + 'a>> {
        Box::pin(async move {
            let issued = self.login(session).await?;
            info!(
                strategy = "browser",
                has_refresh = issued.refresh.is_some(),
                "authenticated through website login"
            );
            Ok(issued)
        })
    }
}

/// Follow redirects from the login POST until a location carries `code`.
///
/// At most `MAX_CODE_HOPS` follow-up GETs are issued. Returns the callback URL.
async fn chase_code(
    session: &HttpSession,
    submitted: HttpResponse,
    flow: &mut AuthFlow,
) -> Result<Url> {
    let mut current = submitted;
    let mut hops = 0;

    loop {
        let location = if current.is_redirect() {
            current.location()?
        } else {
            None
        };
        let Some(location) = location else {
            return Err(Error::CodeNotReceived(format!(
                "redirect chain stopped at {} after {hops} hops",
                current.status
            )));
        };

        flow.redirect_chain.push(location.clone());
        if let Some(code) = query_param(&location, "code") {
            flow.code = Some(code);
            flow.callback_state = query_param(&location, "state");
            return Ok(location);
        }

        if hops == MAX_CODE_HOPS {
            return Err(Error::CodeNotReceived(format!(
                "no code after {MAX_CODE_HOPS} hops"
            )));
        }
        hops += 1;
        debug!(hop = hops, location = %location, "following login redirect");
        current = session.send(HttpRequest::get(location), Redirects::Manual).await?;
    }
}

fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
}

fn parse(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| invalid(raw, e))
}

fn invalid(raw: &str, error: url::ParseError) -> Error {
    Error::InvalidUrl {
        url: raw.to_string(),
        reason: error.to_string(),
    }
}
