//! Authentication strategy abstraction

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Deserialize;
use session::HttpSession;
use url::Url;

use crate::browser::{BrowserEndpoints, BrowserOAuth2};
use crate::credentials::{Credentials, IssuedToken};
use crate::direct::DirectGrant;
use crate::error::{Error, Result};

/// A way of obtaining a fresh bearer token.
///
/// Strategies run against the shared `HttpSession` so any cookies they set
/// stay available to later API calls. Each call is a complete, independent
/// attempt; running it twice is harmless.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility (`Arc<dyn AuthStrategy>`).
pub trait AuthStrategy: Send + Sync {
    /// Identifier for logging (e.g. "direct", "browser")
    fn name(&self) -> &'static str;

    fn authenticate<'a>(
        &'a self,
        session: &'a HttpSession,
    ) -> Pin<Box<dyn Future<Output = Result<IssuedToken>> + Send + 'a>>;
}

/// Strategy selector used by configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    #[default]
    Direct,
    Browser,
}

impl std::str::FromStr for AuthMethod {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" => Ok(AuthMethod::Direct),
            "browser" => Ok(AuthMethod::Browser),
            other => Err(format!(
                "unknown auth strategy {other:?} (expected \"direct\" or \"browser\")"
            )),
        }
    }
}

/// Build the configured strategy.
pub fn build_strategy(
    method: AuthMethod,
    credentials: Credentials,
    api_base_url: &str,
    endpoints: BrowserEndpoints,
) -> Result<Arc<dyn AuthStrategy>> {
    match method {
        AuthMethod::Direct => {
            let base = Url::parse(api_base_url).map_err(|e| Error::InvalidUrl {
                url: api_base_url.to_string(),
                reason: e.to_string(),
            })?;
            Ok(Arc::new(DirectGrant::new(credentials, &base)?))
        }
        AuthMethod::Browser => Ok(Arc::new(BrowserOAuth2::new(credentials, endpoints)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Secret;

    fn credentials() -> Credentials {
        Credentials {
            email: "leader@example.org".into(),
            password: Secret::new("pw".to_string()),
            account_id: "acct-1".into(),
        }
    }

    #[test]
    fn parses_method_names() {
        assert_eq!("direct".parse::<AuthMethod>(), Ok(AuthMethod::Direct));
        assert_eq!(" Browser ".parse::<AuthMethod>(), Ok(AuthMethod::Browser));
        assert!("saml".parse::<AuthMethod>().is_err());
    }

    #[test]
    fn builds_the_selected_strategy() {
        let direct = build_strategy(
            AuthMethod::Direct,
            credentials(),
            crate::API_BASE_URL,
            BrowserEndpoints::default(),
        )
        .unwrap();
        assert_eq!(direct.name(), "direct");

        let browser = build_strategy(
            AuthMethod::Browser,
            credentials(),
            crate::API_BASE_URL,
            BrowserEndpoints::default(),
        )
        .unwrap();
        assert_eq!(browser.name(), "browser");
    }

    #[test]
    fn rejects_unparseable_base_url() {
        let result = build_strategy(
            AuthMethod::Direct,
            credentials(),
            "not a url",
            BrowserEndpoints::default(),
        );
        assert!(matches!(result, Err(Error::InvalidUrl { .. })));
    }
}
