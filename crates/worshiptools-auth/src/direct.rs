//! Direct password grant against the API token endpoint

use std::future::Future;
use std::pin::Pin;

use reqwest::header::{CONTENT_TYPE, HeaderValue};
use session::{Body, HttpRequest, HttpSession, Redirects, join_path};
use tracing::{debug, info};
use url::Url;

use crate::constants::TOKEN_PATH;
use crate::credentials::{Credentials, IssuedToken};
use crate::error::{Error, Result};
use crate::extract;
use crate::strategy::AuthStrategy;

/// POSTs `{email, password}` as JSON to `{api}/auth/token`.
pub struct DirectGrant {
    credentials: Credentials,
    token_url: Url,
}

impl DirectGrant {
    pub fn new(credentials: Credentials, api_base: &Url) -> Result<Self> {
        let token_url = join_path(api_base, TOKEN_PATH).map_err(|e| Error::InvalidUrl {
            url: api_base.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            credentials,
            token_url,
        })
    }

    pub fn token_url(&self) -> &Url {
        &self.token_url
    }

    async fn exchange(&self, session: &HttpSession) -> Result<IssuedToken> {
        let payload = serde_json::json!({
            "email": self.credentials.email,
            "password": self.credentials.password.expose_str(),
        });
        let request = HttpRequest::post(self.token_url.clone())
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .body(Body::Json(payload));

        let response = session.send(request, Redirects::Follow).await?;

        let status = response.status;
        if !status.is_success() {
            return Err(Error::Rejected {
                status: status.as_u16(),
                body: response.text(),
            });
        }

        let body = response
            .json()
            .map_err(|e| Error::MalformedResponse(e.to_string()))?;
        if !body.is_object() {
            return Err(Error::MalformedResponse(
                "expected a JSON object".to_string(),
            ));
        }

        let access = extract::token_from_json(&body).ok_or(Error::MissingToken)?;
        let refresh = extract::refresh_from_json(&body);
        debug!(has_refresh = refresh.is_some(), "token endpoint issued token");
        Ok(IssuedToken::new(access, refresh))
    }
}

impl AuthStrategy for DirectGrant {
    fn name(&self) -> &'static str {
        "direct"
    }

    fn authenticate<'a>(
        &'a self,
        session: &'a HttpSession,
    ) -> Pin<Box<dyn Future<Output = Result<IssuedToken>> + Send + 'a>> {
        Box::pin(async move {
            let issued = self.exchange(session).await?;
            info!(strategy = "direct", "authenticated with password grant");
            Ok(issued)
        })
    }
}
