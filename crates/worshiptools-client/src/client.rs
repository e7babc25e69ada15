//! Account-scoped API client with 401-triggered re-authentication

use std::sync::Arc;

use common::Secret;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderValue};
use serde_json::Value;
use session::{Body, FilePart, HttpRequest, HttpResponse, HttpSession, Redirects, join_path};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use url::Url;
use worshiptools_auth::{AuthStrategy, CredentialStore};

use crate::error::{Error, Result};

/// Payload of a POST. The first non-empty option wins: files, then JSON,
/// then plain form fields.
#[derive(Debug, Clone, Default)]
pub struct PostBody {
    pub files: Vec<FilePart>,
    /// Sent as multipart text fields alongside `files`, or form-encoded
    /// when there are no files and no JSON
    pub form: Vec<(String, String)>,
    pub json: Option<Value>,
}

impl PostBody {
    fn into_body(self) -> Body {
        if !self.files.is_empty() {
            Body::Multipart {
                fields: self.form,
                files: self.files,
            }
        } else if let Some(json) = self.json {
            Body::Json(json)
        } else {
            Body::Form(self.form)
        }
    }
}

/// Client for one WorshipTools account.
///
/// Shared by every route handler behind an `Arc`. Token reads and swaps go
/// through the `CredentialStore`; `auth_lock` keeps at most one
/// authentication attempt in flight.
pub struct ApiClient {
    base_url: Url,
    account_id: String,
    session: Arc<HttpSession>,
    strategy: Arc<dyn AuthStrategy>,
    credentials: CredentialStore,
    auth_lock: Mutex<()>,
}

impl ApiClient {
    /// Build a client and make sure it holds a token.
    ///
    /// A non-empty `seed` is used as-is and no authentication happens until
    /// the first 401. Without one the strategy runs immediately; its failure
    /// is returned and the caller is expected to treat it as fatal.
    pub async fn connect(
        base_url: &str,
        account_id: impl Into<String>,
        session: Arc<HttpSession>,
        strategy: Arc<dyn AuthStrategy>,
        seed: Option<Secret<String>>,
    ) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::InvalidRequest(format!("base URL {base_url:?}: {e}")))?;
        let client = Self {
            base_url,
            account_id: account_id.into(),
            session,
            strategy,
            credentials: CredentialStore::seeded(seed),
            auth_lock: Mutex::new(()),
        };

        if client.credentials.has_token().await {
            info!(
                account_id = %client.account_id,
                "using pre-issued token, skipping startup authentication"
            );
        } else {
            client.authenticate().await?;
        }
        Ok(client)
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    /// Whether a bearer token is currently held.
    pub async fn is_authenticated(&self) -> bool {
        self.credentials.has_token().await
    }

    /// GET `{base}/account/{id}/{endpoint}` with `params` as the query string.
    pub async fn get(&self, endpoint: &str, params: &[(String, String)]) -> Result<Value> {
        let request = HttpRequest::get(self.endpoint_url(endpoint)?).query(params);
        self.execute(endpoint, request).await
    }

    /// POST to `{base}/account/{id}/{endpoint}`.
    pub async fn post(&self, endpoint: &str, body: PostBody) -> Result<Value> {
        let body = body.into_body();
        let mut request = HttpRequest::post(self.endpoint_url(endpoint)?);
        if matches!(body, Body::Json(_)) {
            request = request.header(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        self.execute(endpoint, request.body(body)).await
    }

    fn endpoint_url(&self, endpoint: &str) -> Result<Url> {
        let path = format!(
            "account/{}/{}",
            self.account_id,
            endpoint.trim_start_matches('/')
        );
        join_path(&self.base_url, &path)
            .map_err(|e| Error::InvalidRequest(format!("endpoint {endpoint:?}: {e}")))
    }

    /// Send with the current token; on 401 re-authenticate and retry once.
    async fn execute(&self, endpoint: &str, request: HttpRequest) -> Result<Value> {
        let mut response = self.send_authorized(request.clone()).await?;

        if response.status == StatusCode::UNAUTHORIZED {
            warn!(endpoint, "bearer token rejected, re-authenticating");
            metrics::counter!("worshiptools_reauthentications_total").increment(1);
            self.authenticate().await?;
            response = self.send_authorized(request).await?;
        }

        if !response.status.is_success() {
            let status = response.status.as_u16();
            warn!(endpoint, status, "api request failed");
            metrics::counter!("worshiptools_api_errors_total", "status" => status.to_string())
                .increment(1);
            return Err(Error::Api {
                status,
                body: response.text(),
            });
        }

        debug!(endpoint, status = response.status.as_u16(), "api request succeeded");
        response.json().map_err(|e| Error::Decode(e.to_string()))
    }

    async fn send_authorized(&self, mut request: HttpRequest) -> Result<HttpResponse> {
        if let Some(token) = self.credentials.token().await {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| Error::InvalidRequest("bearer token is not a valid header".into()))?;
            value.set_sensitive(true);
            request.headers.insert(AUTHORIZATION, value);
        }
        request
            .headers
            .insert(ACCEPT, HeaderValue::from_static("application/json"));
        Ok(self
            .session
            .send_without_cookies(request, Redirects::Follow)
            .await?)
    }

    /// Run the strategy and swap in the new token pair.
    async fn authenticate(&self) -> Result<()> {
        let _guard = self.auth_lock.lock().await;
        let issued = self.strategy.authenticate(&self.session).await?;
        self.credentials.replace(issued).await;
        info!(strategy = self.strategy.name(), "bearer token refreshed");
        Ok(())
    }
}
