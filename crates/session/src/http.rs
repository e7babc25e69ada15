//! Request and response values passed through a `Transport`
//!
//! Both types own their data (`Bytes` bodies, cloned header maps) so a request
//! can be replayed on a redirect hop or a 401 retry without re-reading a stream.

use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, LOCATION};
use reqwest::{Method, StatusCode};
use tracing::warn;
use url::Url;

use crate::error::{Error, Result};

/// Append `path` to `base`, keeping every segment of `base`.
///
/// `Url::join` would drop the last segment of `https://api.worship.tools/v1`;
/// this treats the base as a directory.
pub fn join_path(base: &Url, path: &str) -> std::result::Result<Url, url::ParseError> {
    Url::parse(&format!(
        "{}/{}",
        base.as_str().trim_end_matches('/'),
        path.trim_start_matches('/')
    ))
}

/// One file in a multipart upload.
#[derive(Debug, Clone)]
pub struct FilePart {
    /// Multipart field name, e.g. `file` or `files[]`
    pub field: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// Request payload.
///
/// `Multipart` carries its text fields alongside the files; the transport
/// generates the boundary and the `Content-Type` header.
#[derive(Debug, Clone, Default)]
pub enum Body {
    #[default]
    Empty,
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
    Multipart {
        fields: Vec<(String, String)>,
        files: Vec<FilePart>,
    },
}

impl Body {
    /// Short label for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Body::Empty => "empty",
            Body::Json(_) => "json",
            Body::Form(_) => "form",
            Body::Multipart { .. } => "multipart",
        }
    }
}

/// An outbound HTTP request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Body,
}

impl HttpRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: Body::Empty,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: Url) -> Self {
        Self::new(Method::POST, url)
    }

    /// Set a header, replacing any existing value.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    /// Append query parameters to the URL, keeping any already present.
    pub fn query(mut self, params: &[(String, String)]) -> Self {
        if !params.is_empty() {
            self.url
                .query_pairs_mut()
                .extend_pairs(params.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }
        self
    }
}

/// A fully-read HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    /// URL this response was served from (the request URL for a single hop,
    /// the last hop's URL after redirect following)
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: StatusCode, url: Url) -> Self {
        Self {
            status,
            url,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Append a header value. Invalid names or values are skipped with a warning.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => warn!(header = name, "skipping invalid response header"),
        }
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// 301, 302, 303, 307 or 308.
    pub fn is_redirect(&self) -> bool {
        matches!(
            self.status,
            StatusCode::MOVED_PERMANENTLY
                | StatusCode::FOUND
                | StatusCode::SEE_OTHER
                | StatusCode::TEMPORARY_REDIRECT
                | StatusCode::PERMANENT_REDIRECT
        )
    }

    /// The `Location` header resolved against this response's URL.
    ///
    /// Returns `Ok(None)` when there is no `Location` header.
    pub fn location(&self) -> Result<Option<Url>> {
        let Some(raw) = self.headers.get(LOCATION) else {
            return Ok(None);
        };
        let raw = raw.to_str().map_err(|e| Error::InvalidRedirect {
            location: String::from_utf8_lossy(raw.as_bytes()).into_owned(),
            reason: e.to_string(),
        })?;
        self.url
            .join(raw)
            .map(Some)
            .map_err(|e| Error::InvalidRedirect {
                location: raw.to_string(),
                reason: e.to_string(),
            })
    }

    /// Body as text, replacing invalid UTF-8.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Body decoded as JSON. An empty body decodes to `Value::Null`.
    pub fn json(&self) -> Result<serde_json::Value> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(serde_json::Value::Null);
        }
        serde_json::from_slice(&self.body).map_err(|e| Error::Decode(e.to_string()))
    }
}
