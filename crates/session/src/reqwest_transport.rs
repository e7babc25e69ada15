//! `Transport` backed by a shared `reqwest::Client`

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use reqwest::multipart::{Form, Part};

use crate::error::{Error, Result};
use crate::http::{Body, FilePart, HttpRequest, HttpResponse};
use crate::Transport;

/// Browser-like User-Agent; the login pages reject obvious bot agents.
const USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) worship-relay/0.1";

/// Production transport. Redirects are disabled on the client; `HttpSession`
/// follows them so it can record cookies on every hop.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Build a client with a total request timeout and a connect timeout.
    pub fn new(timeout: Duration, connect_timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::Client(e.to_string()))?;
        Ok(Self { client })
    }
}

impl Transport for ReqwestTransport {
    fn send(
        &self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse>> + Send + '_>> {
        Box::pin(async move {
            let target = request.url.to_string();
            let builder = self
                .client
                .request(request.method, request.url)
                .headers(request.headers);

            let builder = match request.body {
                Body::Empty => builder,
                Body::Json(value) => builder.json(&value),
                Body::Form(pairs) => builder.form(&pairs),
                Body::Multipart { fields, files } => builder.multipart(multipart(fields, files)?),
            };

            let response = builder.send().await.map_err(|e| classify(e, &target))?;
            let status = response.status();
            let url = response.url().clone();
            let headers = response.headers().clone();
            let body = response.bytes().await.map_err(|e| classify(e, &target))?;

            Ok(HttpResponse {
                status,
                url,
                headers,
                body,
            })
        })
    }
}

fn multipart(fields: Vec<(String, String)>, files: Vec<FilePart>) -> Result<Form> {
    let mut form = Form::new();
    for (name, value) in fields {
        form = form.text(name, value);
    }
    for file in files {
        let mut part = Part::bytes(file.data.to_vec());
        if let Some(file_name) = file.file_name {
            part = part.file_name(file_name);
        }
        if let Some(content_type) = file.content_type {
            part = part
                .mime_str(&content_type)
                .map_err(|e| Error::Request(format!("invalid content type {content_type:?}: {e}")))?;
        }
        form = form.part(file.field, part);
    }
    Ok(form)
}

fn classify(error: reqwest::Error, url: &str) -> Error {
    if error.is_timeout() {
        Error::Timeout {
            url: url.to_string(),
        }
    } else if error.is_connect() {
        Error::Connect {
            url: url.to_string(),
            reason: error.to_string(),
        }
    } else {
        Error::Request(error.to_string())
    }
}
