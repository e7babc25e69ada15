//! Scripted fake transport for driving sessions and login flows in tests

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;

use reqwest::{Method, StatusCode};
use url::Url;

use crate::error::Result;
use crate::http::{HttpRequest, HttpResponse};
use crate::Transport;

/// Placeholder URL for scripted responses; replaced by the request URL on send.
const SCRIPTED_URL: &str = "http://scripted.invalid/";

/// Transport that answers from per-route response queues and records every
/// request it receives.
///
/// Routes are keyed by method and URL without query string or fragment.
/// Each route's queue is consumed front to back; the last response repeats
/// forever. Unscripted routes answer 404.
#[derive(Default)]
pub struct ScriptedTransport {
    routes: Mutex<HashMap<(Method, String), VecDeque<HttpResponse>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `response` for `method url`.
    pub fn on(&self, method: Method, url: &str, response: HttpResponse) -> &Self {
        let url = Url::parse(url).expect("scripted route must be an absolute URL");
        self.routes
            .lock()
            .unwrap()
            .entry((method, route_key(&url)))
            .or_default()
            .push_back(response);
        self
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of requests received for `method url` (query ignored).
    pub fn count(&self, method: Method, url: &str) -> usize {
        let url = Url::parse(url).expect("scripted route must be an absolute URL");
        let key = route_key(&url);
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == method && route_key(&r.url) == key)
            .count()
    }

    fn next_response(&self, request: &HttpRequest) -> HttpResponse {
        let mut routes = self.routes.lock().unwrap();
        let queued = routes
            .get_mut(&(request.method.clone(), route_key(&request.url)))
            .and_then(|queue| {
                if queue.len() > 1 {
                    queue.pop_front()
                } else {
                    queue.front().cloned()
                }
            });
        let mut scripted = queued.unwrap_or_else(|| {
            response(404).with_body(format!(
                "no scripted response for {} {}",
                request.method, request.url
            ))
        });
        scripted.url = request.url.clone();
        scripted
    }
}

impl Transport for ScriptedTransport {
    fn send(
        &self,
        request: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse>> + Send + '_>> {
        let response = self.next_response(&request);
        self.requests.lock().unwrap().push(request);
        Box::pin(async move { Ok(response) })
    }
}

/// Response with the given status and no headers or body.
pub fn response(status: u16) -> HttpResponse {
    HttpResponse::new(
        StatusCode::from_u16(status).expect("valid status code"),
        Url::parse(SCRIPTED_URL).expect("placeholder URL parses"),
    )
}

/// Redirect response pointing at `location` (absolute or relative).
pub fn redirect(status: u16, location: &str) -> HttpResponse {
    response(status).with_header("location", location)
}

/// Response with a JSON body.
pub fn json(status: u16, body: serde_json::Value) -> HttpResponse {
    response(status)
        .with_header("content-type", "application/json")
        .with_body(body.to_string())
}

fn route_key(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.set_fragment(None);
    url.to_string()
}
