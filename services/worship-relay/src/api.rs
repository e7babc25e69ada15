//! `/api` route handlers
//!
//! Every response is a JSON envelope with `success` and either the payload
//! or `error`. Failures are logged with the request id and mapped through
//! `Error::status` (400 for bad uploads, 500 for everything else).

use std::time::Instant;

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderName, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde_json::{Value, json};
use session::FilePart;
use tracing::{debug, error, info, warn};
use worshiptools_client::PostBody;

use crate::AppState;
use crate::error::{Error, Result};
use crate::metrics;
use crate::services::detect_new_services;

/// Upper bound on an upload request body
pub const MAX_UPLOAD_BYTES: usize = 64 * 1024 * 1024;

/// Upstream listing endpoint
const SERVICE_ENDPOINT: &str = "service";

/// Upstream upload endpoint
const FILES_ENDPOINT: &str = "files";

/// Optional text fields forwarded with a single `file` upload
const SINGLE_FILE_FIELDS: &[&str] = &["stream", "description", "category1", "category2"];

/// Optional list fields forwarded with `files[]` uploads
const MULTI_FILE_FIELDS: &[&str] = &["stream[]", "description[]", "category1[]", "category2[]"];

/// GET /api/new-services: tracked services not reported before.
pub async fn new_services(State(state): State<AppState>) -> Response {
    let started = Instant::now();
    let result = list_new_services(&state).await;
    respond("new_services", started, result)
}

/// GET /api/debug-services: raw upstream listing, for inspecting its shape.
pub async fn debug_services(State(state): State<AppState>) -> Response {
    let started = Instant::now();
    let result = describe_listing(&state).await;
    respond("debug_services", started, result)
}

/// POST /api/upload-files: forward `file` or `files[]` parts upstream.
pub async fn upload_files(
    State(state): State<AppState>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Response {
    let started = Instant::now();
    let result = match multipart {
        Ok(multipart) => forward_upload(&state, multipart).await,
        Err(e) => {
            debug!(error = %e, "upload is not a multipart request");
            Err(Error::BadRequest("No files provided".into()))
        }
    };
    respond("upload_files", started, result)
}

async fn list_new_services(state: &AppState) -> Result<Value> {
    let listing = state
        .client
        .get(SERVICE_ENDPOINT, &listing_params(50))
        .await?;
    let services = detect_new_services(&state.cache, &listing).await?;
    Ok(json!({
        "success": true,
        "count": services.len(),
        "services": services,
    }))
}

async fn describe_listing(state: &AppState) -> Result<Value> {
    let listing = state
        .client
        .get(SERVICE_ENDPOINT, &listing_params(10))
        .await?;
    let keys = listing
        .as_object()
        .map(|object| object.keys().cloned().collect::<Vec<_>>());
    Ok(json!({
        "success": true,
        "response_type": json_type(&listing),
        "keys": keys,
        "raw_response": listing,
    }))
}

async fn forward_upload(state: &AppState, multipart: Multipart) -> Result<Value> {
    let upload = read_upload(multipart).await?.into_post_body()?;
    info!(files = upload.files.len(), "forwarding upload");
    let response = state.client.post(FILES_ENDPOINT, upload).await?;
    Ok(json!({"success": true, "response": response}))
}

/// Query for the upcoming-services listing.
fn listing_params(rows: u32) -> Vec<(String, String)> {
    let today = chrono::Local::now().format("%Y-%m-%d").to_string();
    vec![
        ("past".into(), "hidden".into()),
        ("today".into(), today),
        ("sort".into(), "times_ss asc".into()),
        ("rows".into(), rows.to_string()),
        ("start".into(), "0".into()),
    ]
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Parts of an inbound upload, in arrival order.
#[derive(Debug, Default)]
struct Upload {
    files: Vec<FilePart>,
    fields: Vec<(String, String)>,
}

async fn read_upload(mut multipart: Multipart) -> Result<Upload> {
    let mut upload = Upload::default();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| Error::BadRequest(format!("invalid multipart body: {e}")))?
    {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };
        match field.file_name().map(str::to_owned) {
            Some(file_name) => {
                let content_type = field.content_type().map(str::to_owned);
                let data: Bytes = field
                    .bytes()
                    .await
                    .map_err(|e| Error::BadRequest(format!("failed to read {name}: {e}")))?;
                upload.files.push(FilePart {
                    field: name,
                    file_name: Some(file_name),
                    content_type,
                    data,
                });
            }
            None => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| Error::BadRequest(format!("failed to read {name}: {e}")))?;
                upload.fields.push((name, value));
            }
        }
    }
    Ok(upload)
}

impl Upload {
    /// Pick the upload form: a single `file` wins over `files[]`.
    ///
    /// Single-file metadata is forwarded only when non-empty; list metadata
    /// is forwarded as given.
    fn into_post_body(self) -> Result<PostBody> {
        let Upload { files, fields } = self;

        if let Some(file) = files.iter().find(|f| f.field == "file").cloned() {
            let form = SINGLE_FILE_FIELDS
                .iter()
                .filter_map(|key| {
                    fields
                        .iter()
                        .find(|(name, value)| name.as_str() == *key && !value.is_empty())
                        .cloned()
                })
                .collect();
            return Ok(PostBody {
                files: vec![file],
                form,
                json: None,
            });
        }

        let batch: Vec<FilePart> = files.into_iter().filter(|f| f.field == "files[]").collect();
        if batch.is_empty() {
            return Err(Error::BadRequest("No files provided".into()));
        }
        let fields = &fields;
        let form = MULTI_FILE_FIELDS
            .iter()
            .flat_map(|key| {
                fields
                    .iter()
                    .filter(move |(name, _)| name.as_str() == *key)
                    .cloned()
            })
            .collect();
        Ok(PostBody {
            files: batch,
            form,
            json: None,
        })
    }
}

/// Log, record metrics and build the JSON envelope.
fn respond(route: &'static str, started: Instant, result: Result<Value>) -> Response {
    let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
    let (status, body) = match result {
        Ok(body) => (StatusCode::OK, body),
        Err(e) => {
            let status = e.status();
            if status.is_server_error() {
                error!(route, request_id = %request_id, error = %e, "request failed");
            } else {
                warn!(route, request_id = %request_id, error = %e, "request rejected");
            }
            (status, json!({"success": false, "error": e.to_string()}))
        }
    };
    metrics::record_request(route, status.as_u16(), started.elapsed().as_secs_f64());

    (
        status,
        [
            (CONTENT_TYPE, "application/json".to_string()),
            (HeaderName::from_static("x-request-id"), request_id),
        ],
        body.to_string(),
    )
        .into_response()
}
