//! New-service detection against the persisted seen-set
//!
//! Upstream listings come in several shapes; `extract_services` normalizes
//! them to a slice of records. Records of the tracked service type are
//! diffed against `seen_services`. When anything new shows up, the seen-set
//! is overwritten with the ids of the current listing (replace, not union),
//! so ids that dropped out of the listing are forgotten.

use std::collections::HashSet;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::cache::Cache;
use crate::error::Result;

/// Service type reported by `/api/new-services`
pub const SERVICE_TYPE_ID: &str = "a7c123fb-bfa6-4824-8722-ade0ee562c2e";

/// Cache key of the seen-set
pub const SEEN_SERVICES_KEY: &str = "seen_services";

/// A service not reported before.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewService {
    #[serde(rename = "type")]
    pub service_type: Value,
    pub name: Value,
    /// The record's `times`
    pub date: Value,
}

/// Records from an upstream listing.
///
/// Accepts a bare array, or an object whose first non-empty array under
/// `docs`, `data` or `services` wins, falling back to `response.docs`.
/// Anything else has no records.
pub fn extract_services(listing: &Value) -> &[Value] {
    match listing {
        Value::Array(records) => records.as_slice(),
        Value::Object(object) => ["docs", "data", "services"]
            .iter()
            .filter_map(|key| object.get(*key).and_then(Value::as_array))
            .find(|records| !records.is_empty())
            .or_else(|| {
                object
                    .get("response")
                    .and_then(|r| r.get("docs"))
                    .and_then(Value::as_array)
            })
            .map(Vec::as_slice)
            .unwrap_or(&[]),
        _ => &[],
    }
}

/// Diff `listing` against the seen-set in `cache`, updating it when needed.
///
/// The read and the write take the cache lock separately, so two concurrent
/// calls can both report the same new ids.
pub async fn detect_new_services(cache: &Cache, listing: &Value) -> Result<Vec<NewService>> {
    let tracked: Vec<(&str, &Value)> = extract_services(listing)
        .iter()
        .filter(|record| record.get("type").and_then(Value::as_str) == Some(SERVICE_TYPE_ID))
        .filter_map(|record| match record.get("id").and_then(Value::as_str) {
            Some(id) => Some((id, record)),
            None => {
                debug!("skipping tracked service without string id");
                None
            }
        })
        .collect();

    let seen: HashSet<String> = cache
        .get::<Vec<String>>(SEEN_SERVICES_KEY, Vec::new())
        .await
        .into_iter()
        .collect();

    let new_services: Vec<NewService> = tracked
        .iter()
        .filter(|(id, _)| !seen.contains(*id))
        .map(|(_, record)| NewService {
            service_type: field(record, "type"),
            name: field(record, "name"),
            date: field(record, "times"),
        })
        .collect();

    if !new_services.is_empty() {
        let current: Vec<&str> = tracked.iter().map(|(id, _)| *id).collect();
        cache.set(SEEN_SERVICES_KEY, &current).await?;
        info!(
            new = new_services.len(),
            tracked = current.len(),
            "new services found, seen-set replaced"
        );
    }

    Ok(new_services)
}

fn field(record: &Value, key: &str) -> Value {
    record.get(key).cloned().unwrap_or(Value::Null)
}
