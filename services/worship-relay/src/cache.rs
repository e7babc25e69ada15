//! YAML key/value cache on disk
//!
//! Holds the seen-set between runs. The whole document is kept in memory; every
//! `set` rewrites the file with an atomic temp-file + rename. A tokio Mutex
//! serializes writers so concurrent requests cannot interleave two rewrites.

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_yaml::{Mapping, Value};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

pub struct Cache {
    path: PathBuf,
    state: Mutex<Mapping>,
}

impl Cache {
    /// Load the document at `path`. A missing or empty file is an empty
    /// mapping; nothing is written until the first `set`.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let state = match tokio::fs::read_to_string(&path).await {
            Ok(contents) if contents.trim().is_empty() => Mapping::new(),
            Ok(contents) => {
                let document: Option<Mapping> = serde_yaml::from_str(&contents)?;
                let document = document.unwrap_or_default();
                info!(path = %path.display(), keys = document.len(), "loaded cache");
                document
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "cache file not found, starting empty");
                Mapping::new()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// Value stored under `key`, or `default` when absent.
    ///
    /// A value that no longer matches `T` is logged and treated as absent.
    pub async fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        let state = self.state.lock().await;
        let Some(value) = state.get(key) else {
            return default;
        };
        match serde_yaml::from_value(value.clone()) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "cached value has unexpected shape, using default");
                default
            }
        }
    }

    /// Store `value` under `key` and rewrite the file.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let value = serde_yaml::to_value(value)?;
        let mut state = self.state.lock().await;
        state.insert(Value::String(key.to_string()), value);
        debug!(key, "cache key updated");
        write_atomic(&self.path, &state).await
    }
}

/// Write the document to `path` via a temp file in the same directory.
async fn write_atomic(path: &Path, data: &Mapping) -> Result<()> {
    let yaml = serde_yaml::to_string(data)?;

    let dir = path
        .parent()
        .ok_or_else(|| Error::CachePath(path.display().to_string()))?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| Error::CachePath(path.display().to_string()))?;
    let tmp_path = dir.join(format!(".{file_name}.tmp.{}", std::process::id()));

    tokio::fs::write(&tmp_path, yaml.as_bytes()).await?;
    tokio::fs::rename(&tmp_path, path).await?;

    debug!(path = %path.display(), "persisted cache");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_is_empty_and_not_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.yaml");

        let cache = Cache::load(path.clone()).await.unwrap();
        let seen: Vec<String> = cache.get("seen_services", Vec::new()).await;

        assert!(seen.is_empty());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn set_persists_whole_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.yaml");

        let cache = Cache::load(path.clone()).await.unwrap();
        cache.set("seen_services", &vec!["a", "b"]).await.unwrap();
        cache.set("last_run", &"2026-04-05").await.unwrap();

        let reloaded = Cache::load(path.clone()).await.unwrap();
        let seen: Vec<String> = reloaded.get("seen_services", Vec::new()).await;
        assert_eq!(seen, vec!["a", "b"]);
        let last: String = reloaded.get("last_run", String::new()).await;
        assert_eq!(last, "2026-04-05");

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("seen_services:"), "got: {raw}");
    }

    #[tokio::test]
    async fn reads_existing_yaml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.yaml");
        std::fs::write(&path, "seen_services:\n- x\n- y\nother: 3\n").unwrap();

        let cache = Cache::load(path).await.unwrap();
        let seen: Vec<String> = cache.get("seen_services", Vec::new()).await;
        assert_eq!(seen, vec!["x", "y"]);
        assert_eq!(cache.get("other", 0u32).await, 3);
        assert_eq!(cache.get("absent", 7u32).await, 7);
    }

    #[tokio::test]
    async fn empty_or_null_document_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        for contents in ["", "  \n", "~\n", "null\n"] {
            let path = dir.path().join("db.yaml");
            std::fs::write(&path, contents).unwrap();
            let cache = Cache::load(path).await.unwrap();
            let seen: Vec<String> = cache.get("seen_services", Vec::new()).await;
            assert!(seen.is_empty(), "contents {contents:?}");
        }
    }

    #[tokio::test]
    async fn wrong_shape_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.yaml");
        std::fs::write(&path, "seen_services: not-a-list\n").unwrap();

        let cache = Cache::load(path).await.unwrap();
        let seen: Vec<String> = cache.get("seen_services", vec!["d".to_string()]).await;
        assert_eq!(seen, vec!["d"]);
    }

    #[tokio::test]
    async fn malformed_yaml_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.yaml");
        std::fs::write(&path, "seen_services: [unclosed\n").unwrap();

        assert!(matches!(
            Cache::load(path).await,
            Err(Error::CacheFormat(_))
        ));
    }

    #[tokio::test]
    async fn no_temp_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("db.yaml");

        let cache = Cache::load(path).await.unwrap();
        cache.set("k", &1).await.unwrap();

        let names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["db.yaml"]);
    }
}
