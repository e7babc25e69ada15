//! Login credentials and the in-memory token store
//!
//! `Credentials` are fixed for the process lifetime. The `CredentialStore`
//! holds the current bearer token and optional refresh token behind one
//! `RwLock`, so a re-authentication replaces both in a single write and a
//! concurrent reader sees either the old pair or the new pair, never a mix.
//! Nothing is persisted; a pre-issued token from configuration can seed the
//! store at startup.

use common::Secret;
use tokio::sync::RwLock;
use tracing::debug;

/// Account login details used by every strategy.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub email: String,
    pub password: Secret<String>,
    pub account_id: String,
}

/// Result of one successful authentication.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// Bearer token, never empty
    pub access: Secret<String>,
    pub refresh: Option<Secret<String>>,
}

impl IssuedToken {
    pub fn new(access: String, refresh: Option<String>) -> Self {
        Self {
            access: Secret::new(access),
            refresh: refresh.map(Secret::new),
        }
    }
}

#[derive(Default)]
struct Tokens {
    access: Option<Secret<String>>,
    refresh: Option<Secret<String>>,
}

/// Current session tokens.
///
/// No validation of token shape happens here; strategies guarantee the
/// bearer token is non-empty before it reaches `replace`.
#[derive(Default)]
pub struct CredentialStore {
    state: RwLock<Tokens>,
}

impl CredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with a pre-issued bearer token. Empty seeds are ignored.
    pub fn seeded(token: Option<Secret<String>>) -> Self {
        let access = token.filter(|t| !t.expose().is_empty());
        if access.is_some() {
            debug!("credential store seeded with pre-issued token");
        }
        Self {
            state: RwLock::new(Tokens {
                access,
                refresh: None,
            }),
        }
    }

    pub async fn token(&self) -> Option<String> {
        let state = self.state.read().await;
        state.access.as_ref().map(|t| t.expose().clone())
    }

    pub async fn set_token(&self, token: String) {
        let mut state = self.state.write().await;
        state.access = Some(Secret::new(token));
        debug!("bearer token replaced");
    }

    pub async fn refresh_token(&self) -> Option<String> {
        let state = self.state.read().await;
        state.refresh.as_ref().map(|t| t.expose().clone())
    }

    pub async fn set_refresh_token(&self, token: String) {
        let mut state = self.state.write().await;
        state.refresh = Some(Secret::new(token));
        debug!("refresh token replaced");
    }

    /// Swap in a freshly issued token pair under a single write lock.
    ///
    /// A missing refresh token in `issued` keeps the previous one.
    pub async fn replace(&self, issued: IssuedToken) {
        let mut state = self.state.write().await;
        state.access = Some(issued.access);
        if let Some(refresh) = issued.refresh {
            state.refresh = Some(refresh);
        }
        debug!(has_refresh = state.refresh.is_some(), "token pair replaced");
    }

    pub async fn has_token(&self) -> bool {
        self.state.read().await.access.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn starts_empty() {
        let store = CredentialStore::new();
        assert!(store.token().await.is_none());
        assert!(store.refresh_token().await.is_none());
        assert!(!store.has_token().await);
    }

    #[tokio::test]
    async fn seeded_token_is_available() {
        let store = CredentialStore::seeded(Some(Secret::new("pre-issued".to_string())));
        assert_eq!(store.token().await.as_deref(), Some("pre-issued"));
    }

    #[tokio::test]
    async fn empty_seed_is_ignored() {
        let store = CredentialStore::seeded(Some(Secret::new(String::new())));
        assert!(!store.has_token().await);
    }

    #[tokio::test]
    async fn setters_replace_values() {
        let store = CredentialStore::new();
        store.set_token("at_1".into()).await;
        store.set_refresh_token("rt_1".into()).await;
        store.set_token("at_2".into()).await;

        assert_eq!(store.token().await.as_deref(), Some("at_2"));
        assert_eq!(store.refresh_token().await.as_deref(), Some("rt_1"));
    }

    #[tokio::test]
    async fn replace_keeps_refresh_when_absent() {
        let store = CredentialStore::new();
        store
            .replace(IssuedToken::new("at_1".into(), Some("rt_1".into())))
            .await;
        store.replace(IssuedToken::new("at_2".into(), None)).await;

        assert_eq!(store.token().await.as_deref(), Some("at_2"));
        assert_eq!(store.refresh_token().await.as_deref(), Some("rt_1"));
    }

    #[tokio::test]
    async fn concurrent_readers_see_whole_pairs() {
        let store = Arc::new(CredentialStore::new());
        store
            .replace(IssuedToken::new("at_0".into(), Some("rt_0".into())))
            .await;

        let mut handles = vec![];
        for i in 1..=10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .replace(IssuedToken::new(format!("at_{i}"), Some(format!("rt_{i}"))))
                    .await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let access = store.token().await.unwrap();
        let refresh = store.refresh_token().await.unwrap();
        assert_eq!(
            access.trim_start_matches("at_"),
            refresh.trim_start_matches("rt_"),
            "access and refresh must come from the same replace"
        );
    }
}
