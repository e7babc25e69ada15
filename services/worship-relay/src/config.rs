//! Configuration types and loading
//!
//! Precedence: environment variables > config file > defaults. Every TOML
//! field has a default, so the service can run from environment alone.
//! The password and pre-issued token are only read from the environment
//! (or `.env`), never from the TOML file.

use common::Secret;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use worshiptools_auth::{API_BASE_URL, AuthMethod, BrowserEndpoints, Credentials};

/// Config file picked up from the working directory when nothing else is given
pub const DEFAULT_CONFIG_FILE: &str = "worship-relay.toml";

/// Root configuration
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub worshiptools: WorshipToolsConfig,
    pub cache: CacheConfig,
}

/// Inbound HTTP listener
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            max_connections: 1000,
        }
    }
}

/// Upstream account and authentication
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct WorshipToolsConfig {
    pub api_base_url: String,
    pub account_id: String,
    pub email: String,
    pub auth_strategy: AuthMethod,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub browser: BrowserEndpoints,
    #[serde(skip)]
    pub password: Option<Secret<String>>,
    /// Pre-issued bearer token; skips authentication at startup
    #[serde(skip)]
    pub token: Option<Secret<String>>,
}

impl Default for WorshipToolsConfig {
    fn default() -> Self {
        Self {
            api_base_url: API_BASE_URL.to_string(),
            account_id: String::new(),
            email: String::new(),
            auth_strategy: AuthMethod::default(),
            timeout_secs: 30,
            connect_timeout_secs: 10,
            browser: BrowserEndpoints::default(),
            password: None,
            token: None,
        }
    }
}

impl WorshipToolsConfig {
    /// Login details for the auth strategies. Only valid after `validate`.
    pub fn credentials(&self) -> common::Result<Credentials> {
        let password = self
            .password
            .clone()
            .ok_or(common::Error::MissingSetting("WORSHIPTOOLS_PASSWORD"))?;
        Ok(Credentials {
            email: self.email.clone(),
            password,
            account_id: self.account_id.clone(),
        })
    }
}

/// Seen-set cache on disk
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub path: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("db.yaml"),
        }
    }
}

impl Config {
    /// Load from an optional TOML file, overlay the environment, validate.
    pub fn load(path: Option<&Path>) -> common::Result<Self> {
        let mut config = match path {
            Some(path) => {
                let contents = std::fs::read_to_string(path)?;
                toml::from_str(&contents)?
            }
            None => Config::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve config file path from CLI arg, `CONFIG_PATH`, or the default
    /// file in the working directory. `None` means run on defaults.
    pub fn resolve_path(cli_path: Option<&str>) -> Option<PathBuf> {
        if let Some(p) = cli_path {
            return Some(PathBuf::from(p));
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return Some(PathBuf::from(p));
        }
        let default = PathBuf::from(DEFAULT_CONFIG_FILE);
        default.exists().then_some(default)
    }

    fn apply_env(&mut self) -> common::Result<()> {
        let upstream = &mut self.worshiptools;
        if let Some(email) = env_value("WORSHIPTOOLS_EMAIL") {
            upstream.email = email;
        }
        if let Some(password) = env_value("WORSHIPTOOLS_PASSWORD") {
            upstream.password = Some(Secret::new(password));
        }
        if let Some(account_id) = env_value("WORSHIPTOOLS_ACCOUNT_ID") {
            upstream.account_id = account_id;
        }
        if let Some(token) = env_value("WORSHIPTOOLS_TOKEN") {
            upstream.token = Some(Secret::new(token));
        }
        if let Some(strategy) = env_value("WORSHIPTOOLS_AUTH_STRATEGY") {
            upstream.auth_strategy = strategy.parse().map_err(common::Error::Config)?;
        }
        if let Some(port) = env_value("PORT") {
            let port: u16 = port
                .parse()
                .map_err(|_| common::Error::Config(format!("PORT must be a port number, got: {port}")))?;
            self.server.listen_addr.set_port(port);
        }
        Ok(())
    }

    fn validate(&self) -> common::Result<()> {
        let upstream = &self.worshiptools;
        for (name, url) in [
            ("api_base_url", &upstream.api_base_url),
            ("browser.site_url", &upstream.browser.site_url),
            ("browser.auth_url", &upstream.browser.auth_url),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(common::Error::Config(format!(
                    "{name} must start with http:// or https://, got: {url}"
                )));
            }
        }

        if upstream.timeout_secs == 0 || upstream.connect_timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs and connect_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        if upstream.email.trim().is_empty() {
            return Err(common::Error::MissingSetting("WORSHIPTOOLS_EMAIL"));
        }
        if upstream.password.is_none() {
            return Err(common::Error::MissingSetting("WORSHIPTOOLS_PASSWORD"));
        }
        if upstream.account_id.trim().is_empty() {
            return Err(common::Error::MissingSetting("WORSHIPTOOLS_ACCOUNT_ID"));
        }
        Ok(())
    }
}

/// Non-empty environment value.
fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Mutex to serialize tests that mutate environment variables, preventing
    /// data races when tests run in parallel.
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    const ENV_KEYS: &[&str] = &[
        "WORSHIPTOOLS_EMAIL",
        "WORSHIPTOOLS_PASSWORD",
        "WORSHIPTOOLS_ACCOUNT_ID",
        "WORSHIPTOOLS_TOKEN",
        "WORSHIPTOOLS_AUTH_STRATEGY",
        "PORT",
        "CONFIG_PATH",
    ];

    /// SAFETY: Callers must hold ENV_MUTEX to prevent concurrent env mutation.
    unsafe fn set_env(key: &str, val: &str) {
        unsafe { std::env::set_var(key, val) };
    }

    /// Clear every variable the loader reads, then set the three required ones.
    ///
    /// SAFETY: Callers must hold ENV_MUTEX.
    unsafe fn reset_env_with_credentials() {
        for key in ENV_KEYS {
            unsafe { std::env::remove_var(key) };
        }
        unsafe {
            set_env("WORSHIPTOOLS_EMAIL", "leader@example.org");
            set_env("WORSHIPTOOLS_PASSWORD", "hunter2");
            set_env("WORSHIPTOOLS_ACCOUNT_ID", "acct-42");
        }
    }

    fn write_config(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("worship-relay.toml");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn test_defaults_from_environment_only() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { reset_env_with_credentials() };

        let config = Config::load(None).unwrap();
        assert_eq!(config.server.listen_addr.to_string(), "0.0.0.0:5000");
        assert_eq!(config.server.max_connections, 1000);
        assert_eq!(config.worshiptools.api_base_url, "https://api.worship.tools/v1");
        assert_eq!(config.worshiptools.auth_strategy, AuthMethod::Direct);
        assert_eq!(config.worshiptools.timeout_secs, 30);
        assert_eq!(config.worshiptools.connect_timeout_secs, 10);
        assert_eq!(
            config.worshiptools.browser.auth_url,
            "https://auth.worshiptools.com"
        );
        assert_eq!(config.worshiptools.email, "leader@example.org");
        assert_eq!(config.worshiptools.account_id, "acct-42");
        assert!(config.worshiptools.token.is_none());
        assert_eq!(config.cache.path, PathBuf::from("db.yaml"));
    }

    #[test]
    fn test_load_file_with_overrides() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { reset_env_with_credentials() };
        let (_dir, path) = write_config(
            r#"
[server]
listen_addr = "127.0.0.1:8080"
max_connections = 50

[worshiptools]
api_base_url = "http://localhost:9999/v1"
auth_strategy = "browser"
timeout_secs = 5

[worshiptools.browser]
token_cookie = "wt_session"

[cache]
path = "/var/lib/worship-relay/db.yaml"
"#,
        );

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.server.listen_addr.to_string(), "127.0.0.1:8080");
        assert_eq!(config.server.max_connections, 50);
        assert_eq!(config.worshiptools.api_base_url, "http://localhost:9999/v1");
        assert_eq!(config.worshiptools.auth_strategy, AuthMethod::Browser);
        assert_eq!(config.worshiptools.timeout_secs, 5);
        assert_eq!(config.worshiptools.connect_timeout_secs, 10);
        assert_eq!(config.worshiptools.browser.token_cookie, "wt_session");
        assert_eq!(config.worshiptools.browser.refresh_cookie, "refresh_token");
        assert_eq!(
            config.cache.path,
            PathBuf::from("/var/lib/worship-relay/db.yaml")
        );
    }

    #[test]
    fn test_env_overrides_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { reset_env_with_credentials() };
        let (_dir, path) = write_config(
            r#"
[server]
listen_addr = "127.0.0.1:8080"

[worshiptools]
account_id = "from-file"
email = "file@example.org"
auth_strategy = "browser"
"#,
        );
        unsafe {
            set_env("PORT", "7000");
            set_env("WORSHIPTOOLS_AUTH_STRATEGY", "direct");
            set_env("WORSHIPTOOLS_TOKEN", "pre-issued");
        }

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.server.listen_addr.to_string(), "127.0.0.1:7000");
        assert_eq!(config.worshiptools.account_id, "acct-42");
        assert_eq!(config.worshiptools.email, "leader@example.org");
        assert_eq!(config.worshiptools.auth_strategy, AuthMethod::Direct);
        assert_eq!(
            config.worshiptools.token.as_ref().unwrap().expose(),
            "pre-issued"
        );

        unsafe { reset_env_with_credentials() };
    }

    #[test]
    fn test_empty_token_means_unset() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe {
            reset_env_with_credentials();
            set_env("WORSHIPTOOLS_TOKEN", "");
        }

        let config = Config::load(None).unwrap();
        assert!(config.worshiptools.token.is_none());
    }

    #[test]
    fn test_missing_credentials_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        for missing in [
            "WORSHIPTOOLS_EMAIL",
            "WORSHIPTOOLS_PASSWORD",
            "WORSHIPTOOLS_ACCOUNT_ID",
        ] {
            unsafe {
                reset_env_with_credentials();
                std::env::remove_var(missing);
            }
            match Config::load(None) {
                Err(common::Error::MissingSetting(name)) => assert_eq!(name, missing),
                other => panic!("expected MissingSetting({missing}), got {other:?}"),
            }
        }
        unsafe { reset_env_with_credentials() };
    }

    #[test]
    fn test_password_not_read_from_file() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe {
            reset_env_with_credentials();
            std::env::remove_var("WORSHIPTOOLS_PASSWORD");
        }
        let (_dir, path) = write_config(
            r#"
[worshiptools]
password = "in-the-file"
"#,
        );

        let result = Config::load(Some(&path));
        assert!(
            matches!(
                result,
                Err(common::Error::MissingSetting("WORSHIPTOOLS_PASSWORD"))
            ),
            "password in TOML must be ignored, got: {result:?}"
        );
        unsafe { reset_env_with_credentials() };
    }

    #[test]
    fn test_invalid_api_base_url_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { reset_env_with_credentials() };
        let (_dir, path) = write_config(
            r#"
[worshiptools]
api_base_url = "api.worship.tools/v1"
"#,
        );

        let err = Config::load(Some(&path)).unwrap_err().to_string();
        assert!(
            err.contains("api_base_url must start with http"),
            "error message should explain the issue, got: {err}"
        );
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { reset_env_with_credentials() };
        let (_dir, path) = write_config("[worshiptools]\nconnect_timeout_secs = 0\n");

        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_zero_max_connections_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { reset_env_with_credentials() };
        let (_dir, path) = write_config("[server]\nmax_connections = 0\n");

        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    fn test_bad_port_and_strategy_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe {
            reset_env_with_credentials();
            set_env("PORT", "http");
        }
        assert!(Config::load(None).is_err());

        unsafe {
            reset_env_with_credentials();
            set_env("WORSHIPTOOLS_AUTH_STRATEGY", "saml");
        }
        let err = Config::load(None).unwrap_err().to_string();
        assert!(err.contains("unknown auth strategy"), "got: {err}");
        unsafe { reset_env_with_credentials() };
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load(Some(Path::new("/nonexistent/path/config.toml")));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_invalid_toml() {
        let (_dir, path) = write_config("not valid {{{{ toml");
        assert!(matches!(
            Config::load(Some(&path)),
            Err(common::Error::Toml(_))
        ));
    }

    #[test]
    fn test_resolve_path_cli_overrides_env() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/should-lose.toml") };
        let path = Config::resolve_path(Some("/cli/wins.toml"));
        assert_eq!(
            path,
            Some(PathBuf::from("/cli/wins.toml")),
            "CLI arg must take precedence over CONFIG_PATH env var"
        );
        unsafe { std::env::remove_var("CONFIG_PATH") };
    }

    #[test]
    fn test_resolve_path_env_var() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { set_env("CONFIG_PATH", "/env/path.toml") };
        let path = Config::resolve_path(None);
        assert_eq!(path, Some(PathBuf::from("/env/path.toml")));
        unsafe { std::env::remove_var("CONFIG_PATH") };
    }

    #[test]
    fn test_credentials_from_config() {
        let _lock = ENV_MUTEX.lock().unwrap();
        unsafe { reset_env_with_credentials() };

        let config = Config::load(None).unwrap();
        let credentials = config.worshiptools.credentials().unwrap();
        assert_eq!(credentials.email, "leader@example.org");
        assert_eq!(credentials.password.expose(), "hunter2");
        assert_eq!(credentials.account_id, "acct-42");
        assert_eq!(format!("{:?}", credentials.password), "[REDACTED]");
    }
}
