//! WorshipTools relay
//!
//! Single-binary Rust service that:
//! 1. Authenticates against WorshipTools (direct grant or browser login)
//! 2. Reports services not seen before, tracked in a YAML seen-set
//! 3. Forwards file uploads to the account
//! 4. Exposes health and Prometheus metrics

mod api;
mod cache;
mod config;
mod error;
mod metrics;
mod services;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use metrics_exporter_prometheus::PrometheusHandle;
use session::{HttpSession, ReqwestTransport};
use worshiptools_auth::build_strategy;
use worshiptools_client::ApiClient;

use crate::cache::Cache;
use crate::config::Config;

/// How long in-flight requests get to finish after a shutdown signal
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared application state accessible from all handlers
#[derive(Clone)]
pub(crate) struct AppState {
    pub client: Arc<ApiClient>,
    pub cache: Arc<Cache>,
    prometheus: PrometheusHandle,
    started_at: Instant,
}

/// Build the axum router with all routes and shared state.
///
/// `max_connections` caps concurrently handled requests; excess requests
/// queue until a slot frees up.
fn build_router(state: AppState, max_connections: usize) -> Router {
    Router::new()
        .route("/api/new-services", get(api::new_services))
        .route("/api/debug-services", get(api::debug_services))
        .route("/api/upload-files", post(api::upload_files))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(DefaultBodyLimit::max(api::MAX_UPLOAD_BYTES))
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_connections))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting worship-relay");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle = metrics::install_recorder();

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    match &config_path {
        Some(path) => info!(path = %path.display(), "loading configuration"),
        None => info!("no config file, using defaults and environment"),
    }

    let config = Config::load(config_path.as_deref()).with_context(|| match &config_path {
        Some(path) => format!("failed to load config from {}", path.display()),
        None => "failed to load config from environment".to_string(),
    })?;
    let upstream = &config.worshiptools;

    info!(
        listen_addr = %config.server.listen_addr,
        api_base_url = %upstream.api_base_url,
        account_id = %upstream.account_id,
        auth_strategy = ?upstream.auth_strategy,
        pre_issued_token = upstream.token.is_some(),
        cache = %config.cache.path.display(),
        "configuration loaded"
    );

    let transport = ReqwestTransport::new(
        Duration::from_secs(upstream.timeout_secs),
        Duration::from_secs(upstream.connect_timeout_secs),
    )
    .context("failed to build HTTP client")?;
    let session = Arc::new(HttpSession::new(Arc::new(transport)));

    let strategy = build_strategy(
        upstream.auth_strategy,
        upstream.credentials()?,
        &upstream.api_base_url,
        upstream.browser.clone(),
    )
    .context("invalid authentication settings")?;

    // Authentication failure here is fatal
    let client = ApiClient::connect(
        &upstream.api_base_url,
        upstream.account_id.clone(),
        session,
        strategy,
        upstream.token.clone(),
    )
    .await
    .context("could not authenticate with WorshipTools")?;

    let cache = Cache::load(config.cache.path.clone())
        .await
        .with_context(|| format!("failed to load cache from {}", config.cache.path.display()))?;

    let app_state = AppState {
        client: Arc::new(client),
        cache: Arc::new(cache),
        prometheus: prometheus_handle,
        started_at: Instant::now(),
    };

    let app = build_router(app_state, config.server.max_connections);

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "accepting requests");

    // The drain timeout starts when the shutdown signal fires, not when the
    // server starts: signal the server to drain, then race it against the timer.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("all in-flight requests drained");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
        }
        Err(_) => {
            warn!(
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    info!("shutdown complete");
    Ok(())
}

/// Health endpoint: 200 while a bearer token is held, 503 otherwise.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = state.started_at.elapsed().as_secs();
    let authenticated = state.client.is_authenticated().await;

    let (status_code, status) = if authenticated {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        status_code,
        [(CONTENT_TYPE, "application/json")],
        serde_json::json!({
            "status": status,
            "uptime_seconds": uptime,
            "authenticated": authenticated,
        })
        .to_string(),
    )
}

/// Prometheus metrics endpoint in text exposition format.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.prometheus.render(),
    )
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
