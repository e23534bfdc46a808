pub mod types;
pub mod config;
pub mod calendar;
pub mod store;
pub mod results;
pub mod elimination;
pub mod pool;
pub mod scores;
pub mod audit;

use types::*;
use config::*;

use axum::{
    extract::State as AxumState,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use std::{
    fs,
    sync::{Arc, Mutex},
};
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

// ── HTTP surface ───────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub pool_cache: SharedPoolCache,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StageError {
    error: String,
    stage: String,
}

fn json_no_store<T: Serialize>(payload: &T) -> Response {
    let body = serde_json::to_string(payload).unwrap_or_else(|_| "{}".to_string());
    (
        [
            ("Content-Type", "application/json"),
            ("Cache-Control", "no-store"),
            ("Pragma", "no-cache"),
            ("Expires", "0"),
        ],
        body,
    )
        .into_response()
}

fn stage_error(status: StatusCode, stage: &str, error: &str) -> Response {
    let body = serde_json::to_string(&StageError {
        error: error.to_string(),
        stage: stage.to_string(),
    })
    .unwrap_or_else(|_| "{}".to_string());
    (status, [("Content-Type", "application/json")], body).into_response()
}

async fn get_pool_json(AxumState(state): AxumState<AppState>) -> Response {
    let config = match load_config_inner() {
        Ok(config) => config,
        Err(e) => return stage_error(StatusCode::INTERNAL_SERVER_ERROR, "config", &e),
    };
    let cache = state.pool_cache.clone();
    let refreshed =
        tokio::task::spawn_blocking(move || pool::maybe_refresh_pool_snapshot(&config, &cache, false)).await;
    match refreshed {
        Ok(Some(snapshot)) => json_no_store(&snapshot),
        Ok(None) => {
            let last_error = {
                let guard = state.pool_cache.lock().unwrap_or_else(|e| e.into_inner());
                guard
                    .last_error
                    .clone()
                    .unwrap_or_else(|| "Pool snapshot is unavailable.".to_string())
            };
            stage_error(StatusCode::SERVICE_UNAVAILABLE, "snapshot", &last_error)
        }
        Err(e) => stage_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "snapshot",
            &format!("snapshot task failed: {e}"),
        ),
    }
}

async fn run_audit_response(apply_fixes: bool) -> Response {
    let config = match load_config_inner() {
        Ok(config) => config,
        Err(e) => return stage_error(StatusCode::INTERNAL_SERVER_ERROR, "config", &e),
    };
    // Correction writes are paced with inter-write delays, so the whole
    // audit runs off the async workers.
    let report = tokio::task::spawn_blocking(move || audit::run_audit(&config, apply_fixes)).await;
    match report {
        Ok(Ok(report)) => json_no_store(&report),
        Ok(Err(e)) => stage_error(StatusCode::INTERNAL_SERVER_ERROR, "audit", &e),
        Err(e) => stage_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "audit",
            &format!("audit task failed: {e}"),
        ),
    }
}

async fn get_audit_json() -> Response {
    run_audit_response(false).await
}

async fn post_audit_fix() -> Response {
    run_audit_response(true).await
}

async fn get_config_json() -> Response {
    match load_config_inner() {
        Ok(mut config) => {
            if !config.score_feed_token.trim().is_empty() {
                config.score_feed_token = "[redacted]".to_string();
            }
            json_no_store(&config)
        }
        Err(e) => stage_error(StatusCode::INTERNAL_SERVER_ERROR, "config", &e),
    }
}

fn pool_router(state: AppState) -> Router {
    Router::new()
        .route("/pool.json", get(get_pool_json))
        .route("/audit.json", get(get_audit_json))
        .route("/audit/fix", post(post_audit_fix))
        .route("/config.json", get(get_config_json))
        .with_state(state)
}

async fn start_pool_server(state: AppState, addr: &str) {
    let app = pool_router(state);
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("pool server failed to bind {addr}: {e}");
            return;
        }
    };
    info!("pool server listening at http://{addr}/");
    if let Err(e) = axum::serve(listener, app).await {
        error!("pool server error: {e}");
    }
}

// ── Entry point ────────────────────────────────────────────────────────

pub async fn run() {
    load_env_file();

    // Initialize tracing with file + stderr output
    let logs_dir = repo_root().join("logs");
    fs::create_dir_all(&logs_dir).ok();
    let file_appender = tracing_appender::rolling::daily(&logs_dir, "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(non_blocking)
        .with_ansi(false)
        .init();
    info!("Survivor pool engine starting");
    log_env_warnings();

    let config = load_config_inner().unwrap_or_else(|_| AppConfig::default());
    let pool_cache: SharedPoolCache = Arc::new(Mutex::new(PoolCacheState::default()));
    scores::spawn_score_polling();

    let state = AppState { pool_cache };
    start_pool_server(state, &config.bind_addr).await;
}
