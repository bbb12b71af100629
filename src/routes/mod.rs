//! HTTP route handlers for the download gate.
//!
//! - `security`: login, logout and user administration
//! - `tokens`: download-token administration and redemption
//! - `download`: quota checks and metered file downloads
//! - `health`: liveness, version and metrics
//!
//! [`router`] assembles them with the gate and hygiene layers.

pub mod download;
pub mod health;
pub mod security;
pub mod tokens;

use axum::extract::DefaultBodyLimit;
use axum::handler::Handler;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

use crate::middleware::auth::{session_gate, RouteGuard};
use crate::middleware::csrf::csrf_middleware;
use crate::middleware::recover::handle_panic;
use crate::middleware::security_headers::security_headers_middleware;
use crate::middleware::validation::{require_json_accept, validate_request_middleware};
use crate::state::AppState;
use crate::types::Role;

/// Bodies larger than this are refused before any handler runs.
const BODY_LIMIT: usize = 1024 * 1024;

/// Builds the complete application.
///
/// Layer order, outermost first: security headers, tracing, panic recovery,
/// request validation, anti-forgery, then per-route content negotiation and
/// session gates.
pub fn router(state: AppState) -> Router {
    let any = RouteGuard::any(&state);
    let admin = RouteGuard::new(&state, &[Role::Admin]);
    let downloader = RouteGuard::new(&state, download::DOWNLOADERS);
    let gate = |guard: &RouteGuard| from_fn_with_state(guard.clone(), session_gate);
    let upload_limit = state.config.downloads.max_upload_mb.saturating_mul(1024 * 1024);

    let api = Router::new()
        .route("/login", post(security::login))
        .route("/logout", post(security::logout.layer(gate(&any))))
        .route(
            "/user",
            get(security::current_user.layer(gate(&any))).post(security::save_user.layer(gate(&admin))),
        )
        .route(
            "/token",
            get(tokens::list_tokens.layer(gate(&admin))).post(tokens::save_token.layer(gate(&admin))),
        )
        .route("/tokens/generate", post(tokens::generate_tokens.layer(gate(&admin))))
        .route("/redeem", post(tokens::redeem))
        .route("/check-download", get(download::check_download.layer(gate(&downloader))))
        .route("/check-download-params", get(download::check_download_params))
        .route(
            "/upload",
            post(download::upload.layer(gate(&admin)).layer(DefaultBodyLimit::max(upload_limit))),
        )
        .route_layer(from_fn(require_json_accept));

    let files = Router::new()
        .route("/download", get(download::download.layer(gate(&downloader))))
        .route("/download-params", get(download::download_params));

    let ops = Router::new()
        .route("/healthz", get(health::healthz))
        .route("/version", get(health::version))
        .route("/metrics", get(health::metrics))
        .route("/metrics/prometheus", get(health::metrics_prometheus));

    let cfg = state.config.clone();
    Router::new()
        .merge(api)
        .merge(files)
        .merge(ops)
        .with_state(state.clone())
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(from_fn_with_state(state, csrf_middleware))
        .layer(from_fn(validate_request_middleware))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(TraceLayer::new_for_http())
        .layer(from_fn_with_state(cfg, security_headers_middleware))
}
