use crate::state::AppState;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};

// Liveness probe
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

// Gate counters as JSON
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.get_snapshot())
}

// Prometheus-compatible text exposition format
pub async fn metrics_prometheus(State(state): State<AppState>) -> impl IntoResponse {
    let m = state.metrics.get_snapshot();
    let body = format!(
        "# HELP download_gate_logins_succeeded Successful logins\n# TYPE download_gate_logins_succeeded counter\ndownload_gate_logins_succeeded {}\n\
# HELP download_gate_logins_failed Failed logins and link lookups\n# TYPE download_gate_logins_failed counter\ndownload_gate_logins_failed {}\n\
# HELP download_gate_throttled_attempts Failures that incurred a delay\n# TYPE download_gate_throttled_attempts counter\ndownload_gate_throttled_attempts {}\n\
# HELP download_gate_csrf_rejections Requests rejected by the anti-forgery check\n# TYPE download_gate_csrf_rejections counter\ndownload_gate_csrf_rejections {}\n\
# HELP download_gate_sessions_refreshed Session cookies re-issued\n# TYPE download_gate_sessions_refreshed counter\ndownload_gate_sessions_refreshed {}\n\
# HELP download_gate_downloads_served Files handed out\n# TYPE download_gate_downloads_served counter\ndownload_gate_downloads_served {}\n\
# HELP download_gate_quota_rejections Downloads refused for exhausted tokens\n# TYPE download_gate_quota_rejections counter\ndownload_gate_quota_rejections {}\n\
# HELP download_gate_uptime_seconds Uptime seconds\n# TYPE download_gate_uptime_seconds gauge\ndownload_gate_uptime_seconds {}\n",
        m.logins_succeeded,
        m.logins_failed,
        m.throttled_attempts,
        m.csrf_rejections,
        m.sessions_refreshed,
        m.downloads_served,
        m.quota_rejections,
        m.uptime_seconds,
    );
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}

// Version/Build info endpoint (JSON)
pub async fn version() -> impl IntoResponse {
    let body = serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "package": {
            "description": env!("CARGO_PKG_DESCRIPTION"),
            "license": env!("CARGO_PKG_LICENSE"),
        },
        "build": {
            "profile": if cfg!(debug_assertions) { "debug" } else { "release" },
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
        }
    });
    (StatusCode::OK, Json(body))
}
