//! Metered downloads and the uploads that feed them.
//!
//! Customers download against the quota of the token they redeemed; Admins are
//! not metered. The token is only charged once the file service has produced a
//! successful response for a `GET`.

use std::path::{Path, PathBuf};

use axum::{
    body::Body,
    extract::{multipart::MultipartRejection, Multipart, Query, Request, State},
    http::{header::CONTENT_DISPOSITION, HeaderMap, HeaderValue, Method, StatusCode},
    response::Response,
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::Utc;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tower::ServiceExt;
use tower_http::services::ServeFile;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::{authenticate_link, AuthContext};
use crate::middleware::ip::{client_host, MaybeRemoteAddr};
use crate::state::AppState;
use crate::types::{Download, DownloadLogEntry, DownloadParams, DownloadToken, LinkParams, Role, User};

/// Roles allowed to download at all.
pub const DOWNLOADERS: &[Role] = &[Role::Customer, Role::Admin];

/// `GET /check-download`
pub async fn check_download(State(state): State<AppState>, ctx: AuthContext) -> AppResult<Json<Value>> {
    metered_token(&state, &ctx.user).await?;
    Ok(Json(json!({ "result": true })))
}

/// `GET /check-download-params?token&email`
pub async fn check_download_params(
    State(state): State<AppState>,
    MaybeRemoteAddr(remote): MaybeRemoteAddr,
    headers: HeaderMap,
    Query(params): Query<LinkParams>,
) -> AppResult<Json<Value>> {
    let host = client_host(&headers, remote, state.config.server.trust_proxy_headers);
    let user = link_user(&state, &host, &params).await?;
    metered_token(&state, &user).await?;
    Ok(Json(json!({ "result": true })))
}

/// `GET /download?downloadName`
pub async fn download(
    State(state): State<AppState>,
    ctx: AuthContext,
    MaybeRemoteAddr(remote): MaybeRemoteAddr,
    Query(params): Query<DownloadParams>,
    req: Request,
) -> AppResult<Response> {
    let host = client_host(req.headers(), remote, state.config.server.trust_proxy_headers);
    serve(&state, &ctx.user, &host, params.download_name, req).await
}

/// `GET /download-params?token&email&downloadName`
pub async fn download_params(
    State(state): State<AppState>,
    MaybeRemoteAddr(remote): MaybeRemoteAddr,
    Query(params): Query<LinkParams>,
    req: Request,
) -> AppResult<Response> {
    let host = client_host(req.headers(), remote, state.config.server.trust_proxy_headers);
    let user = link_user(&state, &host, &params).await?;
    serve(&state, &user, &host, params.download_name, req).await
}

async fn link_user(state: &AppState, host: &str, params: &LinkParams) -> AppResult<User> {
    authenticate_link(state, host, params.token.as_deref(), params.email.as_deref(), DOWNLOADERS).await
}

/// The token a download by `user` is charged to, after checking it has quota.
/// `None` for unmetered (Admin) identities.
async fn metered_token(state: &AppState, user: &User) -> AppResult<Option<DownloadToken>> {
    if user.role != Role::Customer {
        return Ok(None);
    }
    let name = user
        .token
        .as_deref()
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("customer {} has no download token", user.username)))?;
    match state.ledger.ensure_available(name).await {
        Ok(token) => Ok(Some(token)),
        Err(AppError::NotFound(_)) => {
            Err(AppError::Internal(anyhow::anyhow!("token {} of customer {} is missing", name, user.username)))
        }
        Err(AppError::QuotaExhausted) => {
            state.metrics.inc_quota_rejections();
            tracing::info!(user = %user.username, token = name, "Download refused, quota exhausted");
            Err(AppError::QuotaExhausted)
        }
        Err(e) => Err(e),
    }
}

async fn serve(
    state: &AppState,
    user: &User,
    host: &str,
    name: Option<String>,
    req: Request,
) -> AppResult<Response> {
    let token = metered_token(state, user).await?;
    let name = name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| state.config.downloads.default_name.clone());
    let download = state.store.load_download(&name).await?;

    let path = PathBuf::from(&download.path);
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("download {} has no file name", download.name)))?;
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{}\"", file_name.replace('"', "")))
        .map_err(|e| AppError::Internal(e.into()))?;

    let charge = req.method() == Method::GET;
    let res = match ServeFile::new(&path).oneshot(req).await {
        Ok(res) => res,
        Err(never) => match never {},
    };
    let mut res = res.map(Body::new);

    if res.status() == StatusCode::NOT_FOUND {
        return Err(AppError::Internal(anyhow::anyhow!(
            "file {} for download {} is not readable",
            path.display(),
            download.name
        )));
    }
    if !res.status().is_success() {
        return Ok(res);
    }
    res.headers_mut().insert(CONTENT_DISPOSITION, disposition);
    tracing::info!(user = %user.username, download = %download.name, "Downloading file {}", file_name);
    state.metrics.inc_downloads_served();

    if !charge {
        return Ok(res);
    }
    if let Some(token) = token {
        if let Err(e) = state.ledger.consume(&token.name).await {
            tracing::error!(token = %token.name, "Unable to decrement token after download: {}", e);
        }
    }
    let entry = DownloadLogEntry {
        username: user.username.clone(),
        download: download.name.clone(),
        host: host.to_string(),
        when: Utc::now(),
    };
    if let Err(e) = state.store.log_download(&entry).await {
        tracing::error!(user = %user.username, download = %download.name, "Unable to log download: {}", e);
    }
    Ok(res)
}

/// A file streamed to disk under a temporary name, plus the form fields that
/// came with it.
struct ReceivedUpload {
    temp_path: PathBuf,
    sha256: String,
    original_name: Option<String>,
    name: Option<String>,
    file_name: Option<String>,
    git_hash: Option<String>,
}

/// `POST /upload` (Admin, multipart)
///
/// Fields: `file` (required), `name` (download name), `fileName` (overrides
/// the uploaded file name) and `gitHash`. The file lands in `downloads.dir`
/// under its base name and the download record is replaced.
pub async fn upload(
    State(state): State<AppState>,
    ctx: AuthContext,
    multipart: Result<Multipart, MultipartRejection>,
) -> AppResult<Json<Value>> {
    let multipart = multipart.map_err(|_| AppError::UnsupportedMediaType("multipart/form-data"))?;
    let dir = PathBuf::from(&state.config.downloads.dir);
    tokio::fs::create_dir_all(&dir).await.map_err(|e| AppError::Internal(e.into()))?;

    let temp_path = dir.join(format!(".upload-{}", uuid::Uuid::new_v4()));
    let result = match receive_upload(multipart, temp_path.clone()).await {
        Ok(received) => store_upload(&state, &dir, &received).await,
        Err(e) => Err(e),
    };
    let download = match result {
        Ok(download) => download,
        Err(e) => {
            // Once renamed into place the temp path no longer exists.
            if let Err(rm) = tokio::fs::remove_file(&temp_path).await {
                if rm.kind() != std::io::ErrorKind::NotFound {
                    tracing::error!(path = %temp_path.display(), "Unable to remove partial upload: {}", rm);
                }
            }
            return Err(e);
        }
    };
    tracing::info!(admin = %ctx.user.username, download = %download.name, path = %download.path, "Upload stored");
    Ok(Json(json!({ "result": true })))
}

/// Streams the `file` part to `temp_path`. The caller removes `temp_path`
/// when this fails.
async fn receive_upload(mut multipart: Multipart, temp_path: PathBuf) -> AppResult<ReceivedUpload> {
    let malformed = |e: axum::extract::multipart::MultipartError| {
        tracing::warn!("Failed reading multipart upload: {}", e);
        AppError::BadRequest("Malformed multipart body".to_string())
    };
    let mut received = ReceivedUpload {
        temp_path,
        sha256: String::new(),
        original_name: None,
        name: None,
        file_name: None,
        git_hash: None,
    };
    let mut got_file = false;

    while let Some(mut field) = multipart.next_field().await.map_err(malformed)? {
        match field.name() {
            Some("file") if !got_file => {
                received.original_name = field.file_name().map(str::to_string);
                let mut out = tokio::fs::File::create(&received.temp_path)
                    .await
                    .map_err(|e| AppError::Internal(e.into()))?;
                let mut hasher = Sha256::new();
                while let Some(chunk) = field.chunk().await.map_err(malformed)? {
                    hasher.update(&chunk);
                    out.write_all(&chunk).await.map_err(|e| AppError::Internal(e.into()))?;
                }
                out.flush().await.map_err(|e| AppError::Internal(e.into()))?;
                received.sha256 = STANDARD.encode(hasher.finalize());
                got_file = true;
            }
            Some("name") => received.name = Some(field.text().await.map_err(malformed)?),
            Some("fileName") => received.file_name = Some(field.text().await.map_err(malformed)?),
            Some("gitHash") => received.git_hash = Some(field.text().await.map_err(malformed)?),
            _ => {}
        }
    }

    if !got_file {
        return Err(AppError::MissingPart);
    }
    Ok(received)
}

async fn store_upload(state: &AppState, dir: &Path, received: &ReceivedUpload) -> AppResult<Download> {
    let name = received.name.as_deref().map(str::trim).filter(|n| !n.is_empty()).ok_or(AppError::MissingPart)?;
    let requested = received
        .file_name
        .as_deref()
        .filter(|n| !n.is_empty())
        .or(received.original_name.as_deref())
        .unwrap_or_default();
    let base = Path::new(requested)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.starts_with(".upload-"))
        .ok_or_else(|| {
            tracing::error!("Received weird file name - {}", requested);
            AppError::BadRequest("Invalid file name".to_string())
        })?;

    let final_path = dir.join(base);
    tokio::fs::rename(&received.temp_path, &final_path).await.map_err(|e| AppError::Internal(e.into()))?;

    let download = Download {
        name: name.to_string(),
        path: final_path.to_string_lossy().into_owned(),
        sha256: received.sha256.clone(),
        git_hash: received.git_hash.clone().filter(|h| !h.is_empty()).unwrap_or_else(|| "N/A".to_string()),
        modify_date: Some(Utc::now()),
    };
    state.store.save_download(&download).await?;
    Ok(download)
}
