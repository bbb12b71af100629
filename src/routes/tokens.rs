//! Download-token administration and redemption.

use axum::{
    extract::State,
    http::{header::SET_COOKIE, HeaderMap},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::ledger::TokenLedger;
use crate::middleware::auth::issue_session_cookie;
use crate::middleware::ip::{client_host, MaybeRemoteAddr};
use crate::middleware::validation::{is_valid_email, JsonBody};
use crate::session::Session;
use crate::state::AppState;
use crate::store::StoreError;
use crate::types::{DownloadToken, NewTokens, RedeemRequest, User};

/// `GET /token` (Admin): tokens that still have downloads left.
pub async fn list_tokens(State(state): State<AppState>) -> AppResult<Json<Vec<DownloadToken>>> {
    Ok(Json(state.store.open_tokens().await?))
}

/// `POST /tokens/generate` (Admin)
pub async fn generate_tokens(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<NewTokens>,
) -> AppResult<Json<Vec<DownloadToken>>> {
    let tokens = state.ledger.issue(req.count, req.downloads).await?;
    tracing::info!(count = tokens.len(), downloads = req.downloads, "Generated download tokens");
    Ok(Json(tokens))
}

/// `POST /token` (Admin): upserts a token as given.
pub async fn save_token(
    State(state): State<AppState>,
    JsonBody(token): JsonBody<DownloadToken>,
) -> AppResult<Json<DownloadToken>> {
    if token.name.trim().is_empty() {
        return Err(AppError::MissingPart);
    }
    if token.downloads < 0 {
        return Err(AppError::BadRequest("downloads must not be negative".to_string()));
    }
    state.store.save_token(&token).await?;
    tracing::info!(token = %token.name, downloads = token.downloads, "Token saved");
    Ok(Json(token))
}

/// `POST /redeem`
///
/// Binds `email` to an existing token and logs the caller in as the
/// resulting Customer. Guessing token names is throttled per host.
pub async fn redeem(
    State(state): State<AppState>,
    MaybeRemoteAddr(remote): MaybeRemoteAddr,
    headers: HeaderMap,
    JsonBody(req): JsonBody<RedeemRequest>,
) -> AppResult<Response> {
    let token_name = req.token.trim();
    let email = req.email.trim();
    if token_name.is_empty() || email.is_empty() {
        return Err(AppError::MissingPart);
    }
    if !is_valid_email(email) {
        return Err(AppError::InvalidEmail);
    }

    let host = client_host(&headers, remote, state.config.server.trust_proxy_headers);
    let token = match state.store.load_token(token_name).await {
        Ok(token) => token,
        Err(StoreError::NotFound(_)) => {
            let count = state.throttle.penalize(&host).await;
            state.metrics.inc_logins_failed(count);
            tracing::warn!(%host, count, "Redemption with unknown token");
            return Err(AppError::BadRequest("Unknown token".to_string()));
        }
        Err(e) => return Err(e.into()),
    };
    if let Err(e) = TokenLedger::check_quota(&token) {
        state.metrics.inc_quota_rejections();
        return Err(e);
    }
    state.throttle.reset(&host);

    let user = User::for_token(&token.name, email);
    state.store.save_user(&user).await?;
    let cookie = issue_session_cookie(&state, &Session::new(user.username.clone()))?;
    tracing::info!(token = %token.name, "Token redeemed");
    Ok(([(SET_COOKIE, cookie)], Json(json!({ "result": true }))).into_response())
}
