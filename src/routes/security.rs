//! Login, logout and user administration.

use axum::{
    extract::State,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;

use crate::error::{AppError, AppResult, StoreResultExt};
use crate::middleware::auth::{issue_session_cookie, AuthContext};
use crate::middleware::cookies::clear_session_cookie;
use crate::middleware::ip::{client_host, MaybeRemoteAddr};
use crate::middleware::validation::{sanitize_for_logging, JsonBody};
use crate::password::{hash_password_blocking, verify_password_blocking};
use crate::session::Session;
use crate::state::AppState;
use crate::store::StoreError;
use crate::throttle::key_for;
use crate::types::{Credentials, User, UserDetails, UserView};

/// `POST /login`
///
/// Every failure, including empty fields, costs the `(host, user)` key a
/// throttle penalty before the response is produced.
pub async fn login(
    State(state): State<AppState>,
    MaybeRemoteAddr(remote): MaybeRemoteAddr,
    headers: HeaderMap,
    JsonBody(creds): JsonBody<Credentials>,
) -> AppResult<Response> {
    let host = client_host(&headers, remote, state.config.server.trust_proxy_headers);
    let key = key_for(&host, &creds.user);

    match check_credentials(&state, &creds).await {
        Ok(mut user) => {
            state.throttle.reset(&key);
            user.last_login = Some(Utc::now());
            state.store.save_user(&user).await?;
            let cookie = issue_session_cookie(&state, &Session::new(user.username.clone()))?;
            state.metrics.inc_logins_succeeded();
            tracing::info!(user = %user.username, %host, "Login succeeded");
            Ok(([(SET_COOKIE, cookie)], Json(UserView::from(&user))).into_response())
        }
        Err(AppError::InvalidCredentials) => {
            let count = state.throttle.penalize(&key).await;
            state.metrics.inc_logins_failed(count);
            tracing::warn!(user = %sanitize_for_logging(&creds.user), %host, count, "Login failed");
            Err(AppError::InvalidCredentials)
        }
        Err(e) => Err(e),
    }
}

async fn check_credentials(state: &AppState, creds: &Credentials) -> AppResult<User> {
    if creds.user.is_empty() || creds.password.is_empty() {
        return Err(AppError::InvalidCredentials);
    }
    let user = state.store.load_user(&creds.user).await.or_missing(AppError::InvalidCredentials)?;
    if user.hash.is_empty() {
        // Token-link identities have no password.
        return Err(AppError::InvalidCredentials);
    }
    if verify_password_blocking(creds.password.clone(), user.hash.clone()).await? {
        Ok(user)
    } else {
        Err(AppError::InvalidCredentials)
    }
}

/// `POST /logout`
pub async fn logout(State(state): State<AppState>, ctx: AuthContext) -> AppResult<Response> {
    let cookie = clear_session_cookie(state.config.secure_cookies()).map_err(|e| AppError::Internal(e.into()))?;
    tracing::info!(user = %ctx.user.username, "Logged out");
    Ok((StatusCode::NO_CONTENT, [(SET_COOKIE, cookie)]).into_response())
}

/// `GET /user`
pub async fn current_user(ctx: AuthContext) -> Json<UserView> {
    Json(UserView::from(&ctx.user))
}

/// `POST /user` (Admin)
pub async fn save_user(
    State(state): State<AppState>,
    ctx: AuthContext,
    JsonBody(details): JsonBody<UserDetails>,
) -> AppResult<Json<UserView>> {
    if details.username.trim().is_empty() || details.password.is_empty() {
        return Err(AppError::MissingPart);
    }
    let last_login = match state.store.load_user(&details.username).await {
        Ok(previous) => previous.last_login,
        Err(StoreError::NotFound(_)) => None,
        Err(e) => return Err(e.into()),
    };
    let hash = hash_password_blocking(details.password).await?;
    let user = User {
        username: details.username,
        hash,
        email: details.email,
        name: details.name,
        role: details.role,
        token: details.token.filter(|t| !t.is_empty()),
        last_login,
        modify_date: Some(Utc::now()),
    };
    state.store.save_user(&user).await?;
    tracing::info!(admin = %ctx.user.username, user = %user.username, role = user.role.as_str(), "User saved");
    Ok(Json(UserView::from(&user)))
}
