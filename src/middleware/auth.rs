//! The authentication gate.
//!
//! Two ways in: the sealed `SD` session cookie (attached per route with
//! [`session_gate`]) and the token-link query parameters used by download
//! links ([`authenticate_link`]). Both end with a loaded [`User`] whose role is
//! on the route's allow-list.

use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::SET_COOKIE, request::Parts, HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};

use super::cookies::{read_cookie, session_cookie, SESSION_COOKIE};
use crate::error::{AppError, AppResult};
use crate::session::{now_millis, Session};
use crate::state::AppState;
use crate::store::StoreError;
use crate::throttle::key_for;
use crate::types::{Role, User};

/// What the gate established about the caller, readable by handlers.
#[derive(Clone, Debug)]
pub struct AuthContext {
    pub user: User,
    /// Roles the route was guarded with. Empty means any identity.
    pub requires: Arc<[Role]>,
}

impl<S> FromRequestParts<S> for AuthContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("handler reached without an authenticated context")))
    }
}

/// State for one guarded route: the app plus the roles it admits.
#[derive(Clone)]
pub struct RouteGuard {
    state: AppState,
    requires: Arc<[Role]>,
}

impl RouteGuard {
    pub fn new(state: &AppState, requires: &[Role]) -> Self {
        Self { state: state.clone(), requires: Arc::from(requires) }
    }

    /// Any authenticated identity passes.
    pub fn any(state: &AppState) -> Self {
        Self::new(state, &[])
    }
}

/// Fails with `Forbidden` unless `user` holds one of `requires`.
pub fn authorize(user: &User, requires: &[Role]) -> AppResult<()> {
    if requires.is_empty() || requires.contains(&user.role) {
        Ok(())
    } else {
        tracing::warn!(user = %user.username, role = user.role.as_str(), "Role not permitted on route");
        Err(AppError::Forbidden)
    }
}

/// Opens the session cookie and checks it has not timed out.
pub fn decode_session(state: &AppState, headers: &HeaderMap) -> AppResult<Session> {
    let raw = read_cookie(headers, SESSION_COOKIE).ok_or(AppError::InvalidSession)?;
    let session = state
        .codec
        .decode(raw)
        .inspect_err(|e| tracing::warn!("Unable to decrypt session: {}", e))?;
    if session.is_expired(now_millis(), state.config.session_timeout_millis()) {
        tracing::debug!(user = %session.user, "Session timeout");
        return Err(AppError::InvalidSession);
    }
    Ok(session)
}

/// Seals `session` into a `Set-Cookie` value.
pub fn issue_session_cookie(state: &AppState, session: &Session) -> AppResult<HeaderValue> {
    let sealed = state.codec.encode(session).map_err(|e| AppError::Internal(e.into()))?;
    session_cookie(&sealed, state.config.security.timeout_minutes, state.config.secure_cookies())
        .map_err(|e| AppError::Internal(e.into()))
}

/// Cookie-path gate, attached per route with `from_fn_with_state`.
///
/// On success the handler sees an [`AuthContext`] and the response carries a
/// re-sealed session with a fresh issued-at, unless the handler already set
/// the session cookie itself (logout).
pub async fn session_gate(State(guard): State<RouteGuard>, mut req: Request, next: Next) -> AppResult<Response> {
    let state = &guard.state;
    let session = decode_session(state, req.headers())?;

    let user = match state.store.load_user(&session.user).await {
        Ok(user) => user,
        Err(StoreError::NotFound(_)) => {
            tracing::warn!(user = %session.user, "Valid session references a user that no longer exists");
            return Err(AppError::Unauthorized);
        }
        Err(e) => return Err(e.into()),
    };
    authorize(&user, &guard.requires)?;

    let refreshed = session.refreshed();
    let cookie = issue_session_cookie(state, &refreshed)?;
    req.extensions_mut().insert(AuthContext {
        user,
        requires: guard.requires.clone(),
    });

    let mut res = next.run(req).await;
    let prefix = format!("{}=", SESSION_COOKIE);
    let handler_set_session = res
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .any(|v| v.as_bytes().starts_with(prefix.as_bytes()));
    if !handler_set_session {
        res.headers_mut().append(SET_COOKIE, cookie);
        state.metrics.inc_sessions_refreshed();
    }
    Ok(res)
}

/// Token-link path: resolves the identity created when `token` was redeemed
/// for `email`. An unknown pair costs the caller a throttle penalty keyed on
/// `host` and the derived username.
pub async fn authenticate_link(
    state: &AppState,
    host: &str,
    token: Option<&str>,
    email: Option<&str>,
    requires: &[Role],
) -> AppResult<User> {
    let (token, email) = match (token.map(str::trim), email.map(str::trim)) {
        (Some(t), Some(e)) if !t.is_empty() && !e.is_empty() => (t, e),
        _ => return Err(AppError::MissingPart),
    };
    let username = User::link_username(token, email);
    let key = key_for(host, &username);

    match state.store.load_user(&username).await {
        Ok(user) => {
            authorize(&user, requires)?;
            state.throttle.reset(&key);
            Ok(user)
        }
        Err(StoreError::NotFound(_)) => {
            tracing::error!(host, "Unable to find user for download link");
            let count = state.throttle.penalize(&key).await;
            state.metrics.inc_logins_failed(count);
            Err(AppError::Unauthorized)
        }
        Err(e) => Err(e.into()),
    }
}
