//! Cross-Site Request Forgery (CSRF) protection middleware.
//!
//! Double-submit scheme: the server hands out a sealed marker in the
//! `XSRF-TOKEN` cookie and every state-changing request must echo the same
//! value in the `X-XSRF-TOKEN` header (or the `_xsrf` field of a urlencoded
//! form). Nothing is stored server-side; the marker only has to open under our
//! key and equal the cookie copy.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{
        header::{CONTENT_TYPE, SET_COOKIE},
        Method,
    },
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

use super::auth::decode_session;
use super::cookies::{read_cookie, xsrf_cookie, XSRF_COOKIE, XSRF_FORM_FIELD, XSRF_HEADER};
use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Upper bound on urlencoded bodies buffered to look for the form field.
const MAX_FORM_BYTES: usize = 64 * 1024;

/// CSRF protection middleware.
///
/// Idempotent requests (and the configured exempt path) always pass and get a
/// fresh marker cookie when they carry none or carry no valid session.
/// Everything else must present a matching marker pair or is rejected with
/// `403`.
pub async fn csrf_middleware(State(state): State<AppState>, req: Request, next: Next) -> AppResult<Response> {
    let method = req.method().clone();
    let exempt = req.uri().path() == state.config.security.csrf_exempt_path;

    if matches!(method, Method::GET | Method::HEAD) || exempt {
        let should_mint = read_cookie(req.headers(), XSRF_COOKIE).is_none()
            || decode_session(&state, req.headers()).is_err();
        let mut res = next.run(req).await;
        if should_mint {
            match state.codec.mint_marker().map_err(anyhow::Error::from).and_then(|marker| {
                xsrf_cookie(&marker, state.config.secure_cookies()).map_err(anyhow::Error::from)
            }) {
                Ok(cookie) => {
                    res.headers_mut().append(SET_COOKIE, cookie);
                }
                Err(e) => tracing::error!("Unable to generate CSRF: {}", e),
            }
        }
        return Ok(res);
    }

    let cookie = read_cookie(req.headers(), XSRF_COOKIE).map(str::to_string);
    let (req, submitted) = submitted_token(req).await?;

    match (cookie.as_deref(), submitted.as_deref()) {
        (Some(cookie), Some(submitted)) if tokens_match(cookie, submitted) => {
            if state.codec.is_marker(submitted) {
                return Ok(next.run(req).await);
            }
            tracing::error!("Failed to execute {} method because of csrf: marker did not open", method);
        }
        (None, _) => tracing::warn!("Csrf issue for method {}: no cookie", method),
        (_, None) => tracing::warn!("Csrf issue for method {}: no submitted token", method),
        _ => tracing::warn!("Csrf issue for method {}: token mismatch", method),
    }
    state.metrics.inc_csrf_rejections();
    Err(AppError::CsrfRejected)
}

fn tokens_match(cookie: &str, submitted: &str) -> bool {
    cookie.as_bytes().ct_eq(submitted.as_bytes()).into()
}

/// Pulls the echoed marker from the header, falling back to the `_xsrf` field
/// of a urlencoded body. The body is buffered and handed back intact.
async fn submitted_token(req: Request) -> AppResult<(Request, Option<String>)> {
    if let Some(v) = req.headers().get(XSRF_HEADER).and_then(|v| v.to_str().ok()) {
        let v = v.trim().to_string();
        return Ok((req, Some(v).filter(|v| !v.is_empty())));
    }

    let is_form = req
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false);
    if !is_form {
        return Ok((req, None));
    }

    let (parts, body) = req.into_parts();
    let bytes = axum::body::to_bytes(body, MAX_FORM_BYTES)
        .await
        .map_err(|_| AppError::BadRequest("Form body is too large or unreadable".to_string()))?;
    let token = url::form_urlencoded::parse(&bytes)
        .find(|(k, _)| k == XSRF_FORM_FIELD)
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty());
    Ok((Request::from_parts(parts, Body::from(bytes)), token))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_comparison_is_exact() {
        assert!(tokens_match("abc", "abc"));
        assert!(!tokens_match("abc", "abd"));
        assert!(!tokens_match("abc", "abcd"));
        assert!(!tokens_match("", "a"));
    }

    #[tokio::test]
    async fn reads_token_from_header_first() {
        let req = Request::builder()
            .method(Method::POST)
            .header(XSRF_HEADER, "from-header")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("_xsrf=from-form"))
            .unwrap();
        let (_, token) = submitted_token(req).await.unwrap();
        assert_eq!(token.as_deref(), Some("from-header"));
    }

    #[tokio::test]
    async fn reads_token_from_form_and_preserves_body() {
        let req = Request::builder()
            .method(Method::POST)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("a=1&_xsrf=abc%2Bdef"))
            .unwrap();
        let (req, token) = submitted_token(req).await.unwrap();
        assert_eq!(token.as_deref(), Some("abc+def"));
        let body = axum::body::to_bytes(req.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"a=1&_xsrf=abc%2Bdef");
    }

    #[tokio::test]
    async fn json_bodies_are_not_searched() {
        let req = Request::builder()
            .method(Method::POST)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"_xsrf":"x"}"#))
            .unwrap();
        let (_, token) = submitted_token(req).await.unwrap();
        assert_eq!(token, None);
    }
}
