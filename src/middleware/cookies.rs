//! Cookie names and `Set-Cookie` builders shared by the gate.

use axum::http::{
    header::{InvalidHeaderValue, COOKIE},
    HeaderMap, HeaderValue,
};
use chrono::{Duration, Utc};

/// Sealed session payload. `HttpOnly`.
pub const SESSION_COOKIE: &str = "SD";
/// Anti-forgery marker. Readable by client script so it can be echoed back.
pub const XSRF_COOKIE: &str = "XSRF-TOKEN";
/// Header the client echoes the anti-forgery marker in.
pub const XSRF_HEADER: &str = "X-XSRF-TOKEN";
/// Form field accepted instead of the header for urlencoded bodies.
pub const XSRF_FORM_FIELD: &str = "_xsrf";

const XSRF_MAX_AGE_SECS: i64 = 365 * 24 * 60 * 60;

/// Returns the value of cookie `name`, looking through every `Cookie` header.
pub fn read_cookie<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
}

fn build(name: &str, value: &str, max_age_secs: i64, http_only: bool, secure: bool) -> Result<HeaderValue, InvalidHeaderValue> {
    let expires = (Utc::now() + Duration::seconds(max_age_secs)).format("%a, %d %b %Y %H:%M:%S GMT");
    let mut cookie = format!("{name}={value}; Path=/; Expires={expires}; Max-Age={max_age_secs}; SameSite=Lax");
    if http_only {
        cookie.push_str("; HttpOnly");
    }
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub fn session_cookie(value: &str, timeout_minutes: u32, secure: bool) -> Result<HeaderValue, InvalidHeaderValue> {
    build(SESSION_COOKIE, value, i64::from(timeout_minutes) * 60, true, secure)
}

pub fn clear_session_cookie(secure: bool) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{SESSION_COOKIE}=; Path=/; Max-Age=0; SameSite=Lax; HttpOnly");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub fn xsrf_cookie(value: &str, secure: bool) -> Result<HeaderValue, InvalidHeaderValue> {
    build(XSRF_COOKIE, value, XSRF_MAX_AGE_SECS, false, secure)
}
