use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::header::{ACCEPT, USER_AGENT},
    middleware::Next,
    response::Response,
    Json,
};
use serde::de::DeserializeOwned;

use crate::error::AppError;

/// An Axum middleware that validates incoming requests for common security issues.
///
/// Requests with traversal sequences in the path are rejected with `400`;
/// scanner user agents are only logged.
pub async fn validate_request_middleware(req: Request, next: Next) -> Result<Response, AppError> {
    if contains_path_traversal(req.uri().path()) {
        return Err(AppError::BadRequest("Path traversal detected in request".to_string()));
    }

    if let Some(ua) = req.headers().get(USER_AGENT).and_then(|v| v.to_str().ok()) {
        if is_suspicious_user_agent(ua) {
            tracing::warn!("Suspicious user agent detected: {}", sanitize_for_logging(ua));
        }
    }

    Ok(next.run(req).await)
}

/// Rejects API requests whose `Accept` header does not allow JSON.
pub async fn require_json_accept(req: Request, next: Next) -> Result<Response, AppError> {
    let accepts_json = req
        .headers()
        .get(ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("application/json"))
        .unwrap_or(false);
    if !accepts_json {
        tracing::warn!("Request without accept header received: {} {}", req.method(), req.uri().path());
        return Err(AppError::NotAcceptable);
    }
    Ok(next.run(req).await)
}

/// JSON body extractor that fails with the uniform error envelope.
pub struct JsonBody<T>(pub T);

impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(JsonRejection::MissingJsonContentType(_)) => {
                Err(AppError::UnsupportedMediaType("application/json"))
            }
            Err(rejection) => {
                tracing::warn!("Error handling body: {}", rejection.body_text());
                Err(AppError::BadRequest("Request body is not well-formed. It must be JSON.".to_string()))
            }
        }
    }
}

/// Loose structural email check: one `@`, a non-empty local part and a dotted domain.
pub fn is_valid_email(email: &str) -> bool {
    if email.len() > 254 || email.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2 && labels.iter().all(|l| !l.is_empty() && !l.starts_with('-') && !l.ends_with('-'))
}

/// Check if a path contains traversal attempts
fn contains_path_traversal(path: &str) -> bool {
    let lower = path.to_lowercase();

    if path.contains("/..") || path.contains("\\..") || path.starts_with("..") {
        return true;
    }
    if path.contains("/./") || path.contains("\\.\\") {
        return true;
    }
    if path.contains("....") {
        return true;
    }

    // URL-encoded variants (single and double encoding)
    let encoded_patterns = ["%2e%2e", "%252e%252e", "%2e/", "%252e%2f", "/%2e", "%2f%2e", "%2e%5c", "%5c%2e", "%00"];
    if encoded_patterns.iter().any(|p| lower.contains(p)) {
        return true;
    }

    path.contains('\0')
}

/// Check for suspicious user agents (simple heuristic)
fn is_suspicious_user_agent(ua: &str) -> bool {
    let ua_lower = ua.to_lowercase();
    ua_lower.contains("scanner")
        || ua_lower.contains("nikto")
        || ua_lower.contains("sqlmap")
        || ua_lower.contains("hydra")
        || ua_lower.contains("acunetix")
}

/// Strips control characters and caps length so attacker-supplied values
/// (usernames, emails) can be logged safely.
pub fn sanitize_for_logging(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_control())
        .take(200)
        .collect::<String>()
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_traversal_detection() {
        assert!(contains_path_traversal("../etc/passwd"));
        assert!(contains_path_traversal("/download/../etc"));
        assert!(contains_path_traversal("%2e%2e/etc"));
        assert!(contains_path_traversal("path\0with\0null"));

        assert!(!contains_path_traversal("/download"));
        assert!(!contains_path_traversal("/check-download-params"));
    }

    #[test]
    fn test_suspicious_user_agents() {
        assert!(is_suspicious_user_agent("sqlmap/1.0"));
        assert!(is_suspicious_user_agent("Hydra v9.4"));
        assert!(!is_suspicious_user_agent("Mozilla/5.0 (X11; Linux x86_64)"));
    }

    #[test]
    fn test_email_validation() {
        assert!(is_valid_email("someone@example.com"));
        assert!(is_valid_email("first.last+tag@mail.example.org"));

        assert!(!is_valid_email(""));
        assert!(!is_valid_email("no-at-sign"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("a@localhost"));
        assert!(!is_valid_email("a@b@c.com"));
        assert!(!is_valid_email("a b@c.com"));
        assert!(!is_valid_email("a@.com"));
    }

    #[test]
    fn test_sanitize_for_logging() {
        assert_eq!(sanitize_for_logging("slavik"), "slavik");
        assert!(!sanitize_for_logging("evil\nINFO forged line").contains('\n'));
        assert_eq!(sanitize_for_logging(&"a".repeat(300)).len(), 200);
    }
}
