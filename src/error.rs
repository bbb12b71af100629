use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::error::Error;
use std::fmt;

use crate::session::CodecError;
use crate::store::StoreError;

/// The primary error type for the application.
///
/// Every handler and middleware returns `Result<_, AppError>`; the response
/// body is always the `{id, status, title, detail}` envelope.
#[derive(Debug)]
pub enum AppError {
    /// Session cookie absent, corrupt or expired.
    InvalidSession,
    /// Anti-forgery token missing, mismatched or not ours.
    CsrfRejected,
    /// No identity for the given session, token or link.
    Unauthorized,
    /// Wrong username or password at login.
    InvalidCredentials,
    /// Authenticated, but the role is not allowed on this route.
    Forbidden,
    /// The download token has no downloads left.
    QuotaExhausted,
    /// Request body is not well-formed.
    BadRequest(String),
    /// Request is missing mandatory parts.
    MissingPart,
    /// Email address failed validation.
    InvalidEmail,
    /// `Accept` does not allow JSON.
    NotAcceptable,
    /// `Content-Type` is not what the route consumes.
    UnsupportedMediaType(&'static str),
    /// A named resource does not exist.
    NotFound(String),
    /// A store collaborator failed.
    Persistence(String),
    /// Anything else that went wrong on our side.
    Internal(anyhow::Error),
}

/// The uniform JSON error body.
#[derive(Debug, Clone, Serialize, serde::Deserialize, PartialEq)]
pub struct ErrorBody {
    pub id: String,
    pub status: u16,
    pub title: String,
    pub detail: String,
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::InvalidSession => write!(f, "Invalid session"),
            AppError::CsrfRejected => write!(f, "CSRF rejected"),
            AppError::Unauthorized => write!(f, "Unauthorized"),
            AppError::InvalidCredentials => write!(f, "Invalid credentials"),
            AppError::Forbidden => write!(f, "Forbidden"),
            AppError::QuotaExhausted => write!(f, "Token quota exhausted"),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::MissingPart => write!(f, "Missing request part"),
            AppError::InvalidEmail => write!(f, "Invalid email"),
            AppError::NotAcceptable => write!(f, "Not acceptable"),
            AppError::UnsupportedMediaType(ct) => write!(f, "Unsupported media type, expected {}", ct),
            AppError::NotFound(what) => write!(f, "Not found: {}", what),
            AppError::Persistence(msg) => write!(f, "Persistence failure: {}", msg),
            AppError::Internal(e) => write!(f, "Internal error: {}", e),
        }
    }
}

impl Error for AppError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            AppError::Internal(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidSession | AppError::Unauthorized | AppError::InvalidCredentials => {
                StatusCode::UNAUTHORIZED
            }
            AppError::CsrfRejected | AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::QuotaExhausted
            | AppError::BadRequest(_)
            | AppError::MissingPart
            | AppError::InvalidEmail => StatusCode::BAD_REQUEST,
            AppError::NotAcceptable => StatusCode::NOT_ACCEPTABLE,
            AppError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Persistence(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Builds the client-facing envelope. Internal causes are logged here and
    /// never copied into the body.
    pub fn body(&self) -> ErrorBody {
        let (id, title, detail) = match self {
            AppError::InvalidSession | AppError::Unauthorized => {
                ("unauthorized", "Unauthorized", "The request requires authorization".to_string())
            }
            AppError::InvalidCredentials => {
                ("invalid_credentials", "Invalid credentials", "Invalid username or password".to_string())
            }
            AppError::CsrfRejected => ("forbidden", "Forbidden", "Issue with CSRF code".to_string()),
            AppError::Forbidden => {
                ("forbidden", "Forbidden", "The request requires the right permissions".to_string())
            }
            AppError::QuotaExhausted => (
                "bad_request",
                "Invalid Token",
                "Token is fully used and no longer allowed to download".to_string(),
            ),
            AppError::BadRequest(msg) => ("bad_request", "Bad request", msg.clone()),
            AppError::MissingPart => {
                ("missing_request", "Bad request", "Request is missing mandatory parts.".to_string())
            }
            AppError::InvalidEmail => ("bad_request", "Invalid Email", "Invalid email provided".to_string()),
            AppError::NotAcceptable => (
                "not_acceptable",
                "Not Acceptable",
                "Accept header must be set to 'application/json'.".to_string(),
            ),
            AppError::UnsupportedMediaType(ct) => (
                "unsupported_media_type",
                "Unsupported Media Type",
                format!("Content-Type header must be set to: '{}'.", ct),
            ),
            AppError::NotFound(what) => ("not_found", "Not Found", format!("{} not found", what)),
            AppError::Persistence(msg) => {
                let error_id = uuid::Uuid::new_v4();
                tracing::error!(%error_id, "Persistence failure: {}", msg);
                ("internal_server_error", "Internal Server Error", "Something went wrong.".to_string())
            }
            AppError::Internal(e) => {
                let error_id = uuid::Uuid::new_v4();
                tracing::error!(%error_id, "Internal error: {:?}", e);
                ("internal_server_error", "Internal Server Error", "Something went wrong.".to_string())
            }
        };
        ErrorBody { id: id.to_string(), status: self.status().as_u16(), title: title.to_string(), detail }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => AppError::NotFound(what),
            StoreError::Backend(msg) => AppError::Persistence(msg),
        }
    }
}

impl From<CodecError> for AppError {
    fn from(_: CodecError) -> Self {
        AppError::InvalidSession
    }
}

/// A type alias for `Result<T, AppError>`, used throughout the application.
pub type AppResult<T> = Result<T, AppError>;

/// An extension trait for store lookups where a missing record means
/// something other than "404".
pub trait StoreResultExt<T> {
    /// Maps `StoreError::NotFound` to `err`, keeping backend failures as 500s.
    fn or_missing(self, err: AppError) -> AppResult<T>;
}

impl<T> StoreResultExt<T> for Result<T, StoreError> {
    fn or_missing(self, err: AppError) -> AppResult<T> {
        match self {
            Ok(v) => Ok(v),
            Err(StoreError::NotFound(_)) => Err(err),
            Err(e) => Err(e.into()),
        }
    }
}
