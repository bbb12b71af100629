//! Middleware components for HTTP request processing.
//!
//! The gate itself lives here: the anti-forgery guard, the session gate and
//! the cookie helpers they share, alongside the request hygiene layers
//! (security headers, content negotiation, panic recovery).

pub mod auth;
pub mod cookies;
pub mod csrf;
pub mod ip;
pub mod recover;
pub mod security_headers;
pub mod validation;

pub use auth::{AuthContext, RouteGuard};
