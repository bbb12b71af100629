//! # Download Gate
//!
//! The authentication and authorization gate of a file download service.
//! Every request passes an anti-forgery check; identities come either from an
//! encrypted session cookie or from token-link parameters, are checked against
//! per-route role lists, and downloads are metered against finite-use tokens.
//!
//! ## Architecture
//!
//! The application is built using:
//! - **Axum**: web framework for HTTP server and routing
//! - **SQLx**: asynchronous persistence with SQLite
//! - **Tokio**: async runtime; throttle penalties are timer sleeps
//! - **AES-GCM / Argon2**: sealed cookies and password hashes
//!
//! ## Core Components
//!
//! - [`session`]: sealing of session and anti-forgery cookie values
//! - [`throttle`]: bounded brute-force counters with an escalating delay
//! - [`ledger`]: download-token quota metering
//! - [`middleware`]: the CSRF guard, the session gate and request hygiene
//! - [`routes`]: login, token, redemption and download endpoints
//! - [`store`] / [`db`]: the persistence collaborator and its SQLite backend
//! - [`config`]: layered configuration
//! - [`error`]: the uniform error envelope

pub mod config;
pub mod db;
pub mod error;
pub mod ledger;
pub mod metrics;
pub mod middleware;
pub mod password;
pub mod provision;
pub mod routes;
pub mod session;
pub mod state;
pub mod store;
pub mod throttle;
pub mod types;

#[cfg(test)]
mod tests;
