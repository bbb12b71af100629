use std::sync::Arc;

use crate::config::AppConfig;
use crate::ledger::TokenLedger;
use crate::metrics::Metrics;
use crate::session::SessionCodec;
use crate::store::Store;
use crate::throttle::BruteForceThrottle;

/// The shared application state.
///
/// Cheap to clone; every field is either immutable or internally
/// synchronized. The throttle is the only mutable state shared between
/// concurrent requests.
#[derive(Clone)]
pub struct AppState {
    /// Persistence collaborator for users, tokens and downloads.
    pub store: Arc<dyn Store>,
    /// The application configuration.
    pub config: Arc<AppConfig>,
    /// Seals session and anti-forgery cookies under `security.session_key`.
    pub codec: SessionCodec,
    /// Failed-login counters, owned by the serving process.
    pub throttle: BruteForceThrottle,
    /// Download quota metering over `store`.
    pub ledger: TokenLedger,
    /// Gate counters.
    pub metrics: Metrics,
}

impl AppState {
    /// Creates a new `AppState`.
    ///
    /// The throttle is passed in rather than built here so the serving process
    /// owns its lifetime and tests can inspect it.
    pub fn new(store: Arc<dyn Store>, config: AppConfig, throttle: BruteForceThrottle) -> Self {
        let codec = SessionCodec::new(&config.security.session_key);
        Self {
            ledger: TokenLedger::new(store.clone()),
            store,
            config: Arc::new(config),
            codec,
            throttle,
            metrics: Metrics::new(),
        }
    }
}
