//! Download-quota metering.
//!
//! `consume` is a plain read-modify-write against the store. Two concurrent
//! downloads on the same token can both read the same counter and write back
//! the same decrement, granting one extra download. That race is accepted at
//! the expected request volume and is not guarded with locking.

use std::sync::Arc;

use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};

use crate::error::{AppError, AppResult};
use crate::store::Store;
use crate::types::DownloadToken;

/// Length of generated token names.
pub const TOKEN_NAME_LEN: usize = 10;

/// Largest batch `issue` will mint at once.
pub const MAX_ISSUE_BATCH: u32 = 50;

#[derive(Clone)]
pub struct TokenLedger {
    store: Arc<dyn Store>,
}

impl TokenLedger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Fails with `QuotaExhausted` once the token has no downloads left.
    pub fn check_quota(token: &DownloadToken) -> AppResult<()> {
        if token.downloads < 1 {
            return Err(AppError::QuotaExhausted);
        }
        Ok(())
    }

    /// Loads `name` and checks it still has quota.
    pub async fn ensure_available(&self, name: &str) -> AppResult<DownloadToken> {
        let token = self.store.load_token(name).await?;
        Self::check_quota(&token)?;
        Ok(token)
    }

    /// Takes one download off `name` and persists the result.
    pub async fn consume(&self, name: &str) -> AppResult<DownloadToken> {
        let mut token = self.store.load_token(name).await?;
        Self::check_quota(&token)?;
        token.downloads -= 1;
        self.store.save_token(&token).await?;
        tracing::debug!(token = %token.name, remaining = token.downloads, "Download token consumed");
        Ok(token)
    }

    /// Mints `count` fresh tokens, each allowing `downloads` downloads.
    pub async fn issue(&self, count: u32, downloads: i64) -> AppResult<Vec<DownloadToken>> {
        if count < 1 || count > MAX_ISSUE_BATCH {
            return Err(AppError::BadRequest(format!("count must be between 1 and {}", MAX_ISSUE_BATCH)));
        }
        if downloads < 0 {
            return Err(AppError::BadRequest("downloads must not be negative".to_string()));
        }
        let mut tokens = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let token = DownloadToken { name: random_name(TOKEN_NAME_LEN), downloads };
            self.store.save_token(&token).await?;
            tokens.push(token);
        }
        Ok(tokens)
    }
}

pub fn random_name(len: usize) -> String {
    OsRng.sample_iter(&Alphanumeric).take(len).map(char::from).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    async fn ledger_with(name: &str, downloads: i64) -> (TokenLedger, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        store.save_token(&DownloadToken { name: name.into(), downloads }).await.unwrap();
        (TokenLedger::new(store.clone()), store)
    }

    #[tokio::test]
    async fn single_use_token_is_consumed_exactly_once() {
        let (ledger, store) = ledger_with("once", 1).await;
        let after = ledger.consume("once").await.unwrap();
        assert_eq!(after.downloads, 0);
        assert!(matches!(ledger.consume("once").await, Err(AppError::QuotaExhausted)));
        assert_eq!(store.load_token("once").await.unwrap().downloads, 0);
    }

    #[tokio::test]
    async fn spent_token_is_rejected_immediately() {
        let (ledger, _) = ledger_with("spent", 0).await;
        assert!(matches!(ledger.ensure_available("spent").await, Err(AppError::QuotaExhausted)));
        assert!(matches!(ledger.consume("spent").await, Err(AppError::QuotaExhausted)));
    }

    #[tokio::test]
    async fn unknown_token_is_not_found() {
        let (ledger, _) = ledger_with("x", 3).await;
        assert!(matches!(ledger.consume("nope").await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn issue_mints_distinct_alphanumeric_names() {
        let (ledger, store) = ledger_with("x", 0).await;
        let tokens = ledger.issue(5, 3).await.unwrap();
        assert_eq!(tokens.len(), 5);
        for t in &tokens {
            assert_eq!(t.name.len(), TOKEN_NAME_LEN);
            assert!(t.name.chars().all(|c| c.is_ascii_alphanumeric()));
            assert_eq!(store.load_token(&t.name).await.unwrap().downloads, 3);
        }
        let mut names: Vec<_> = tokens.iter().map(|t| t.name.clone()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 5);
    }

    #[tokio::test]
    async fn issue_rejects_out_of_range_batches() {
        let (ledger, _) = ledger_with("x", 0).await;
        assert!(matches!(ledger.issue(0, 1).await, Err(AppError::BadRequest(_))));
        assert!(matches!(ledger.issue(51, 1).await, Err(AppError::BadRequest(_))));
        assert!(matches!(ledger.issue(1, -1).await, Err(AppError::BadRequest(_))));
    }
}
