//! Persistence collaborator consumed by the gate.
//!
//! The gate only ever loads and upserts whole records; there is no
//! transactional API on purpose, see [`crate::ledger`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::types::{Download, DownloadLogEntry, DownloadToken, User};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("store backend failure: {0}")]
    Backend(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound("Record".to_string()),
            other => StoreError::Backend(other.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait Store: Send + Sync {
    async fn load_user(&self, username: &str) -> StoreResult<User>;
    /// Upsert keyed by username.
    async fn save_user(&self, user: &User) -> StoreResult<()>;
    async fn load_token(&self, name: &str) -> StoreResult<DownloadToken>;
    /// Upsert keyed by name.
    async fn save_token(&self, token: &DownloadToken) -> StoreResult<()>;
    /// Tokens that still have downloads left, ordered by name.
    async fn open_tokens(&self) -> StoreResult<Vec<DownloadToken>>;
    async fn load_download(&self, name: &str) -> StoreResult<Download>;
    /// Upsert keyed by name.
    async fn save_download(&self, download: &Download) -> StoreResult<()>;
    /// Appends to the download audit trail.
    async fn log_download(&self, entry: &DownloadLogEntry) -> StoreResult<()>;
}

/// Process-local store for tests and embedding.
#[derive(Clone, Default)]
pub struct MemoryStore {
    users: Arc<RwLock<HashMap<String, User>>>,
    tokens: Arc<RwLock<HashMap<String, DownloadToken>>>,
    downloads: Arc<RwLock<HashMap<String, Download>>>,
    log: Arc<RwLock<Vec<DownloadLogEntry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the audit trail, oldest first.
    pub async fn download_log(&self) -> Vec<DownloadLogEntry> {
        self.log.read().await.clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn load_user(&self, username: &str) -> StoreResult<User> {
        self.users
            .read()
            .await
            .get(username)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("User {}", username)))
    }

    async fn save_user(&self, user: &User) -> StoreResult<()> {
        self.users.write().await.insert(user.username.clone(), user.clone());
        Ok(())
    }

    async fn load_token(&self, name: &str) -> StoreResult<DownloadToken> {
        self.tokens
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("Token {}", name)))
    }

    async fn save_token(&self, token: &DownloadToken) -> StoreResult<()> {
        self.tokens.write().await.insert(token.name.clone(), token.clone());
        Ok(())
    }

    async fn open_tokens(&self) -> StoreResult<Vec<DownloadToken>> {
        let mut open: Vec<DownloadToken> =
            self.tokens.read().await.values().filter(|t| t.downloads > 0).cloned().collect();
        open.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(open)
    }

    async fn load_download(&self, name: &str) -> StoreResult<Download> {
        self.downloads
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("Download {}", name)))
    }

    async fn save_download(&self, download: &Download) -> StoreResult<()> {
        self.downloads.write().await.insert(download.name.clone(), download.clone());
        Ok(())
    }

    async fn log_download(&self, entry: &DownloadLogEntry) -> StoreResult<()> {
        self.log.write().await.push(entry.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upserts_and_lists_open_tokens() {
        let store = MemoryStore::new();
        store.save_token(&DownloadToken { name: "b".into(), downloads: 2 }).await.unwrap();
        store.save_token(&DownloadToken { name: "a".into(), downloads: 1 }).await.unwrap();
        store.save_token(&DownloadToken { name: "spent".into(), downloads: 0 }).await.unwrap();
        store.save_token(&DownloadToken { name: "b".into(), downloads: 5 }).await.unwrap();

        let open = store.open_tokens().await.unwrap();
        let names: Vec<_> = open.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(open[1].downloads, 5);
    }

    #[tokio::test]
    async fn missing_records_are_not_found() {
        let store = MemoryStore::new();
        assert!(matches!(store.load_user("ghost").await, Err(StoreError::NotFound(_))));
        assert!(matches!(store.load_token("ghost").await, Err(StoreError::NotFound(_))));
        assert!(matches!(store.load_download("ghost").await, Err(StoreError::NotFound(_))));
    }
}
