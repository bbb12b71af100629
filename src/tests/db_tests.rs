#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    use crate::db::{self, SqliteStore};
    use crate::store::{Store, StoreError};
    use crate::types::{Download, DownloadLogEntry, DownloadToken, Role, User};

    async fn setup_test_store() -> (SqliteStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let db_url = format!("sqlite://{}", dir.path().join("nested").join("gate.db").display());
        let pool = db::connect(&db_url).await.unwrap();
        (SqliteStore::new(pool), dir)
    }

    #[tokio::test]
    async fn test_connect_creates_database_and_schema() {
        let (store, dir) = setup_test_store().await;
        assert!(dir.path().join("nested").join("gate.db").exists());

        let tables: Vec<String> = sqlx::query_scalar("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .fetch_all(store.pool())
            .await
            .unwrap();
        for table in ["download_log", "downloads", "tokens", "users"] {
            assert!(tables.contains(&table.to_string()), "missing table {}", table);
        }
    }

    #[tokio::test]
    async fn test_user_upsert_round_trip() {
        let (store, _dir) = setup_test_store().await;
        let mut user = User {
            username: "alice".into(),
            hash: "$argon2id$fake".into(),
            email: "alice@example.com".into(),
            name: "Alice".into(),
            role: Role::Admin,
            token: None,
            last_login: Some(Utc.timestamp_millis_opt(1_700_000_000_123).unwrap()),
            modify_date: None,
        };
        store.save_user(&user).await.unwrap();
        assert_eq!(store.load_user("alice").await.unwrap(), user);

        user.role = Role::Customer;
        user.token = Some("tok".into());
        store.save_user(&user).await.unwrap();
        let loaded = store.load_user("alice").await.unwrap();
        assert_eq!(loaded.role, Role::Customer);
        assert_eq!(loaded.token.as_deref(), Some("tok"));
    }

    #[tokio::test]
    async fn test_missing_records_are_not_found() {
        let (store, _dir) = setup_test_store().await;
        assert!(matches!(store.load_user("ghost").await, Err(StoreError::NotFound(_))));
        assert!(matches!(store.load_token("ghost").await, Err(StoreError::NotFound(_))));
        assert!(matches!(store.load_download("ghost").await, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_open_tokens_skip_spent_ones() {
        let (store, _dir) = setup_test_store().await;
        store.save_token(&DownloadToken { name: "b".into(), downloads: 3 }).await.unwrap();
        store.save_token(&DownloadToken { name: "a".into(), downloads: 1 }).await.unwrap();
        store.save_token(&DownloadToken { name: "spent".into(), downloads: 0 }).await.unwrap();
        store.save_token(&DownloadToken { name: "a".into(), downloads: 0 }).await.unwrap();

        let open = store.open_tokens().await.unwrap();
        assert_eq!(open, vec![DownloadToken { name: "b".into(), downloads: 3 }]);
    }

    #[tokio::test]
    async fn test_downloads_and_audit_log() {
        let (store, _dir) = setup_test_store().await;
        let download = Download {
            name: "free".into(),
            path: "/srv/files/installer.bin".into(),
            sha256: "c2hh".into(),
            git_hash: "abc".into(),
            modify_date: Some(Utc.timestamp_millis_opt(1_700_000_000_000).unwrap()),
        };
        store.save_download(&download).await.unwrap();
        assert_eq!(store.load_download("free").await.unwrap(), download);

        store
            .log_download(&DownloadLogEntry {
                username: "alice".into(),
                download: "free".into(),
                host: "10.0.0.1".into(),
                when: Utc::now(),
            })
            .await
            .unwrap();
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM download_log").fetch_one(store.pool()).await.unwrap();
        assert_eq!(count, 1);
    }
}
