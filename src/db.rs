use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use sqlx::{
    migrate::MigrateDatabase,
    sqlite::{SqlitePoolOptions, SqliteRow},
    Row, Sqlite, SqlitePool,
};

use crate::store::{Store, StoreError, StoreResult};
use crate::types::{Download, DownloadLogEntry, DownloadToken, Role, User};

/// Opens (creating if needed) the SQLite database at `url` and bootstraps the
/// schema.
pub async fn connect(url: &str) -> anyhow::Result<SqlitePool> {
    crate::config::ensure_sqlite_parent_dir(url)?;
    if !Sqlite::database_exists(url).await.unwrap_or(false) {
        tracing::info!("Creating SQLite database at {}", url);
        Sqlite::create_database(url).await?;
    }
    let pool = SqlitePoolOptions::new()
        .max_connections(16)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                let _ = sqlx::query("PRAGMA busy_timeout=10000;").execute(&mut *conn).await;
                let _ = sqlx::query("PRAGMA temp_store=MEMORY;").execute(&mut *conn).await;
                Ok(())
            })
        })
        .connect(url)
        .await?;
    init_db(&pool).await?;
    Ok(pool)
}

pub async fn init_db(pool: &SqlitePool) -> anyhow::Result<()> {
    // Pragmas for better durability/performance
    if let Err(e) = sqlx::query("PRAGMA journal_mode=WAL;").execute(pool).await {
        tracing::warn!("Failed to set WAL journal mode: {}", e);
    }
    if let Err(e) = sqlx::query("PRAGMA synchronous=NORMAL;").execute(pool).await {
        tracing::warn!("Failed to set synchronous mode: {}", e);
    }
    if let Err(e) = sqlx::query("PRAGMA busy_timeout=10000;").execute(pool).await {
        tracing::warn!("Failed to set busy_timeout: {}", e);
    }

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS users (
            username TEXT PRIMARY KEY,
            hash TEXT NOT NULL,
            email TEXT NOT NULL,
            name TEXT NOT NULL,
            role TEXT NOT NULL,
            token TEXT NULL,
            last_login INTEGER NULL,
            modify_date INTEGER NULL
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS tokens (
            name TEXT PRIMARY KEY,
            downloads INTEGER NOT NULL
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS downloads (
            name TEXT PRIMARY KEY,
            path TEXT NOT NULL,
            sha256 TEXT NOT NULL DEFAULT '',
            git_hash TEXT NOT NULL DEFAULT '',
            modify_date INTEGER NULL
        )"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS download_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            username TEXT NOT NULL,
            download TEXT NOT NULL,
            host TEXT NOT NULL,
            ts INTEGER NOT NULL
        )"#,
    )
    .execute(pool)
    .await?;

    if let Err(e) =
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_tokens_downloads ON tokens(downloads)").execute(pool).await
    {
        tracing::warn!("Failed to create index idx_tokens_downloads: {}", e);
    }

    Ok(())
}

fn to_millis(ts: Option<DateTime<Utc>>) -> Option<i64> {
    ts.map(|t| t.timestamp_millis())
}

fn from_millis(ms: Option<i64>) -> Option<DateTime<Utc>> {
    ms.and_then(|m| Utc.timestamp_millis_opt(m).single())
}

fn user_from_row(row: &SqliteRow) -> StoreResult<User> {
    let role: String = row.try_get("role")?;
    let role = Role::parse(&role).ok_or_else(|| StoreError::Backend(format!("unknown role '{}'", role)))?;
    Ok(User {
        username: row.try_get("username")?,
        hash: row.try_get("hash")?,
        email: row.try_get("email")?,
        name: row.try_get("name")?,
        role,
        token: row.try_get("token")?,
        last_login: from_millis(row.try_get("last_login")?),
        modify_date: from_millis(row.try_get("modify_date")?),
    })
}

fn token_from_row(row: &SqliteRow) -> StoreResult<DownloadToken> {
    Ok(DownloadToken { name: row.try_get("name")?, downloads: row.try_get("downloads")? })
}

/// [`Store`] backed by a SQLite pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn load_user(&self, username: &str) -> StoreResult<User> {
        let row = sqlx::query("SELECT * FROM users WHERE username = ?1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("User {}", username)))?;
        user_from_row(&row)
    }

    async fn save_user(&self, user: &User) -> StoreResult<()> {
        sqlx::query(
            r#"INSERT INTO users (username, hash, email, name, role, token, last_login, modify_date)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
               ON CONFLICT(username) DO UPDATE SET
                 hash = excluded.hash,
                 email = excluded.email,
                 name = excluded.name,
                 role = excluded.role,
                 token = excluded.token,
                 last_login = excluded.last_login,
                 modify_date = excluded.modify_date"#,
        )
        .bind(&user.username)
        .bind(&user.hash)
        .bind(&user.email)
        .bind(&user.name)
        .bind(user.role.as_str())
        .bind(&user.token)
        .bind(to_millis(user.last_login))
        .bind(to_millis(user.modify_date))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_token(&self, name: &str) -> StoreResult<DownloadToken> {
        let row = sqlx::query("SELECT name, downloads FROM tokens WHERE name = ?1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("Token {}", name)))?;
        token_from_row(&row)
    }

    async fn save_token(&self, token: &DownloadToken) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO tokens (name, downloads) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET downloads = excluded.downloads",
        )
        .bind(&token.name)
        .bind(token.downloads)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn open_tokens(&self) -> StoreResult<Vec<DownloadToken>> {
        let rows = sqlx::query("SELECT name, downloads FROM tokens WHERE downloads > 0 ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(token_from_row).collect()
    }

    async fn load_download(&self, name: &str) -> StoreResult<Download> {
        let row = sqlx::query("SELECT name, path, sha256, git_hash, modify_date FROM downloads WHERE name = ?1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("Download {}", name)))?;
        Ok(Download {
            name: row.try_get("name")?,
            path: row.try_get("path")?,
            sha256: row.try_get("sha256")?,
            git_hash: row.try_get("git_hash")?,
            modify_date: from_millis(row.try_get("modify_date")?),
        })
    }

    async fn save_download(&self, download: &Download) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO downloads (name, path, sha256, git_hash, modify_date) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(name) DO UPDATE SET path = excluded.path, sha256 = excluded.sha256,
             git_hash = excluded.git_hash, modify_date = excluded.modify_date",
        )
        .bind(&download.name)
        .bind(&download.path)
        .bind(&download.sha256)
        .bind(&download.git_hash)
        .bind(to_millis(download.modify_date))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn log_download(&self, entry: &DownloadLogEntry) -> StoreResult<()> {
        sqlx::query("INSERT INTO download_log (username, download, host, ts) VALUES (?1, ?2, ?3, ?4)")
            .bind(&entry.username)
            .bind(&entry.download)
            .bind(&entry.host)
            .bind(entry.when.timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
