use std::path::Path;

use serde::Deserialize;

/// Key shipped in `config/default.toml`; only fit for local development.
pub const DEVELOPMENT_SESSION_KEY: &str = "kukuKiki1234qawsed.Strazaaplokij";

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Use `X-Forwarded-For` / `X-Real-IP` when deriving the client host.
    #[serde(default)]
    pub trust_proxy_headers: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
    /// Secret the session and anti-forgery cookies are sealed with.
    pub session_key: String,
    /// Session lifetime in minutes, measured from the last refresh.
    pub timeout_minutes: u32,
    /// Route treated like an idempotent request by the CSRF guard.
    pub csrf_exempt_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
    pub cert: String,
    pub key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ThrottleConfig {
    pub capacity: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DownloadsConfig {
    pub default_name: String,
    /// Where uploaded files are stored.
    pub dir: String,
    pub max_upload_mb: usize,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct HeadersConfig {
    pub enable_hsts: Option<bool>,
    pub hsts_max_age: Option<u64>,
    pub hsts_include_subdomains: Option<bool>,
    pub csp: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub security: SecurityConfig,
    pub tls: Option<TlsConfig>,
    pub throttle: ThrottleConfig,
    pub downloads: DownloadsConfig,
    pub headers: Option<HeadersConfig>,
}

impl AppConfig {
    /// Cookies get the `Secure` attribute once a TLS key is configured.
    pub fn secure_cookies(&self) -> bool {
        self.tls.as_ref().map(|t| !t.key.trim().is_empty()).unwrap_or(false)
    }

    pub fn session_timeout_millis(&self) -> i64 {
        i64::from(self.security.timeout_minutes) * 60 * 1000
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        // Fallback: parse the embedded default TOML
        let defaults: &str = include_str!("../config/default.toml");
        match ::config::Config::builder()
            .add_source(::config::File::from_str(defaults, ::config::FileFormat::Toml))
            .build()
        {
            Ok(cfg) => match cfg.try_deserialize() {
                Ok(app_cfg) => app_cfg,
                Err(e) => {
                    eprintln!("FATAL: Failed to deserialize default config: {}", e);
                    panic!("Failed to deserialize default config: {}", e);
                }
            },
            Err(e) => {
                eprintln!("FATAL: Failed to parse default config: {}", e);
                panic!("Failed to parse default config: {}", e);
            }
        }
    }
}

pub fn load() -> anyhow::Result<AppConfig> {
    // Load .env first (optional)
    let _ = dotenvy::dotenv();

    let defaults: &str = include_str!("../config/default.toml");
    let mut builder = ::config::Config::builder()
        .add_source(::config::File::from_str(defaults, ::config::FileFormat::Toml))
        // Optional local file: download-gate.toml (in CWD)
        .add_source(::config::File::with_name("download-gate").required(false));

    if let Ok(custom_path) = std::env::var("DOWNLOAD_GATE_CONFIG") {
        builder = builder.add_source(::config::File::with_name(&custom_path).required(false));
    }
    // Environment variables last to have highest precedence
    builder = builder.add_source(::config::Environment::with_prefix("DOWNLOAD_GATE").separator("__"));

    let cfg = builder.build()?;
    let app_cfg: AppConfig = cfg.try_deserialize()?;
    validate(&app_cfg)?;
    Ok(app_cfg)
}

pub fn validate(cfg: &AppConfig) -> anyhow::Result<()> {
    if cfg.server.port == 0 {
        return Err(anyhow::anyhow!("invalid server.port: {}", cfg.server.port));
    }
    #[cfg(unix)]
    if cfg.server.port < 1024 {
        tracing::warn!("Using privileged port {} - may require elevated permissions", cfg.server.port);
    }

    if cfg.security.session_key.trim().is_empty() {
        return Err(anyhow::anyhow!("security.session_key must not be empty"));
    }
    if cfg.security.session_key == DEVELOPMENT_SESSION_KEY {
        tracing::warn!("security.session_key is the built-in development key; override it in production");
    }
    if cfg.security.timeout_minutes == 0 {
        return Err(anyhow::anyhow!("security.timeout_minutes must be > 0"));
    }
    if !cfg.security.csrf_exempt_path.starts_with('/') {
        return Err(anyhow::anyhow!("security.csrf_exempt_path must start with '/'"));
    }

    if cfg.throttle.capacity == 0 {
        return Err(anyhow::anyhow!("throttle.capacity must be > 0"));
    }

    if cfg.downloads.default_name.trim().is_empty() {
        return Err(anyhow::anyhow!("downloads.default_name must not be empty"));
    }
    if cfg.downloads.dir.trim().is_empty() {
        return Err(anyhow::anyhow!("downloads.dir must not be empty"));
    }
    if cfg.downloads.max_upload_mb == 0 {
        return Err(anyhow::anyhow!("downloads.max_upload_mb must be > 0"));
    }

    Ok(())
}

pub fn ensure_sqlite_parent_dir(url: &str) -> anyhow::Result<()> {
    if let Some(path) = url.strip_prefix("sqlite://") {
        let p = Path::new(path);
        if let Some(parent) = p.parent() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
