use std::{env, net::SocketAddr, str::FromStr, time::Duration};

use anyhow::Context;

use crate::auth::JwtKeys;

pub const DEFAULT_JWT_SECRET: &str = "fallback-secret";
pub const DEFAULT_JWT_EXPIRY_HOURS: i64 = 24;

/// Token lifetime for `hours`; `None` when it is not positive or out of range.
pub fn token_ttl(hours: i64) -> Option<chrono::Duration> {
    chrono::Duration::try_hours(hours).filter(|ttl| *ttl > chrono::Duration::zero())
}

/// How the todo store is chosen at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    /// Try SQLite, fall back to memory when it cannot be opened in time.
    Auto,
    Sqlite,
    Memory,
}

impl FromStr for StorageMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(StorageMode::Auto),
            "sqlite" | "database" | "db" => Ok(StorageMode::Sqlite),
            "memory" | "in-memory" | "fallback" => Ok(StorageMode::Memory),
            other => Err(format!("unknown storage mode {other:?}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub storage: StorageMode,
    pub connect_timeout: Duration,
    pub jwt_secret: String,
    pub jwt_expiry_hours: i64,
    pub frontend_url: String,
    pub max_page_limit: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            database_url: "sqlite://todos.db".to_string(),
            storage: StorageMode::Auto,
            connect_timeout: Duration::from_millis(2000),
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            jwt_expiry_hours: DEFAULT_JWT_EXPIRY_HOURS,
            frontend_url: "http://localhost:3000".to_string(),
            max_page_limit: 100,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self { Self::from_lookup(|key| env::var(key).ok()) }

    /// Defaults overridden by whatever `lookup` yields; unparseable values keep the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(v) = lookup("HOST") { config.host = v; }
        if let Some(v) = lookup("PORT") { config.port = v.parse().unwrap_or(config.port); }
        if let Some(v) = lookup("DATABASE_URL") { config.database_url = v; }
        if let Some(v) = lookup("STORAGE") {
            match v.parse() {
                Ok(mode) => config.storage = mode,
                Err(e) => tracing::warn!(error = %e, "ignoring STORAGE"),
            }
        }
        if let Some(v) = lookup("DATABASE_CONNECT_TIMEOUT_MS") {
            if let Ok(ms) = v.parse::<u64>() { config.connect_timeout = Duration::from_millis(ms); }
        }
        if let Some(v) = lookup("JWT_SECRET").filter(|v| !v.is_empty()) { config.jwt_secret = v; }
        if let Some(v) = lookup("JWT_EXPIRY_HOURS") {
            match v.parse::<i64>() {
                Ok(hours) if token_ttl(hours).is_some() => config.jwt_expiry_hours = hours,
                _ => tracing::warn!(value = %v, "ignoring JWT_EXPIRY_HOURS"),
            }
        }
        if let Some(v) = lookup("FRONTEND_URL") { config.frontend_url = v; }
        if let Some(v) = lookup("MAX_PAGE_LIMIT") {
            config.max_page_limit = v.parse::<u32>().ok().filter(|n| *n > 0).unwrap_or(config.max_page_limit);
        }

        config
    }

    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", self.host, self.port))
    }

    pub fn jwt_keys(&self) -> JwtKeys {
        let ttl = token_ttl(self.jwt_expiry_hours).unwrap_or_else(|| chrono::Duration::hours(DEFAULT_JWT_EXPIRY_HOURS));
        JwtKeys::new(&self.jwt_secret, ttl)
    }

    pub fn uses_default_secret(&self) -> bool { self.jwt_secret == DEFAULT_JWT_SECRET }
}
