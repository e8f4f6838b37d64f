use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub cleanup: CleanupConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Full SQLite URL; overrides `data_dir` when set (e.g. `sqlite::memory:`)
    pub database_url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
            database_url: None,
            max_connections: default_max_connections(),
        }
    }
}

impl ServerConfig {
    /// The SQLite URL the store should connect to
    pub fn database_url(&self) -> String {
        match &self.database_url {
            Some(url) => url.clone(),
            None => format!(
                "sqlite:{}?mode=rwc",
                self.data_dir.join("xiaokang.db").display()
            ),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// HMAC-SHA256 signing secret for session tokens
    pub jwt_secret: Option<String>,
    /// Lifetime of issued session tokens in seconds (default: 86400)
    #[serde(default = "default_token_ttl")]
    pub token_ttl_seconds: i64,
    /// Lifetime of CSRF tokens in seconds (default: 3600)
    #[serde(default = "default_csrf_ttl")]
    pub csrf_ttl_seconds: i64,
    #[serde(default = "default_password_min_length")]
    pub password_min_length: usize,
    #[serde(default = "default_username_min_length")]
    pub username_min_length: usize,
    #[serde(default = "default_username_max_length")]
    pub username_max_length: usize,
    /// Require a one-time CSRF token on mutating user endpoints
    #[serde(default)]
    pub require_csrf: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            token_ttl_seconds: default_token_ttl(),
            csrf_ttl_seconds: default_csrf_ttl(),
            password_min_length: default_password_min_length(),
            username_min_length: default_username_min_length(),
            username_max_length: default_username_max_length(),
            require_csrf: false,
        }
    }
}

fn default_token_ttl() -> i64 {
    86400
}

fn default_csrf_ttl() -> i64 {
    3600
}

fn default_password_min_length() -> usize {
    8
}

fn default_username_min_length() -> usize {
    3
}

fn default_username_max_length() -> usize {
    50
}

#[derive(Debug, Clone, Deserialize)]
pub struct CleanupConfig {
    /// Periodically delete expired sessions and CSRF tokens
    #[serde(default = "default_cleanup_enabled")]
    pub enabled: bool,
    #[serde(default = "default_cleanup_interval")]
    pub interval_seconds: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            enabled: default_cleanup_enabled(),
            interval_seconds: default_cleanup_interval(),
        }
    }
}

fn default_cleanup_enabled() -> bool {
    true
}

fn default_cleanup_interval() -> u64 {
    3600
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config =
                toml::from_str(&content).with_context(|| "Failed to parse configuration file")?;
            Ok(config)
        } else {
            info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.auth.token_ttl_seconds, 86400);
        assert_eq!(config.auth.csrf_ttl_seconds, 3600);
        assert_eq!(config.auth.password_min_length, 8);
        assert_eq!(config.auth.username_min_length, 3);
        assert_eq!(config.auth.username_max_length, 50);
        assert!(!config.auth.require_csrf);
        assert!(config.auth.jwt_secret.is_none());
        assert!(config.cleanup.enabled);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [auth]
            jwt_secret = "s3cret"
            token_ttl_seconds = 600

            [server]
            port = 9000
            "#,
        )
        .unwrap();

        assert_eq!(config.auth.jwt_secret.as_deref(), Some("s3cret"));
        assert_eq!(config.auth.token_ttl_seconds, 600);
        assert_eq!(config.auth.password_min_length, 8);
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_database_url() {
        let mut server = ServerConfig::default();
        assert!(server.database_url().starts_with("sqlite:"));
        assert!(server.database_url().ends_with("xiaokang.db?mode=rwc"));

        server.database_url = Some("sqlite::memory:".to_string());
        assert_eq!(server.database_url(), "sqlite::memory:");
    }
}
