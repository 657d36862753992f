use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub storage: StorageConfig,
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
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
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

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Secret used to sign access and refresh tokens (HS256)
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    /// Access token lifetime in minutes
    #[serde(default = "default_access_ttl_minutes")]
    pub access_ttl_minutes: i64,
    /// Refresh token lifetime in days
    #[serde(default = "default_refresh_ttl_days")]
    pub refresh_ttl_days: i64,
    /// PBKDF2 iteration count for password hashing
    #[serde(default = "default_pbkdf2_iterations")]
    pub pbkdf2_iterations: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_jwt_secret(),
            access_ttl_minutes: default_access_ttl_minutes(),
            refresh_ttl_days: default_refresh_ttl_days(),
            pbkdf2_iterations: default_pbkdf2_iterations(),
        }
    }
}

fn default_jwt_secret() -> String {
    // Generate a random secret if not provided; issued tokens won't survive a restart
    uuid::Uuid::new_v4().to_string()
}

fn default_access_ttl_minutes() -> i64 {
    30
}

fn default_refresh_ttl_days() -> i64 {
    30
}

fn default_pbkdf2_iterations() -> u32 {
    100_000
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_storage_bucket")]
    pub bucket: String,
    #[serde(default = "default_storage_access_key")]
    pub access_key: String,
    #[serde(default = "default_storage_secret_key")]
    pub secret_key: String,
    #[serde(default = "default_storage_region")]
    pub region: String,
    /// Maximum attempts for requests that hit transient transport errors
    #[serde(default = "default_storage_max_attempts")]
    pub max_attempts: u32,
    /// Per-call timeout in seconds for object storage requests
    #[serde(default = "default_storage_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Lifetime of presigned download URLs in seconds
    #[serde(default = "default_presign_ttl_secs")]
    pub presign_ttl_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            endpoint: default_storage_endpoint(),
            bucket: default_storage_bucket(),
            access_key: default_storage_access_key(),
            secret_key: default_storage_secret_key(),
            region: default_storage_region(),
            max_attempts: default_storage_max_attempts(),
            request_timeout_secs: default_storage_timeout_secs(),
            presign_ttl_secs: default_presign_ttl_secs(),
        }
    }
}

fn default_storage_endpoint() -> String {
    "http://localhost:9000".to_string()
}

fn default_storage_bucket() -> String {
    "clockwork-images".to_string()
}

fn default_storage_access_key() -> String {
    "minioadmin".to_string()
}

fn default_storage_secret_key() -> String {
    "minioadmin".to_string()
}

fn default_storage_region() -> String {
    "us-east-1".to_string()
}

fn default_storage_max_attempts() -> u32 {
    3
}

fn default_storage_timeout_secs() -> u64 {
    10
}

fn default_presign_ttl_secs() -> u64 {
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
            let config: Config = toml::from_str(&content)
                .with_context(|| "Failed to parse configuration file")?;
            Ok(config)
        } else {
            info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }

    pub fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
