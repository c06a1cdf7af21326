//! Configuration management for the file service
//!
//! Loads settings from:
//! 1. Environment variables
//! 2. .env file (local development)
//!
//! # Example
//!
//! ```no_run
//! use file_service::config::Settings;
//!
//! fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     println!("Storage root: {}", settings.storage.root.display());
//!     Ok(())
//! }
//! ```

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Ceiling on concurrent uploads (server and client)
pub const DEFAULT_UPLOAD_CONCURRENCY: usize = 10;
/// Ceiling on concurrent downloads (server and client)
pub const DEFAULT_DOWNLOAD_CONCURRENCY: usize = 10;
/// Ceiling on concurrent listings (server and client)
pub const DEFAULT_LIST_CONCURRENCY: usize = 100;
/// Largest accepted upload (1 GiB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1 << 30;
/// Chunk size used when streaming file content
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub jwt: JwtSettings,
    pub storage: StorageSettings,
    pub transfer: TransferSettings,
}

impl Settings {
    /// Load settings from the environment, after reading `.env` if present
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    pub fn from_env() -> Result<Self> {
        Ok(Settings {
            server: ServerSettings::from_env()?,
            jwt: JwtSettings::from_env()?,
            storage: StorageSettings::from_env(),
            transfer: TransferSettings::from_env()?,
        })
    }
}

/// gRPC listener settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl ServerSettings {
    fn from_env() -> Result<Self> {
        Ok(Self {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parse_env("SERVER_PORT", 8080)?,
        })
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Token signing settings
#[derive(Clone, Serialize, Deserialize)]
pub struct JwtSettings {
    pub secret: String,
    pub token_lifetime_secs: i64,
}

impl JwtSettings {
    fn from_env() -> Result<Self> {
        let secret = env::var("JWT_SECRET").context("JWT_SECRET must be set")?;
        if secret.is_empty() {
            bail!("JWT_SECRET must not be empty");
        }

        let token_lifetime_secs = parse_env(
            "JWT_TOKEN_LIFETIME_SECS",
            crypto_core::DEFAULT_TOKEN_LIFETIME_SECS,
        )?;
        if token_lifetime_secs <= 0 {
            bail!("JWT_TOKEN_LIFETIME_SECS must be positive");
        }

        Ok(Self {
            secret,
            token_lifetime_secs,
        })
    }

    pub fn token_lifetime(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.token_lifetime_secs)
    }
}

impl fmt::Debug for JwtSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtSettings")
            .field("secret", &"<redacted>")
            .field("token_lifetime_secs", &self.token_lifetime_secs)
            .finish()
    }
}

/// Where file content lives on disk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    pub root: PathBuf,
}

impl StorageSettings {
    fn from_env() -> Self {
        Self {
            root: env::var("FILE_STORAGE_DIR")
                .unwrap_or_else(|_| "files".to_string())
                .into(),
        }
    }
}

/// Admission ceilings and transfer limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferSettings {
    pub upload_concurrency: usize,
    pub download_concurrency: usize,
    pub list_concurrency: usize,
    pub max_file_size: u64,
    pub chunk_size: usize,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            upload_concurrency: DEFAULT_UPLOAD_CONCURRENCY,
            download_concurrency: DEFAULT_DOWNLOAD_CONCURRENCY,
            list_concurrency: DEFAULT_LIST_CONCURRENCY,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl TransferSettings {
    fn from_env() -> Result<Self> {
        let settings = Self {
            upload_concurrency: parse_env("UPLOAD_CONCURRENCY_LIMIT", DEFAULT_UPLOAD_CONCURRENCY)?,
            download_concurrency: parse_env(
                "DOWNLOAD_CONCURRENCY_LIMIT",
                DEFAULT_DOWNLOAD_CONCURRENCY,
            )?,
            list_concurrency: parse_env("LIST_CONCURRENCY_LIMIT", DEFAULT_LIST_CONCURRENCY)?,
            max_file_size: parse_env("MAX_FILE_SIZE_BYTES", DEFAULT_MAX_FILE_SIZE)?,
            chunk_size: parse_env("TRANSFER_CHUNK_SIZE", DEFAULT_CHUNK_SIZE)?,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.upload_concurrency == 0
            || self.download_concurrency == 0
            || self.list_concurrency == 0
        {
            bail!("Concurrency limits must be positive");
        }
        if self.chunk_size == 0 {
            bail!("TRANSFER_CHUNK_SIZE must be positive");
        }
        Ok(())
    }
}

/// Settings for the command-line client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSettings {
    pub server_address: String,
    pub token_refresh_secs: u64,
    pub request_timeout_secs: u64,
    pub download_dir: PathBuf,
}

impl ClientSettings {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    pub fn from_env() -> Result<Self> {
        let settings = Self {
            server_address: env::var("FILE_SERVICE_ADDRESS")
                .unwrap_or_else(|_| "http://127.0.0.1:8080".to_string()),
            token_refresh_secs: parse_env("TOKEN_REFRESH_SECS", 30)?,
            request_timeout_secs: parse_env("REQUEST_TIMEOUT_SECS", 5)?,
            download_dir: env::var("DOWNLOAD_DIR")
                .unwrap_or_else(|_| "temp_files".to_string())
                .into(),
        };

        if settings.token_refresh_secs == 0 {
            bail!("TOKEN_REFRESH_SECS must be positive");
        }
        if settings.request_timeout_secs == 0 {
            bail!("REQUEST_TIMEOUT_SECS must be positive");
        }

        Ok(settings)
    }

    pub fn token_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.token_refresh_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().with_context(|| format!("Invalid {}", key)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const SERVER_KEYS: &[&str] = &[
        "SERVER_HOST",
        "SERVER_PORT",
        "JWT_SECRET",
        "JWT_TOKEN_LIFETIME_SECS",
        "FILE_STORAGE_DIR",
        "UPLOAD_CONCURRENCY_LIMIT",
        "DOWNLOAD_CONCURRENCY_LIMIT",
        "LIST_CONCURRENCY_LIMIT",
        "MAX_FILE_SIZE_BYTES",
        "TRANSFER_CHUNK_SIZE",
    ];

    const CLIENT_KEYS: &[&str] = &[
        "FILE_SERVICE_ADDRESS",
        "TOKEN_REFRESH_SECS",
        "REQUEST_TIMEOUT_SECS",
        "DOWNLOAD_DIR",
    ];

    fn clear(keys: &[&str]) {
        for key in keys {
            env::remove_var(key);
        }
    }

    #[test]
    #[serial]
    fn test_server_defaults() {
        clear(SERVER_KEYS);
        env::set_var("JWT_SECRET", "test-secret");

        let settings = Settings::from_env().unwrap();

        assert_eq!(settings.server.address(), "0.0.0.0:8080");
        assert_eq!(settings.jwt.token_lifetime_secs, 900);
        assert_eq!(settings.storage.root, PathBuf::from("files"));
        assert_eq!(settings.transfer.upload_concurrency, 10);
        assert_eq!(settings.transfer.download_concurrency, 10);
        assert_eq!(settings.transfer.list_concurrency, 100);
        assert_eq!(settings.transfer.max_file_size, 1 << 30);
        assert_eq!(settings.transfer.chunk_size, 1024);

        clear(SERVER_KEYS);
    }

    #[test]
    #[serial]
    fn test_missing_secret_fails() {
        clear(SERVER_KEYS);

        let err = Settings::from_env().unwrap_err();
        assert!(err.to_string().contains("JWT_SECRET"));
    }

    #[test]
    #[serial]
    fn test_invalid_port_fails() {
        clear(SERVER_KEYS);
        env::set_var("JWT_SECRET", "test-secret");
        env::set_var("SERVER_PORT", "not-a-port");

        let err = Settings::from_env().unwrap_err();
        assert!(err.to_string().contains("SERVER_PORT"));

        clear(SERVER_KEYS);
    }

    #[test]
    #[serial]
    fn test_zero_chunk_size_rejected() {
        clear(SERVER_KEYS);
        env::set_var("JWT_SECRET", "test-secret");
        env::set_var("TRANSFER_CHUNK_SIZE", "0");

        assert!(Settings::from_env().is_err());

        clear(SERVER_KEYS);
    }

    #[test]
    #[serial]
    fn test_overrides_applied() {
        clear(SERVER_KEYS);
        env::set_var("JWT_SECRET", "test-secret");
        env::set_var("SERVER_PORT", "9090");
        env::set_var("UPLOAD_CONCURRENCY_LIMIT", "3");
        env::set_var("MAX_FILE_SIZE_BYTES", "4096");

        let settings = Settings::from_env().unwrap();
        assert_eq!(settings.server.port, 9090);
        assert_eq!(settings.transfer.upload_concurrency, 3);
        assert_eq!(settings.transfer.max_file_size, 4096);

        clear(SERVER_KEYS);
    }

    #[test]
    fn test_debug_redacts_secret() {
        let jwt = JwtSettings {
            secret: "super-secret".to_string(),
            token_lifetime_secs: 900,
        };
        assert!(!format!("{:?}", jwt).contains("super-secret"));
    }

    #[test]
    #[serial]
    fn test_client_defaults() {
        clear(CLIENT_KEYS);

        let settings = ClientSettings::from_env().unwrap();
        assert_eq!(settings.server_address, "http://127.0.0.1:8080");
        assert_eq!(settings.token_refresh_interval(), Duration::from_secs(30));
        assert_eq!(settings.request_timeout(), Duration::from_secs(5));
        assert_eq!(settings.download_dir, PathBuf::from("temp_files"));
    }

    #[test]
    #[serial]
    fn test_client_zero_refresh_rejected() {
        clear(CLIENT_KEYS);
        env::set_var("TOKEN_REFRESH_SECS", "0");

        assert!(ClientSettings::from_env().is_err());

        clear(CLIENT_KEYS);
    }
}
