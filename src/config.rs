//! Configuration management for Slicevault

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub upload: UploadConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Content root: artifacts and per-session staging directories
    pub upload_dir: PathBuf,
    /// Prefix clients use to fetch stored artifacts
    pub public_base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadConfig {
    /// Artificial delay before each upload is handled
    pub delay_ms: u64,
    /// Largest accepted request body
    pub max_body_bytes: usize,
}

/// Configuration loading errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

const DEFAULT_PORT: u16 = 8888;
const DEFAULT_MAX_BODY_BYTES: usize = 1024 * 1024 * 1024;

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: DEFAULT_PORT,
            },
            storage: StorageConfig {
                upload_dir: PathBuf::from("./upload"),
                public_base_url: format!("http://127.0.0.1:{DEFAULT_PORT}/upload"),
            },
            upload: UploadConfig {
                delay_ms: 0,
                max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Build a config from any variable source; unset variables fall back
    /// to the defaults, malformed numbers are errors
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Config::default();
        let port = parse_var(&lookup, "SERVER_PORT")?.unwrap_or(defaults.server.port);

        Ok(Config {
            server: ServerConfig {
                host: lookup("SERVER_HOST").unwrap_or(defaults.server.host),
                port,
            },
            storage: StorageConfig {
                upload_dir: lookup("UPLOAD_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.storage.upload_dir),
                public_base_url: lookup("PUBLIC_BASE_URL")
                    .unwrap_or_else(|| format!("http://127.0.0.1:{port}/upload")),
            },
            upload: UploadConfig {
                delay_ms: parse_var(&lookup, "UPLOAD_DELAY_MS")?
                    .unwrap_or(defaults.upload.delay_ms),
                max_body_bytes: parse_var(&lookup, "MAX_BODY_BYTES")?
                    .unwrap_or(defaults.upload.max_body_bytes),
            },
        })
    }
}

impl StorageConfig {
    /// Public URL of a path relative to the content root
    pub fn service_url(&self, relative: &str) -> String {
        format!(
            "{}/{}",
            self.public_base_url.trim_end_matches('/'),
            relative.trim_start_matches('/')
        )
    }
}

impl UploadConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { var, value }),
    }
}
