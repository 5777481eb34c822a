//! Configuration loaded from environment variables.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Counter server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address.
    pub addr: SocketAddr,
    /// SQLite database URL.
    pub database_url: String,
    /// Directory served under `/static`.
    pub static_dir: PathBuf,
    /// Events buffered per live connection before it is considered too slow.
    pub stream_buffer: usize,
    /// Largest accepted image upload, in bytes.
    pub max_image_bytes: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Description | Default |
    /// |----------|-------------|---------|
    /// | `COUNTER_ADDR` | Server bind address | `127.0.0.1:8790` |
    /// | `DATABASE_URL` | SQLite database URL | `sqlite:counters.db?mode=rwc` |
    /// | `STATIC_DIR` | Static file directory | `static` |
    /// | `STREAM_BUFFER` | Per-connection event buffer | `64` |
    /// | `MAX_IMAGE_BYTES` | Image upload limit | `5242880` |
    pub fn from_env() -> Result<Self, ConfigError> {
        let addr = env::var("COUNTER_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8790".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidAddr)?;

        let database_url = env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite:counters.db?mode=rwc".to_string());

        let static_dir = env::var("STATIC_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("static"));

        let stream_buffer = parse_usize("STREAM_BUFFER", 64)?;
        let max_image_bytes = parse_usize("MAX_IMAGE_BYTES", 5 * 1024 * 1024)?;

        Ok(Self {
            addr,
            database_url,
            static_dir,
            stream_buffer,
            max_image_bytes,
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8790)),
            database_url: "sqlite:counters.db?mode=rwc".to_string(),
            static_dir: PathBuf::from("static"),
            stream_buffer: 64,
            max_image_bytes: 5 * 1024 * 1024,
        }
    }
}

fn parse_usize(var: &'static str, default: usize) -> Result<usize, ConfigError> {
    match env::var(var) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber(var)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid COUNTER_ADDR format")]
    InvalidAddr,

    #[error("{0} must be a non-negative integer")]
    InvalidNumber(&'static str),
}
