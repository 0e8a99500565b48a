//! Danmaku-Harvest: an incremental danmaku archive builder
//!
//! This crate harvests the time-anchored comment stream a remote service
//! publishes per content id, backfills its history through the roll-date
//! index, and stores everything idempotently in SQLite.

pub mod config;
pub mod crawler;
pub mod document;
pub mod model;
pub mod output;
pub mod storage;

use thiserror::Error;

/// Main error type for Danmaku-Harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("request content of url: {url} after {attempts} attempts for: {cause}")]
    TransientNetwork {
        url: String,
        attempts: u32,
        cause: String,
    },

    #[error("request {url}, having got a document containing only an 'error' node")]
    UpstreamRejection { url: String },

    #[error("parse document from {url}: {message}")]
    MalformedResponse { url: String, message: String },

    #[error("decode roll-date index from {url}: {source}")]
    IndexDecode {
        url: String,
        source: document::RollDateError,
    },

    #[error("storage connection lost and could not be re-established: {0}")]
    StorageConnectionLost(String),

    #[error("storage operation failed: {0}")]
    StorageOperation(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarvestError {
    /// Returns true if this error must end the whole session, not just the
    /// current content id
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, Self::StorageConnectionLost(_))
    }
}

impl From<storage::StorageError> for HarvestError {
    fn from(err: storage::StorageError) -> Self {
        match err {
            storage::StorageError::ReconnectFailed(message) => Self::StorageConnectionLost(message),
            other => Self::StorageOperation(other.to_string()),
        }
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Result type alias for Danmaku-Harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlSession, HistoryMode};
pub use model::{Breakpoint, CommentEntry, ContentId, RollDateBoundary};
