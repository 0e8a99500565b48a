//! Storage module for persisting harvested comments
//!
//! This module handles all database operations for the harvester, including:
//! - SQLite database initialization and schema management
//! - Content metadata rows
//! - Idempotent batched comment inserts, protected comments kept apart
//! - Session tracking
//! - Reconnecting once when the connection is lost

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{CommentStore, InsertReport, StorageError, StorageResult};

use std::path::Path;

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStore)` - Successfully initialized storage
/// * `Err(StorageError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> StorageResult<SqliteStore> {
    SqliteStore::open(path)
}

/// Metadata columns the harvester fills from a live document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataField {
    Source,
    MaxLimit,
    MaxCount,
    Mission,
}

impl MetadataField {
    pub fn column(&self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::MaxLimit => "max_limit",
            Self::MaxCount => "max_count",
            Self::Mission => "mission",
        }
    }
}

/// Value written to `source` when the upstream served an HTML page
pub const FALLBACK_SOURCE_MARKER: &str = "html";

/// Represents a metadata row in the database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataRecord {
    pub content_id: i64,
    pub source: Option<String>,
    pub max_limit: Option<String>,
    pub max_count: Option<String>,
    pub mission: Option<String>,
    pub created_at: String,
}

/// Stored comment counts for one content id
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommentCounts {
    pub comments: u64,
    pub special_comments: u64,
}

/// Database-wide counts
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStatistics {
    pub content_ids: u64,
    pub fallback_content_ids: u64,
    pub comments: u64,
    pub special_comments: u64,
    pub sessions: u64,
    pub latest_session: Option<SessionRecord>,
}

/// Represents a harvest session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub range_start: i64,
    pub range_end: i64,
    pub config_hash: String,
    pub status: SessionStatus,
    pub skipped: Option<String>,
}

/// Status of a harvest session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Running,
    Completed,
    /// The consecutive-failure budget ran out
    Aborted,
    /// A fatal storage condition ended the session
    Failed,
}

impl SessionStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Aborted => "aborted",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "aborted" => Some(Self::Aborted),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
