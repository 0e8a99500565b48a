//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::model::{CommentEntry, ContentId};
use crate::storage::{CommentCounts, MetadataField, MetadataRecord, SessionStatus, StoreStatistics};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    /// The connection was lost and could not be opened again
    #[error("Reconnect failed: {0}")]
    ReconnectFailed(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Rows actually written by one `insert_entries` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertReport {
    pub comments: usize,
    pub special_comments: usize,
}

impl InsertReport {
    pub fn total(&self) -> usize {
        self.comments + self.special_comments
    }
}

/// Trait for storage backend implementations
///
/// Every write is idempotent: inserting a key that already exists is a
/// no-op, never an error. A lost connection is re-established once per
/// failing operation; if that fails the error is `ReconnectFailed`, which
/// callers must treat as fatal for the whole session.
pub trait CommentStore {
    // ===== Content Metadata =====

    /// Creates the metadata row for a content id if it does not exist yet
    fn create_metadata(&mut self, id: ContentId) -> StorageResult<()>;

    /// Updates one metadata field. A missing row is left alone.
    fn upsert_metadata(
        &mut self,
        id: ContentId,
        field: MetadataField,
        value: &str,
    ) -> StorageResult<()>;

    /// Gets the metadata row of a content id
    fn metadata(&self, id: ContentId) -> StorageResult<Option<MetadataRecord>>;

    // ===== Comments =====

    /// Inserts comment entries, protected ones into their own table
    ///
    /// Each non-empty partition is written as one batch; the call succeeds
    /// only if every issued batch succeeded.
    fn insert_entries(
        &mut self,
        id: ContentId,
        entries: &[CommentEntry],
    ) -> StorageResult<InsertReport>;

    /// Counts stored comments of a content id
    fn count_comments(&self, id: ContentId) -> StorageResult<CommentCounts>;

    // ===== Session Ledger =====

    /// Records the start of a session and returns its row id
    fn begin_session(
        &mut self,
        start: ContentId,
        end: ContentId,
        config_hash: &str,
    ) -> StorageResult<i64>;

    /// Records how a session ended
    fn finish_session(
        &mut self,
        session_id: i64,
        status: SessionStatus,
        skipped: &[ContentId],
    ) -> StorageResult<()>;

    // ===== Statistics =====

    fn statistics(&self) -> StorageResult<StoreStatistics>;
}
