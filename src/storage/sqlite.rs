//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the CommentStore trait.

use crate::model::{CommentEntry, ContentId};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{CommentStore, InsertReport, StorageError, StorageResult};
use crate::storage::{
    CommentCounts, MetadataField, MetadataRecord, SessionRecord, SessionStatus, StoreStatistics,
    FALLBACK_SOURCE_MARKER,
};
use chrono::Utc;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::{Path, PathBuf};

/// Where the connection points, kept so it can be reopened
#[derive(Debug, Clone)]
enum Location {
    File(PathBuf),
    Memory,
}

/// SQLite storage backend
pub struct SqliteStore {
    conn: Connection,
    location: Location,
}

/// Lossless: `ContentId` never exceeds `i64::MAX`
fn content_key(id: ContentId) -> i64 {
    id.get() as i64
}

/// Returns true for failures that mean the database handle itself is gone
fn is_connection_lost(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if matches!(e.code, ErrorCode::SystemIoFailure | ErrorCode::CannotOpen)
    )
}

fn open_connection(location: &Location) -> Result<Connection, rusqlite::Error> {
    let conn = match location {
        Location::File(path) => {
            let conn = Connection::open(path)?;
            conn.execute_batch(
                "
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                PRAGMA temp_store = MEMORY;
            ",
            )?;
            conn
        }
        Location::Memory => Connection::open_in_memory()?,
    };

    initialize_schema(&conn)?;
    Ok(conn)
}

impl SqliteStore {
    /// Opens or creates the database at `path`
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStore)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn open(path: &Path) -> StorageResult<Self> {
        let location = Location::File(path.to_path_buf());
        let conn = open_connection(&location)?;
        Ok(Self { conn, location })
    }

    /// Creates an in-memory database
    ///
    /// A reconnect on an in-memory store starts from an empty database.
    pub fn new_in_memory() -> StorageResult<Self> {
        let location = Location::Memory;
        let conn = open_connection(&location)?;
        Ok(Self { conn, location })
    }

    /// Replaces the connection with a freshly opened one
    fn reconnect(&mut self) -> StorageResult<()> {
        let conn = open_connection(&self.location)
            .map_err(|e| StorageError::ReconnectFailed(e.to_string()))?;
        self.conn = conn;
        Ok(())
    }

    /// Runs a write, reconnecting and retrying once if the connection was lost
    fn run<T>(
        &mut self,
        action: &str,
        mut op: impl FnMut(&mut Connection) -> rusqlite::Result<T>,
    ) -> StorageResult<T> {
        match op(&mut self.conn) {
            Ok(value) => Ok(value),
            Err(e) if is_connection_lost(&e) => {
                tracing::error!(
                    "Storage connection lost while trying to {}: {}, trying to reconnect",
                    action,
                    e
                );
                self.reconnect()?;
                tracing::info!("Storage connection re-established");
                op(&mut self.conn).map_err(|e| {
                    tracing::error!("Storage failed to {} after reconnecting: {}", action, e);
                    StorageError::from(e)
                })
            }
            Err(e) => {
                tracing::error!("Storage failed to {}: {}", action, e);
                Err(e.into())
            }
        }
    }
}

impl CommentStore for SqliteStore {
    // ===== Content Metadata =====

    fn create_metadata(&mut self, id: ContentId) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        self.run("create metadata", |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO chat_metadata (content_id, created_at) VALUES (?1, ?2)",
                params![content_key(id), now],
            )
        })?;
        Ok(())
    }

    fn upsert_metadata(
        &mut self,
        id: ContentId,
        field: MetadataField,
        value: &str,
    ) -> StorageResult<()> {
        let sql = format!(
            "UPDATE chat_metadata SET {} = ?1 WHERE content_id = ?2",
            field.column()
        );
        self.run("update metadata", |conn| {
            conn.execute(&sql, params![value, content_key(id)])
        })?;
        Ok(())
    }

    fn metadata(&self, id: ContentId) -> StorageResult<Option<MetadataRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT content_id, source, max_limit, max_count, mission, created_at
                 FROM chat_metadata WHERE content_id = ?1",
                params![content_key(id)],
                |row| {
                    Ok(MetadataRecord {
                        content_id: row.get(0)?,
                        source: row.get(1)?,
                        max_limit: row.get(2)?,
                        max_count: row.get(3)?,
                        mission: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                },
            )
            .optional()?;

        Ok(record)
    }

    // ===== Comments =====

    fn insert_entries(
        &mut self,
        id: ContentId,
        entries: &[CommentEntry],
    ) -> StorageResult<InsertReport> {
        let (special, regular): (Vec<&CommentEntry>, Vec<&CommentEntry>) =
            entries.iter().partition(|entry| entry.is_protected());
        let key = content_key(id);

        self.run("insert comment entries", |conn| {
            let tx = conn.transaction()?;
            let mut report = InsertReport::default();

            if !regular.is_empty() {
                let mut stmt = tx.prepare_cached(
                    "INSERT OR IGNORE INTO comments
                     (comment_id, content_id, posted_at, user_hash, body,
                      time_offset, mode, font_size, color, pool)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                )?;
                for entry in &regular {
                    report.comments += stmt.execute(params![
                        entry.id,
                        key,
                        entry.posted_at,
                        entry.user_hash,
                        entry.text,
                        entry.time_offset,
                        entry.mode,
                        entry.font_size,
                        entry.color,
                        entry.pool,
                    ])?;
                }
            }

            if !special.is_empty() {
                let mut stmt = tx.prepare_cached(
                    "INSERT OR IGNORE INTO special_comments
                     (comment_id, content_id, posted_at, user_hash, body)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )?;
                for entry in &special {
                    report.special_comments += stmt.execute(params![
                        entry.id,
                        key,
                        entry.posted_at,
                        entry.user_hash,
                        entry.text,
                    ])?;
                }
            }

            tx.commit()?;
            Ok(report)
        })
    }

    fn count_comments(&self, id: ContentId) -> StorageResult<CommentCounts> {
        let key = content_key(id);
        let comments: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM comments WHERE content_id = ?1",
            params![key],
            |row| row.get(0),
        )?;
        let special_comments: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM special_comments WHERE content_id = ?1",
            params![key],
            |row| row.get(0),
        )?;

        Ok(CommentCounts {
            comments: comments as u64,
            special_comments: special_comments as u64,
        })
    }

    // ===== Session Ledger =====

    fn begin_session(
        &mut self,
        start: ContentId,
        end: ContentId,
        config_hash: &str,
    ) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.run("record session start", |conn| {
            conn.execute(
                "INSERT INTO sessions (started_at, range_start, range_end, config_hash, status)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    now,
                    content_key(start),
                    content_key(end),
                    config_hash,
                    SessionStatus::Running.to_db_string()
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    fn finish_session(
        &mut self,
        session_id: i64,
        status: SessionStatus,
        skipped: &[ContentId],
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let skipped = skipped
            .iter()
            .map(ContentId::to_string)
            .collect::<Vec<_>>()
            .join(",");
        self.run("record session end", |conn| {
            conn.execute(
                "UPDATE sessions SET status = ?1, finished_at = ?2, skipped = ?3 WHERE id = ?4",
                params![status.to_db_string(), now, skipped, session_id],
            )
        })?;
        Ok(())
    }

    // ===== Statistics =====

    fn statistics(&self) -> StorageResult<StoreStatistics> {
        let count = |sql: &str| -> StorageResult<u64> {
            let n: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
            Ok(n as u64)
        };

        let fallback_content_ids: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM chat_metadata WHERE source = ?1",
            params![FALLBACK_SOURCE_MARKER],
            |row| row.get(0),
        )?;

        let latest_session = self
            .conn
            .query_row(
                "SELECT id, started_at, finished_at, range_start, range_end, config_hash, status, skipped
                 FROM sessions ORDER BY id DESC LIMIT 1",
                [],
                |row| {
                    Ok(SessionRecord {
                        id: row.get(0)?,
                        started_at: row.get(1)?,
                        finished_at: row.get(2)?,
                        range_start: row.get(3)?,
                        range_end: row.get(4)?,
                        config_hash: row.get(5)?,
                        status: SessionStatus::from_db_string(&row.get::<_, String>(6)?)
                            .unwrap_or(SessionStatus::Running),
                        skipped: row.get(7)?,
                    })
                },
            )
            .optional()?;

        Ok(StoreStatistics {
            content_ids: count("SELECT COUNT(*) FROM chat_metadata")?,
            fallback_content_ids: fallback_content_ids as u64,
            comments: count("SELECT COUNT(*) FROM comments")?,
            special_comments: count("SELECT COUNT(*) FROM special_comments")?,
            sessions: count("SELECT COUNT(*) FROM sessions")?,
            latest_session,
        })
    }
}
