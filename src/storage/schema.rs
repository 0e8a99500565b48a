//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Danmaku-Harvest database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track harvest sessions
CREATE TABLE IF NOT EXISTS sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    range_start INTEGER NOT NULL,
    range_end INTEGER NOT NULL,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    skipped TEXT
);

-- One row per content id, created before its live document is fetched
CREATE TABLE IF NOT EXISTS chat_metadata (
    content_id INTEGER PRIMARY KEY,
    source TEXT,
    max_limit TEXT,
    max_count TEXT,
    mission TEXT,
    created_at TEXT NOT NULL
);

-- Ordinary comments (pool != 2)
CREATE TABLE IF NOT EXISTS comments (
    comment_id INTEGER NOT NULL,
    content_id INTEGER NOT NULL,
    posted_at INTEGER NOT NULL,
    user_hash TEXT NOT NULL,
    body TEXT NOT NULL,
    time_offset REAL NOT NULL,
    mode INTEGER NOT NULL,
    font_size INTEGER NOT NULL,
    color INTEGER NOT NULL,
    pool INTEGER NOT NULL,
    UNIQUE(comment_id, content_id)
);

CREATE INDEX IF NOT EXISTS idx_comments_content ON comments(content_id);

-- Protected comments (pool == 2)
CREATE TABLE IF NOT EXISTS special_comments (
    comment_id INTEGER NOT NULL,
    content_id INTEGER NOT NULL,
    posted_at INTEGER NOT NULL,
    user_hash TEXT NOT NULL,
    body TEXT NOT NULL,
    UNIQUE(comment_id, content_id)
);

CREATE INDEX IF NOT EXISTS idx_special_comments_content ON special_comments(content_id);
"#;

/// Initializes the database schema
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
