//! Core data types shared by the parser, planner and storage layers

use std::fmt;
use std::str::FromStr;

/// Pool value marking a protected comment
pub const PROTECTED_POOL: u8 = 2;

/// Identifier of one comment track
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentId(u64);

impl ContentId {
    /// Largest id SQLite can key without wrapping
    pub const MAX: u64 = i64::MAX as u64;

    /// Creates a content id in `1..=ContentId::MAX`
    pub fn new(value: u64) -> Option<Self> {
        (1..=Self::MAX).contains(&value).then_some(Self(value))
    }

    pub fn get(self) -> u64 {
        self.0
    }

    /// Returns the following id, or None on overflow
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).and_then(Self::new)
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ContentId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: u64 = s
            .trim()
            .parse()
            .map_err(|e| format!("invalid content id '{}': {}", s, e))?;
        Self::new(value).ok_or_else(|| {
            format!(
                "content id must be between 1 and {}, got {}",
                Self::MAX,
                value
            )
        })
    }
}

/// One harvested comment
#[derive(Debug, Clone, PartialEq)]
pub struct CommentEntry {
    pub id: i64,
    /// Playback offset in seconds
    pub time_offset: f64,
    pub mode: i32,
    pub font_size: i32,
    pub color: u32,
    /// Unix timestamp of the original posting
    pub posted_at: i64,
    pub pool: u8,
    pub user_hash: String,
    pub text: String,
}

impl CommentEntry {
    /// Builds an entry from the comma-separated `p` attribute of a comment node
    ///
    /// The attribute carries, in order: time offset, mode, font size, color,
    /// posting timestamp, pool, user hash and comment id.
    ///
    /// # Returns
    ///
    /// * `Ok(CommentEntry)` - All eight fields were present and well typed
    /// * `Err(String)` - Description of the first offending field
    pub fn from_attributes(attributes: &str, text: String) -> Result<Self, String> {
        let fields: Vec<&str> = attributes.split(',').map(str::trim).collect();
        if fields.len() < 8 {
            return Err(format!(
                "expected 8 attribute fields, got {} in '{}'",
                fields.len(),
                attributes
            ));
        }

        fn field<T: FromStr>(fields: &[&str], index: usize, name: &str) -> Result<T, String> {
            fields[index]
                .parse()
                .map_err(|_| format!("invalid {} '{}'", name, fields[index]))
        }

        Ok(Self {
            time_offset: field(&fields, 0, "time offset")?,
            mode: field(&fields, 1, "mode")?,
            font_size: field(&fields, 2, "font size")?,
            color: field(&fields, 3, "color")?,
            posted_at: field(&fields, 4, "posting timestamp")?,
            pool: field(&fields, 5, "pool")?,
            user_hash: fields[6].to_string(),
            id: field(&fields, 7, "comment id")?,
            text,
        })
    }

    pub fn is_protected(&self) -> bool {
        self.pool == PROTECTED_POOL
    }
}

/// One calendar-day boundary of the history available for a content id
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollDateBoundary {
    /// Unix timestamp, a multiple of 86400
    pub timestamp: i64,
    /// Advertised number of new comments that day. Not trustworthy.
    pub approx_new_count: i64,
}

/// The earliest comment known to be fetched during a backfill pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Breakpoint {
    pub timestamp: i64,
    pub id: i64,
}

impl Breakpoint {
    /// A breakpoint that has not reached any upper bound yet
    pub fn unbounded() -> Self {
        Self {
            timestamp: i64::MAX,
            id: i64::MAX,
        }
    }

    pub fn at(entry: &CommentEntry) -> Self {
        Self {
            timestamp: entry.posted_at,
            id: entry.id,
        }
    }
}
