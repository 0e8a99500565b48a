use crate::crawler::HistoryMode;
use serde::Deserialize;

/// Main configuration structure for Danmaku-Harvest
///
/// Every field has a default, so an empty file (or no file at all) yields a
/// working configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub remote: RemoteConfig,
    pub fetch: FetchConfig,
    pub session: SessionConfig,
    pub output: OutputConfig,
}

/// Remote comment service configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RemoteConfig {
    /// Base URL serving live documents and historical segments
    pub comment_base_url: String,

    /// Base URL serving the roll-date index
    pub rolldate_base_url: String,

    /// Referer header sent with every request
    pub referer: Option<String>,

    /// User agent sent with every request
    pub user_agent: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            comment_base_url: "http://comment.bilibili.com".to_string(),
            rolldate_base_url: "http://comment.bilibili.tv".to_string(),
            referer: Some("http://www.baidu.com/".to_string()),
            user_agent: format!("danmaku-harvest/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// HTTP fetch behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct FetchConfig {
    /// Attempts per logical request before giving up
    pub max_attempts: u32,

    /// Pause between failed attempts (milliseconds)
    pub relax_duration_ms: u64,

    pub connect_timeout_secs: u64,

    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            relax_duration_ms: 1000,
            connect_timeout_secs: 3,
            timeout_secs: 45,
        }
    }
}

/// Session-level policies
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SessionConfig {
    /// Consecutive failure score at which the session gives up
    pub failure_budget: u32,

    /// How much history to backfill for each content id
    pub history: HistoryMode,

    /// First hour (inclusive) of the quiet window
    pub quiet_hours_start: u32,

    /// Last hour (exclusive) of the quiet window
    pub quiet_hours_end: u32,

    /// Extra pause after each content id inside the quiet window (milliseconds)
    pub quiet_delay_ms: u64,

    /// Offset from UTC, in hours, of the clock the quiet window refers to
    pub utc_offset_hours: i32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            failure_budget: 10,
            history: HistoryMode::All,
            quiet_hours_start: 20,
            quiet_hours_end: 21,
            quiet_delay_ms: 1000,
            utc_offset_hours: 8,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Path to the SQLite database file
    pub database_path: String,

    /// Directory holding the per-day session log directories
    pub log_dir: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            database_path: "./danmaku.db".to_string(),
            log_dir: "./log".to_string(),
        }
    }
}
