//! Output module for session summaries and database reports
//!
//! This module handles:
//! - Formatting the termination summary of a harvest session
//! - Loading and printing database statistics
//! - Locating the per-session log file

pub mod stats;
mod summary;

pub use stats::{load_statistics, print_statistics};
pub use summary::{format_duration, SessionSummary};

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// Picks the first unused session log path
///
/// Logs live under `{log_dir}/{MM-DD}/log_{label}_{n}.log` where `n` counts
/// up from 1 until a free name is found.
///
/// # Arguments
///
/// * `log_dir` - Root log directory
/// * `label` - Run label, usually the id range
/// * `now` - Time the session starts
pub fn session_log_path(log_dir: &Path, label: &str, now: DateTime<Utc>) -> PathBuf {
    let day_dir = log_dir.join(now.format("%m-%d").to_string());
    let mut n = 1u32;
    loop {
        let candidate = day_dir.join(format!("log_{}_{}.log", label, n));
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}
