//! Statistics generation from the harvest database
//!
//! This module provides functionality for extracting and displaying
//! archive statistics from the storage layer.

use crate::storage::{CommentStore, StoreStatistics};
use crate::HarvestError;

/// Loads statistics from storage
///
/// # Arguments
///
/// * `store` - The storage backend to query
///
/// # Returns
///
/// * `Ok(StoreStatistics)` - Successfully loaded statistics
/// * `Err(HarvestError)` - Failed to query statistics
pub fn load_statistics(store: &impl CommentStore) -> Result<StoreStatistics, HarvestError> {
    Ok(store.statistics()?)
}

/// Renders statistics as the text printed by `--stats`
pub fn render_statistics(stats: &StoreStatistics) -> String {
    let mut out = String::new();
    out.push_str("=== Harvest Statistics ===\n\n");

    out.push_str("Overview:\n");
    out.push_str(&format!("  Content ids seen: {}\n", stats.content_ids));
    out.push_str(&format!(
        "  Content ids served as HTML: {}\n",
        stats.fallback_content_ids
    ));
    out.push_str(&format!("  Comments: {}\n", stats.comments));
    out.push_str(&format!("  Protected comments: {}\n", stats.special_comments));
    out.push_str(&format!("  Sessions recorded: {}\n", stats.sessions));

    if let Some(session) = &stats.latest_session {
        out.push_str("\nLatest Session:\n");
        out.push_str(&format!("  Id: {}\n", session.id));
        out.push_str(&format!(
            "  Range: {} to {}\n",
            session.range_start, session.range_end
        ));
        out.push_str(&format!("  Status: {}\n", session.status.to_db_string()));
        out.push_str(&format!("  Started: {}\n", session.started_at));
        if let Some(finished) = &session.finished_at {
            out.push_str(&format!("  Finished: {}\n", finished));
        }
        match session.skipped.as_deref() {
            Some(skipped) if !skipped.is_empty() => {
                out.push_str(&format!("  Skipped: {}\n", skipped))
            }
            _ => out.push_str("  Skipped: none\n"),
        }
        out.push_str(&format!("  Config hash: {}\n", session.config_hash));
    }

    out
}

/// Prints statistics to stdout in a formatted manner
///
/// # Arguments
///
/// * `stats` - The statistics to display
pub fn print_statistics(stats: &StoreStatistics) {
    print!("{}", render_statistics(stats));
}
