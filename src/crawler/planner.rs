//! Breakpoint scan over the roll-date index
//!
//! Historical segments are fetched newest first. The breakpoint marks the
//! oldest comment already in hand; the scan picks the newest day boundary
//! whose previous boundary is not after the breakpoint, so each fetched
//! segment overlaps what is already known without re-fetching whole days.

use crate::model::{Breakpoint, CommentEntry, RollDateBoundary};

/// Next step of a backfill pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    /// Fetch the segment ending at boundary `index`
    Segment { index: usize, timestamp: i64 },

    /// No eligible boundary remains
    Done,
}

/// Picks the next historical segment to fetch
///
/// # Arguments
///
/// * `boundaries` - The roll-date index, oldest first
/// * `breakpoint` - The oldest comment known so far
/// * `below` - Exclusive upper index still eligible
///
/// # Returns
///
/// The newest index `i < below` where `boundaries[i - 1]` is not after the
/// breakpoint (index 0 always qualifies), or `Plan::Done`.
pub fn plan_next_segment(
    boundaries: &[RollDateBoundary],
    breakpoint: Breakpoint,
    below: usize,
) -> Plan {
    let below = below.min(boundaries.len());

    for index in (0..below).rev() {
        if index > 0 && boundaries[index - 1].timestamp > breakpoint.timestamp {
            continue;
        }
        return Plan::Segment {
            index,
            timestamp: boundaries[index].timestamp,
        };
    }

    Plan::Done
}

/// Drops entries strictly newer than the breakpoint
///
/// The breakpoint's own id is kept; storage ignores the duplicate.
pub fn trim_covered(mut entries: Vec<CommentEntry>, breakpoint: Breakpoint) -> Vec<CommentEntry> {
    entries.retain(|entry| entry.id <= breakpoint.id);
    entries
}

/// Breakpoint after persisting a trimmed segment, or None if nothing was retained
pub fn advance(retained: &[CommentEntry]) -> Option<Breakpoint> {
    retained.first().map(Breakpoint::at)
}
