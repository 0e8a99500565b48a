//! Crawler module for harvesting comment tracks
//!
//! This module contains the core harvesting logic, including:
//! - HTTP fetching with a bounded retry loop
//! - The breakpoint scan that picks historical segments to backfill
//! - The per-session failure budget
//! - Overall harvest coordination across a range of content ids

mod coordinator;
mod fetcher;
mod planner;
mod session;

pub use coordinator::{run_harvest, Harvester, IdOutcome, SessionReport};
pub use fetcher::{
    build_http_client, Endpoints, Fetcher, HttpTransport, RetryPolicy, Transport, TransportError,
};
pub use planner::{advance, plan_next_segment, trim_covered, Plan};
pub use session::{progress_step, CrawlSession, QuietHours, Termination};

use serde::Deserialize;

/// How much history is backfilled for a content id whose live document is full
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum HistoryMode {
    /// Live document only
    None,

    /// At most one historical segment
    #[serde(alias = "single")]
    #[value(name = "single", alias = "single-segment")]
    SingleSegment,

    /// Walk the roll-date index back to the oldest boundary
    #[default]
    All,
}

impl std::fmt::Display for HistoryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::SingleSegment => "single",
            Self::All => "all",
        };
        write!(f, "{}", name)
    }
}
