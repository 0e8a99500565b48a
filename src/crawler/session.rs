//! Per-session crawl state
//!
//! A `CrawlSession` is created once per run and threaded through the
//! coordinator. It tracks:
//! - The requested id range and the id currently being processed
//! - The failure score against the configured budget
//! - The ids skipped because they failed
//! - Whether the termination summary has been emitted

use crate::config::SessionConfig;
use crate::model::ContentId;
use crate::output::SessionSummary;
use chrono::{DateTime, FixedOffset, Offset, Timelike, Utc};
use std::time::{Duration, Instant};

/// Why a session stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// Every id in the range was processed
    Completed,

    /// The failure score reached the budget
    BudgetExhausted,

    /// A session-fatal error, typically a lost storage connection
    Fatal(String),

    /// The session was dropped without being finished
    Interrupted,
}

impl Termination {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Explicit state of one harvesting run
#[derive(Debug)]
pub struct CrawlSession {
    start: ContentId,
    end: ContentId,
    current: ContentId,
    current_failed: bool,
    failure_score: u32,
    budget: u32,
    skipped: Vec<ContentId>,
    started: Instant,
    summary_emitted: bool,
}

impl CrawlSession {
    /// Creates a session over the inclusive range `[start, end]`
    pub fn new(start: ContentId, end: ContentId, budget: u32) -> Self {
        tracing::info!(
            "Start to harvest comments from content id {} to {}",
            start,
            end
        );
        Self {
            start,
            end,
            current: start,
            current_failed: false,
            failure_score: 0,
            budget: budget.max(1),
            skipped: Vec::new(),
            started: Instant::now(),
            summary_emitted: false,
        }
    }

    pub fn start(&self) -> ContentId {
        self.start
    }

    pub fn end(&self) -> ContentId {
        self.end
    }

    pub fn current(&self) -> ContentId {
        self.current
    }

    pub fn failure_score(&self) -> u32 {
        self.failure_score
    }

    pub fn skipped(&self) -> &[ContentId] {
        &self.skipped
    }

    /// Number of ids in the requested range
    pub fn total(&self) -> u64 {
        self.end
            .get()
            .saturating_sub(self.start.get())
            .saturating_add(1)
    }

    /// Makes `id` the current id and clears its failure flag
    pub fn begin_id(&mut self, id: ContentId) {
        self.current = id;
        self.current_failed = false;
    }

    /// Records that the current id failed; repeated calls have no further effect
    pub fn mark_failed(&mut self) {
        if self.current_failed {
            return;
        }
        self.current_failed = true;
        if !self.skipped.contains(&self.current) {
            self.skipped.push(self.current);
        }
    }

    pub fn current_failed(&self) -> bool {
        self.current_failed
    }

    /// Settles the current id against the failure budget
    ///
    /// # Returns
    ///
    /// `true` if the budget is exhausted and the session must stop
    pub fn finish_id(&mut self) -> bool {
        if self.current_failed {
            self.failure_score += 1;
        } else {
            self.failure_score = self.failure_score.saturating_sub(1);
        }
        self.failure_score >= self.budget
    }

    /// Emits the termination summary and returns it
    pub fn finish(&mut self, termination: Termination) -> SessionSummary {
        let summary = self.summary(&termination);
        if let Termination::Fatal(reason) = &termination {
            tracing::error!("Session stopped by a fatal error: {}", reason);
        }
        summary.log();
        self.summary_emitted = true;
        summary
    }

    fn summary(&self, termination: &Termination) -> SessionSummary {
        SessionSummary {
            successful: termination.is_success(),
            range_start: self.start,
            covered_end: self.current.min(self.end),
            duration: self.started.elapsed(),
            skipped: self.skipped.clone(),
        }
    }
}

impl Drop for CrawlSession {
    fn drop(&mut self) {
        if !self.summary_emitted {
            self.summary(&Termination::Interrupted).log();
        }
    }
}

/// Interval between progress lines for a range of `total` ids
pub fn progress_step(total: u64) -> u64 {
    (total / 120).max(1)
}

/// Hours of the day during which the harvester slows down
#[derive(Debug, Clone, Copy)]
pub struct QuietHours {
    start_hour: u32,
    end_hour: u32,
    offset: FixedOffset,
    delay: Duration,
}

impl QuietHours {
    pub fn from_config(config: &SessionConfig) -> Self {
        let offset = FixedOffset::east_opt(config.utc_offset_hours * 3_600)
            .unwrap_or_else(|| Utc.fix());
        Self {
            start_hour: config.quiet_hours_start,
            end_hour: config.quiet_hours_end,
            offset,
            delay: Duration::from_millis(config.quiet_delay_ms),
        }
    }

    /// A window that never applies
    pub fn disabled() -> Self {
        Self {
            start_hour: 0,
            end_hour: 0,
            offset: Utc.fix(),
            delay: Duration::ZERO,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Returns true if `now` falls inside the window, evaluated at the configured offset
    ///
    /// A window whose start is after its end wraps past midnight.
    pub fn is_quiet(&self, now: DateTime<Utc>) -> bool {
        let hour = now.with_timezone(&self.offset).hour();
        if self.start_hour <= self.end_hour {
            hour >= self.start_hour && hour < self.end_hour
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}
