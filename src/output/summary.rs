//! Session termination summary

use crate::model::ContentId;
use std::fmt;
use std::time::Duration;

/// What a session reports when it ends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub successful: bool,
    pub range_start: ContentId,
    /// Last id the session reached, capped at the requested end
    pub covered_end: ContentId,
    pub duration: Duration,
    pub skipped: Vec<ContentId>,
}

impl SessionSummary {
    /// Number of ids in the covered range
    pub fn covered_total(&self) -> u64 {
        self.covered_end
            .get()
            .saturating_sub(self.range_start.get())
            .saturating_add(1)
    }

    /// Writes the summary to the log, one line per part
    pub fn log(&self) {
        if self.successful {
            tracing::info!("{}", self.headline());
            tracing::info!("Time spent: {}", format_duration(self.duration));
            tracing::info!("{}", self.skipped_line());
        } else {
            tracing::error!("{}", self.headline());
            tracing::error!("Time spent: {}", format_duration(self.duration));
            tracing::error!("{}", self.skipped_line());
        }
    }

    fn headline(&self) -> String {
        format!(
            "{} termination, harvested content ids {} to {} ({} in total)",
            if self.successful {
                "Successful"
            } else {
                "Unexpected"
            },
            self.range_start,
            self.covered_end,
            self.covered_total()
        )
    }

    fn skipped_line(&self) -> String {
        if self.skipped.is_empty() {
            return "All ids harvested successfully".to_string();
        }
        let ids: Vec<String> = self.skipped.iter().map(ContentId::to_string).collect();
        format!("Skipped {} ids: {}", ids.len(), ids.join(", "))
    }
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}; time spent: {}; {}",
            self.headline(),
            format_duration(self.duration),
            self.skipped_line()
        )
    }
}

fn plural(count: u64, unit: &str) -> String {
    if count == 1 {
        format!("{} {}", count, unit)
    } else {
        format!("{} {}s", count, unit)
    }
}

/// Formats a duration in words using its two largest non-zero units
///
/// ```
/// use danmaku_harvest::output::format_duration;
/// use std::time::Duration;
///
/// assert_eq!(format_duration(Duration::from_secs(3900)), "1 hour and 5 minutes");
/// assert_eq!(format_duration(Duration::from_secs(42)), "less than a minute");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    if total < 60 {
        return "less than a minute".to_string();
    }

    let units = [
        (total / 86_400, "day"),
        (total % 86_400 / 3_600, "hour"),
        (total % 3_600 / 60, "minute"),
        (total % 60, "second"),
    ];

    let parts: Vec<String> = units
        .iter()
        .filter(|(count, _)| *count > 0)
        .take(2)
        .map(|(count, unit)| plural(*count, unit))
        .collect();

    parts.join(" and ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cid(value: u64) -> ContentId {
        ContentId::new(value).unwrap()
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::ZERO), "less than a minute");
        assert_eq!(format_duration(Duration::from_secs(59)), "less than a minute");
        assert_eq!(format_duration(Duration::from_secs(60)), "1 minute");
        assert_eq!(format_duration(Duration::from_secs(61)), "1 minute and 1 second");
        assert_eq!(format_duration(Duration::from_secs(7_200)), "2 hours");
        assert_eq!(
            format_duration(Duration::from_secs(90_061)),
            "1 day and 1 hour"
        );
        assert_eq!(
            format_duration(Duration::from_secs(2 * 86_400 + 30)),
            "2 days and 30 seconds"
        );
    }

    #[test]
    fn test_summary_text() {
        let summary = SessionSummary {
            successful: false,
            range_start: cid(10),
            covered_end: cid(14),
            duration: Duration::from_secs(125),
            skipped: vec![cid(11), cid(13)],
        };

        assert_eq!(summary.covered_total(), 5);
        assert_eq!(
            summary.to_string(),
            "Unexpected termination, harvested content ids 10 to 14 (5 in total); \
             time spent: 2 minutes and 5 seconds; Skipped 2 ids: 11, 13"
        );
    }

    #[test]
    fn test_summary_without_skips() {
        let summary = SessionSummary {
            successful: true,
            range_start: cid(1),
            covered_end: cid(1),
            duration: Duration::from_secs(1),
            skipped: vec![],
        };

        assert!(summary.to_string().ends_with("All ids harvested successfully"));
    }
}
