//! Harvest coordinator - main harvest orchestration logic
//!
//! This module contains the loop that coordinates a whole session:
//! - Opening storage and recording the session in the run ledger
//! - Processing each content id end to end (live document, then history)
//! - Turning per-id failures into recorded failures against the budget
//! - Stopping on a session-fatal storage error
//! - Emitting the termination summary

use crate::config::Config;
use crate::crawler::fetcher::{
    build_http_client, Endpoints, Fetcher, HttpTransport, RetryPolicy, Transport,
};
use crate::crawler::planner::{advance, plan_next_segment, trim_covered, Plan};
use crate::crawler::session::{progress_step, CrawlSession, QuietHours, Termination};
use crate::crawler::HistoryMode;
use crate::document::{
    extract_ordered, parse_comment_document, parse_roll_date_index, CommentDocument,
    ParsedResponse, RollDateError,
};
use crate::model::{Breakpoint, CommentEntry, ContentId};
use crate::output::SessionSummary;
use crate::storage::{
    open_storage, CommentStore, MetadataField, SessionStatus, FALLBACK_SOURCE_MARKER,
};
use crate::HarvestError;
use chrono::Utc;
use std::path::Path;

/// What happened to one content id that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdOutcome {
    /// Upstream served an HTML page instead of a document
    HtmlFallback,

    /// The live document holds the complete history
    Complete { live: usize },

    /// History was needed but the history mode is `None`
    HistorySkipped { live: usize },

    /// History was backfilled from the roll-date index
    Backfilled {
        live: usize,
        history: usize,
        segments: usize,
    },
}

/// A per-id failure together with the action that was being attempted
#[derive(Debug)]
struct Failure {
    action: &'static str,
    error: HarvestError,
}

trait During<T> {
    fn during(self, action: &'static str) -> Result<T, Failure>;
}

impl<T, E: Into<HarvestError>> During<T> for Result<T, E> {
    fn during(self, action: &'static str) -> Result<T, Failure> {
        self.map_err(|e| Failure {
            action,
            error: e.into(),
        })
    }
}

/// Result of a recorded session
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub termination: Termination,
    pub summary: SessionSummary,
}

/// Processes content ids against one transport and one store
pub struct Harvester<T, S> {
    fetcher: Fetcher<T>,
    endpoints: Endpoints,
    store: S,
    history: HistoryMode,
    /// First metadata write that failed for the current id
    deferred: Option<Failure>,
}

impl<T: Transport, S: CommentStore> Harvester<T, S> {
    pub fn new(fetcher: Fetcher<T>, endpoints: Endpoints, store: S, history: HistoryMode) -> Self {
        Self {
            fetcher,
            endpoints,
            store,
            history,
            deferred: None,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Runs the session loop over the whole range
    ///
    /// Ids are processed one at a time in ascending order. The loop stops
    /// early when the failure budget is exhausted or a session-fatal error
    /// occurs. The summary is left to the caller.
    pub async fn run(&mut self, session: &mut CrawlSession, quiet: &QuietHours) -> Termination {
        let total = session.total();
        let step = progress_step(total);
        let end = session.end();
        let mut next = Some(session.start());
        let mut processed: u64 = 0;

        while let Some(id) = next.filter(|id| *id <= end) {
            if processed % step == 0 {
                tracing::info!(
                    "Progress: content id {} ({}/{}), failure score {}, {} skipped so far",
                    id,
                    processed + 1,
                    total,
                    session.failure_score(),
                    session.skipped().len()
                );
            }

            session.begin_id(id);
            match self.harvest_recorded(id).await {
                Ok(outcome) => tracing::debug!("Content id {} done: {:?}", id, outcome),
                Err(failure) => {
                    tracing::error!(
                        "At content id {} failed to {}: {}",
                        id,
                        failure.action,
                        failure.error
                    );
                    session.mark_failed();
                    if failure.error.is_session_fatal() {
                        return Termination::Fatal(failure.error.to_string());
                    }
                }
            }

            if session.finish_id() {
                tracing::error!(
                    "Failure budget exhausted at content id {}, abandoning the rest of the range",
                    id
                );
                return Termination::BudgetExhausted;
            }

            if quiet.is_quiet(Utc::now()) && !quiet.delay().is_zero() {
                tracing::debug!("Quiet hours, pausing {:?}", quiet.delay());
                tokio::time::sleep(quiet.delay()).await;
            }

            processed += 1;
            next = id.next();
        }

        Termination::Completed
    }

    /// Processes one content id end to end
    ///
    /// A failed metadata write does not stop the live and history work, but
    /// the id still counts as failed and its error is returned.
    pub async fn harvest(&mut self, id: ContentId) -> crate::Result<IdOutcome> {
        self.harvest_recorded(id)
            .await
            .map_err(|failure| failure.error)
    }

    async fn harvest_recorded(&mut self, id: ContentId) -> Result<IdOutcome, Failure> {
        self.deferred = None;
        let result = self.harvest_id(id).await;
        match (result, self.deferred.take()) {
            (Ok(_), Some(failure)) => Err(failure),
            (result, _) => result,
        }
    }

    async fn harvest_id(&mut self, id: ContentId) -> Result<IdOutcome, Failure> {
        self.store_best_effort(id, "create metadata row", |store| {
            store.create_metadata(id)
        })?;

        let url = self.endpoints.live_url(id);
        let raw = self
            .fetcher
            .fetch(&url)
            .await
            .during("request live document")?;

        let document = match parse_comment_document(&raw) {
            Ok(ParsedResponse::Document(document)) => document,
            Ok(ParsedResponse::ErrorDocument) => {
                return Err(HarvestError::UpstreamRejection { url }).during("request live document");
            }
            Ok(ParsedResponse::MalformedFallback { title }) => {
                tracing::warn!(
                    "At content id {} got a well-formed HTML page instead of a document ({})",
                    id,
                    title.as_deref().unwrap_or("untitled")
                );
                self.write_metadata(id, MetadataField::Source, FALLBACK_SOURCE_MARKER)?;
                return Ok(IdOutcome::HtmlFallback);
            }
            Err(e) => {
                return Err(HarvestError::MalformedResponse {
                    url,
                    message: e.to_string(),
                })
                .during("parse live document");
            }
        };

        self.write_document_metadata(id, &document)?;

        let live = extract_ordered(&document, id);
        let report = self
            .store
            .insert_entries(id, &live)
            .during("store live comments")?;
        tracing::debug!(
            "Content id {}: {} live entries, {} new rows",
            id,
            live.len(),
            report.total()
        );

        let needs_history = !live.is_empty()
            && document
                .declared_max_limit()
                .is_some_and(|limit| live.len() >= limit);

        if !needs_history {
            return Ok(IdOutcome::Complete { live: live.len() });
        }
        if self.history == HistoryMode::None {
            return Ok(IdOutcome::HistorySkipped { live: live.len() });
        }

        let (history, segments) = self.backfill(id, &live).await?;
        Ok(IdOutcome::Backfilled {
            live: live.len(),
            history,
            segments,
        })
    }

    /// Walks the roll-date index backward from the oldest live entry
    ///
    /// # Returns
    ///
    /// New rows written and segments fetched
    async fn backfill(
        &mut self,
        id: ContentId,
        live: &[CommentEntry],
    ) -> Result<(usize, usize), Failure> {
        let index_url = self.endpoints.rolldate_url(id);
        let raw = self
            .fetcher
            .fetch(&index_url)
            .await
            .during("request roll-date index")?;

        let boundaries = match parse_roll_date_index(&raw) {
            Ok(boundaries) => boundaries,
            Err(RollDateError::Empty) => {
                tracing::info!("Content id {} has no history in its roll-date index", id);
                return Ok((0, 0));
            }
            Err(source) => {
                return Err(HarvestError::IndexDecode {
                    url: index_url,
                    source,
                })
                .during("crawl comments history");
            }
        };

        let mut breakpoint = live.first().map(Breakpoint::at).unwrap_or_else(Breakpoint::unbounded);
        let mut below = boundaries.len();
        let mut history = 0;
        let mut segments = 0;

        while let Plan::Segment { index, timestamp } =
            plan_next_segment(&boundaries, breakpoint, below)
        {
            let url = self.endpoints.segment_url(timestamp, id);
            let raw = self
                .fetcher
                .fetch(&url)
                .await
                .during("request history segment")?;
            let document = segment_document(&url, &raw).during("crawl comments history")?;
            segments += 1;

            let retained = trim_covered(extract_ordered(&document, id), breakpoint);
            let Some(next) = advance(&retained) else {
                tracing::debug!(
                    "Content id {}: segment {} holds nothing older than the breakpoint",
                    id,
                    timestamp
                );
                break;
            };

            let report = self
                .store
                .insert_entries(id, &retained)
                .during("store history segment")?;
            history += report.total();

            if self.history == HistoryMode::SingleSegment {
                break;
            }
            breakpoint = next;
            below = index;
        }

        tracing::info!(
            "Content id {}: backfilled {} rows from {} segments",
            id,
            history,
            segments
        );
        Ok((history, segments))
    }

    fn write_document_metadata(
        &mut self,
        id: ContentId,
        document: &CommentDocument,
    ) -> Result<(), Failure> {
        let fields = [
            (MetadataField::Source, &document.source),
            (MetadataField::MaxLimit, &document.max_limit),
            (MetadataField::MaxCount, &document.max_count),
            (MetadataField::Mission, &document.mission),
        ];
        for (field, value) in fields {
            if let Some(value) = value {
                self.write_metadata(id, field, value)?;
            }
        }
        Ok(())
    }

    fn write_metadata(
        &mut self,
        id: ContentId,
        field: MetadataField,
        value: &str,
    ) -> Result<(), Failure> {
        self.store_best_effort(id, "update content metadata", |store| {
            store.upsert_metadata(id, field, value)
        })
    }

    /// Runs a metadata write whose failure does not stop the pipeline
    ///
    /// The first non-fatal failure is kept and fails the id once the rest of
    /// the work is done. Later ones are only logged.
    fn store_best_effort(
        &mut self,
        id: ContentId,
        action: &'static str,
        op: impl FnOnce(&mut S) -> crate::storage::StorageResult<()>,
    ) -> Result<(), Failure> {
        match op(&mut self.store).map_err(HarvestError::from) {
            Ok(()) => Ok(()),
            Err(error) if error.is_session_fatal() => Err(Failure { action, error }),
            Err(error) => {
                if self.deferred.is_some() {
                    tracing::error!("At content id {} failed to {}: {}", id, action, error);
                } else {
                    self.deferred = Some(Failure { action, error });
                }
                Ok(())
            }
        }
    }
}

/// Parses a history segment, treating anything but a document as a failure
fn segment_document(url: &str, raw: &[u8]) -> crate::Result<CommentDocument> {
    match parse_comment_document(raw) {
        Ok(ParsedResponse::Document(document)) => Ok(document),
        Ok(ParsedResponse::ErrorDocument) => Err(HarvestError::UpstreamRejection {
            url: url.to_string(),
        }),
        Ok(ParsedResponse::MalformedFallback { title }) => Err(HarvestError::MalformedResponse {
            url: url.to_string(),
            message: format!(
                "got an HTML page ({}) instead of a segment",
                title.as_deref().unwrap_or("untitled")
            ),
        }),
        Err(e) => Err(HarvestError::MalformedResponse {
            url: url.to_string(),
            message: e.to_string(),
        }),
    }
}

/// Runs a complete harvest session
///
/// This is the main entry point for a run. It will:
/// 1. Open the storage database
/// 2. Build the HTTP client
/// 3. Record the session in the run ledger
/// 4. Process every id in `[start, end]`
/// 5. Log the termination summary and close the ledger entry
///
/// # Arguments
///
/// * `config` - The harvester configuration
/// * `config_hash` - Hash of the configuration file, stored with the session
/// * `start` - First content id
/// * `end` - Last content id, inclusive
///
/// # Returns
///
/// * `Ok(SessionReport)` - The session ran, successfully or not
/// * `Err(HarvestError)` - Storage or the HTTP client could not be set up
pub async fn run_harvest(
    config: &Config,
    config_hash: &str,
    start: ContentId,
    end: ContentId,
) -> crate::Result<SessionReport> {
    let db_path = Path::new(&config.output.database_path);
    let store = open_storage(db_path).map_err(|e| {
        HarvestError::StorageConnectionLost(format!("open {}: {}", db_path.display(), e))
    })?;
    tracing::info!("Opened database {}", db_path.display());

    let client = build_http_client(&config.remote, &config.fetch)?;
    let fetcher = Fetcher::new(
        HttpTransport::new(client),
        RetryPolicy::from_config(&config.fetch),
    );
    let mut harvester = Harvester::new(
        fetcher,
        Endpoints::from_config(&config.remote),
        store,
        config.session.history,
    );

    let ledger_id = match harvester.store_mut().begin_session(start, end, config_hash) {
        Ok(ledger_id) => Some(ledger_id),
        Err(e) => {
            tracing::warn!("Failed to record session start: {}", e);
            None
        }
    };

    let quiet = QuietHours::from_config(&config.session);
    let mut session = CrawlSession::new(start, end, config.session.failure_budget);
    tracing::info!("History mode: {}", config.session.history);

    let termination = harvester.run(&mut session, &quiet).await;
    let summary = session.finish(termination.clone());

    if let Some(ledger_id) = ledger_id {
        let status = match &termination {
            Termination::Completed => SessionStatus::Completed,
            Termination::BudgetExhausted | Termination::Interrupted => SessionStatus::Aborted,
            Termination::Fatal(_) => SessionStatus::Failed,
        };
        if let Err(e) = harvester
            .store_mut()
            .finish_session(ledger_id, status, session.skipped())
        {
            tracing::error!("Failed to record session end: {}", e);
        }
    }

    Ok(SessionReport {
        termination,
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::fetcher::TransportError;
    use crate::model::RollDateBoundary;
    use crate::storage::{
        CommentCounts, InsertReport, MetadataRecord, SqliteStore, StorageError, StorageResult,
        StoreStatistics,
    };
    use std::collections::HashMap;
    use std::future::Future;
    use std::sync::Mutex;
    use std::time::Duration;

    const DAY: i64 = 86_400;
    const T0: i64 = 1_443_024_000;

    /// Serves fixed bodies by URL and records every request
    #[derive(Default)]
    struct MapTransport {
        bodies: HashMap<String, Vec<u8>>,
        requests: Mutex<Vec<String>>,
    }

    impl MapTransport {
        fn with(mut self, url: &str, body: impl Into<Vec<u8>>) -> Self {
            self.bodies.insert(url.to_string(), body.into());
            self
        }

        fn without(mut self, url: &str) -> Self {
            self.bodies.remove(url);
            self
        }

        fn requested(&self, url: &str) -> usize {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .filter(|u| u.as_str() == url)
                .count()
        }
    }

    impl Transport for MapTransport {
        fn get(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send {
            self.requests.lock().unwrap().push(url.to_string());
            let body = self
                .bodies
                .get(url)
                .cloned()
                .ok_or_else(|| TransportError("connection refused".to_string()));
            async move { body }
        }
    }

    fn disk_full() -> StorageError {
        StorageError::Database("database or disk is full".to_string())
    }

    /// Delegates to SQLite but fails selected writes
    struct FaultyStore {
        inner: SqliteStore,
        inserts: usize,
        /// Comment inserts fail from this call on (0-based)
        insert_fails_from: Option<usize>,
        insert_error: fn() -> StorageError,
        upsert_error: Option<fn() -> StorageError>,
    }

    impl FaultyStore {
        fn new(inner: SqliteStore) -> Self {
            Self {
                inner,
                inserts: 0,
                insert_fails_from: None,
                insert_error: || StorageError::ReconnectFailed("disk unplugged".to_string()),
                upsert_error: None,
            }
        }

        fn lost_connection() -> Self {
            Self {
                insert_fails_from: Some(0),
                ..Self::new(store())
            }
        }

        fn failing_inserts_from(call: usize) -> Self {
            Self {
                insert_fails_from: Some(call),
                insert_error: disk_full,
                ..Self::new(store())
            }
        }

        fn failing_metadata() -> Self {
            Self {
                upsert_error: Some(disk_full),
                ..Self::new(store())
            }
        }
    }

    impl CommentStore for FaultyStore {
        fn create_metadata(&mut self, id: ContentId) -> StorageResult<()> {
            self.inner.create_metadata(id)
        }

        fn upsert_metadata(
            &mut self,
            id: ContentId,
            field: MetadataField,
            value: &str,
        ) -> StorageResult<()> {
            match self.upsert_error {
                Some(error) => Err(error()),
                None => self.inner.upsert_metadata(id, field, value),
            }
        }

        fn metadata(&self, id: ContentId) -> StorageResult<Option<MetadataRecord>> {
            self.inner.metadata(id)
        }

        fn insert_entries(
            &mut self,
            id: ContentId,
            entries: &[CommentEntry],
        ) -> StorageResult<InsertReport> {
            let call = self.inserts;
            self.inserts += 1;
            match self.insert_fails_from {
                Some(from) if call >= from => Err((self.insert_error)()),
                _ => self.inner.insert_entries(id, entries),
            }
        }

        fn count_comments(&self, id: ContentId) -> StorageResult<CommentCounts> {
            self.inner.count_comments(id)
        }

        fn begin_session(
            &mut self,
            start: ContentId,
            end: ContentId,
            config_hash: &str,
        ) -> StorageResult<i64> {
            self.inner.begin_session(start, end, config_hash)
        }

        fn finish_session(
            &mut self,
            session_id: i64,
            status: SessionStatus,
            skipped: &[ContentId],
        ) -> StorageResult<()> {
            self.inner.finish_session(session_id, status, skipped)
        }

        fn statistics(&self) -> StorageResult<StoreStatistics> {
            self.inner.statistics()
        }
    }

    fn cid(value: u64) -> ContentId {
        ContentId::new(value).unwrap()
    }

    fn endpoints() -> Endpoints {
        Endpoints::new("http://comment.test", "http://index.test")
    }

    fn live_url(id: u64) -> String {
        endpoints().live_url(cid(id))
    }

    fn rolldate_url(id: u64) -> String {
        endpoints().rolldate_url(cid(id))
    }

    fn segment_url(timestamp: i64, id: u64) -> String {
        endpoints().segment_url(timestamp, cid(id))
    }

    /// A comment document with one node per id, posted at `base + id`
    fn document(max_limit: usize, ids: impl IntoIterator<Item = i64>, base: i64) -> String {
        let nodes: String = ids
            .into_iter()
            .map(|id| {
                format!(
                    r#"<d p="1.5,1,25,16777215,{},0,abcd,{}">comment {}</d>"#,
                    base + id,
                    id,
                    id
                )
            })
            .collect();
        format!(
            "<i><chatid>100</chatid><mission>0</mission><maxlimit>{}</maxlimit>\
             <source>k-v</source>{}</i>",
            max_limit, nodes
        )
    }

    fn index(days: i64) -> String {
        let boundaries: Vec<String> = (0..days)
            .map(|i| format!(r#"{{"timestamp":"{}","new":"10"}}"#, T0 + i * DAY))
            .collect();
        format!("[{}]", boundaries.join(","))
    }

    fn harvester<S: CommentStore>(
        transport: MapTransport,
        store: S,
        history: HistoryMode,
    ) -> Harvester<MapTransport, S> {
        let policy = RetryPolicy {
            max_attempts: 1,
            relax: Duration::ZERO,
        };
        Harvester::new(Fetcher::new(transport, policy), endpoints(), store, history)
    }

    fn store() -> SqliteStore {
        SqliteStore::new_in_memory().unwrap()
    }

    /// Live ids 100..=102 on day 3, segments on days 2, 1 and 0 overlapping by one id
    fn backfill_transport() -> MapTransport {
        MapTransport::default()
            .with(&live_url(100), document(3, 100..=102, T0 + 2 * DAY))
            .with(&rolldate_url(100), index(3))
            .with(&segment_url(T0 + 2 * DAY, 100), document(3, 90..=100, T0 + DAY))
            .with(&segment_url(T0 + DAY, 100), document(3, 80..=90, T0))
            .with(&segment_url(T0, 100), document(3, 75..=80, T0 - DAY))
    }

    #[tokio::test]
    async fn test_partial_live_document_needs_no_history() {
        let transport = MapTransport::default().with(&live_url(100), document(20, 1..=5, T0));
        let mut harvester = harvester(transport, store(), HistoryMode::All);

        let outcome = harvester.harvest(cid(100)).await.unwrap();

        assert_eq!(outcome, IdOutcome::Complete { live: 5 });
        assert_eq!(harvester.store().count_comments(cid(100)).unwrap().comments, 5);
        assert_eq!(harvester.fetcher_transport().requested(&rolldate_url(100)), 0);

        let metadata = harvester.store().metadata(cid(100)).unwrap().unwrap();
        assert_eq!(metadata.source.as_deref(), Some("k-v"));
        assert_eq!(metadata.max_limit.as_deref(), Some("20"));
        assert_eq!(metadata.mission.as_deref(), Some("0"));
    }

    #[tokio::test]
    async fn test_full_live_document_backfills_all_segments() {
        let mut harvester = harvester(backfill_transport(), store(), HistoryMode::All);

        let outcome = harvester.harvest(cid(100)).await.unwrap();

        assert_eq!(
            outcome,
            IdOutcome::Backfilled {
                live: 3,
                history: 25,
                segments: 3
            }
        );
        assert_eq!(
            harvester.store().count_comments(cid(100)).unwrap().comments,
            28
        );
    }

    #[tokio::test]
    async fn test_single_segment_mode_stops_after_one() {
        let mut harvester = harvester(backfill_transport(), store(), HistoryMode::SingleSegment);

        let outcome = harvester.harvest(cid(100)).await.unwrap();

        assert_eq!(
            outcome,
            IdOutcome::Backfilled {
                live: 3,
                history: 10,
                segments: 1
            }
        );
        let transport = harvester.fetcher_transport();
        assert_eq!(transport.requested(&segment_url(T0 + 2 * DAY, 100)), 1);
        assert_eq!(transport.requested(&segment_url(T0 + DAY, 100)), 0);
    }

    #[tokio::test]
    async fn test_history_mode_none_skips_index() {
        let mut harvester = harvester(backfill_transport(), store(), HistoryMode::None);

        let outcome = harvester.harvest(cid(100)).await.unwrap();

        assert_eq!(outcome, IdOutcome::HistorySkipped { live: 3 });
        assert_eq!(harvester.fetcher_transport().requested(&rolldate_url(100)), 0);
    }

    #[tokio::test]
    async fn test_segment_with_nothing_older_ends_pass() {
        let transport = MapTransport::default()
            .with(&live_url(7), document(2, 50..=51, T0 + 2 * DAY))
            .with(&rolldate_url(7), index(3))
            .with(&segment_url(T0 + 2 * DAY, 7), document(2, 60..=61, T0 + DAY));
        let mut harvester = harvester(transport, store(), HistoryMode::All);

        let outcome = harvester.harvest(cid(7)).await.unwrap();

        assert_eq!(
            outcome,
            IdOutcome::Backfilled {
                live: 2,
                history: 0,
                segments: 1
            }
        );
        assert_eq!(
            harvester
                .fetcher_transport()
                .requested(&segment_url(T0 + DAY, 7)),
            0
        );
    }

    #[tokio::test]
    async fn test_empty_index_is_not_a_failure() {
        let transport = MapTransport::default()
            .with(&live_url(8), document(2, 1..=2, T0))
            .with(&rolldate_url(8), "[]");
        let mut harvester = harvester(transport, store(), HistoryMode::All);

        let outcome = harvester.harvest(cid(8)).await.unwrap();

        assert_eq!(
            outcome,
            IdOutcome::Backfilled {
                live: 2,
                history: 0,
                segments: 0
            }
        );
    }

    #[tokio::test]
    async fn test_bad_index_fails_but_keeps_live_entries() {
        let transport = MapTransport::default()
            .with(&live_url(9), document(2, 1..=2, T0))
            .with(&rolldate_url(9), "not json");
        let mut harvester = harvester(transport, store(), HistoryMode::All);

        let result = harvester.harvest(cid(9)).await;

        assert!(matches!(result, Err(HarvestError::IndexDecode { .. })));
        assert_eq!(harvester.store().count_comments(cid(9)).unwrap().comments, 2);
    }

    #[tokio::test]
    async fn test_error_document_is_rejection() {
        let transport = MapTransport::default().with(&live_url(3), "<i>error</i>");
        let mut harvester = harvester(transport, store(), HistoryMode::All);

        let result = harvester.harvest(cid(3)).await;

        assert!(matches!(result, Err(HarvestError::UpstreamRejection { .. })));
    }

    #[tokio::test]
    async fn test_html_page_records_fallback() {
        let transport = MapTransport::default().with(
            &live_url(4),
            "<html><head><title>502 Bad Gateway</title></head><body><hr></body></html>",
        );
        let mut harvester = harvester(transport, store(), HistoryMode::All);

        let outcome = harvester.harvest(cid(4)).await.unwrap();

        assert_eq!(outcome, IdOutcome::HtmlFallback);
        let metadata = harvester.store().metadata(cid(4)).unwrap().unwrap();
        assert_eq!(metadata.source.as_deref(), Some(FALLBACK_SOURCE_MARKER));
    }

    #[tokio::test]
    async fn test_protected_entries_stored_apart() {
        let live = r#"<i><maxlimit>100</maxlimit>
            <d p="1,1,25,0,1443024010,0,u,10">a</d>
            <d p="2,1,25,0,1443024011,0,u,11">b</d>
            <d p="3,4,25,0,1443024001,2,u,3">protected</d>
        </i>"#;
        let transport = MapTransport::default().with(&live_url(6), live);
        let mut harvester = harvester(transport, store(), HistoryMode::All);

        harvester.harvest(cid(6)).await.unwrap();

        assert_eq!(
            harvester.store().count_comments(cid(6)).unwrap(),
            CommentCounts {
                comments: 2,
                special_comments: 1
            }
        );
    }

    #[tokio::test]
    async fn test_budget_aborts_before_range_end() {
        let mut harvester = harvester(MapTransport::default(), store(), HistoryMode::All);
        let mut session = CrawlSession::new(cid(1), cid(20), 10);

        let termination = harvester.run(&mut session, &QuietHours::disabled()).await;

        assert_eq!(termination, Termination::BudgetExhausted);
        assert_eq!(session.current(), cid(10));
        assert_eq!(session.skipped().len(), 10);
        assert_eq!(harvester.fetcher_transport().requested(&live_url(11)), 0);
        session.finish(termination);
    }

    #[tokio::test]
    async fn test_successes_keep_session_alive() {
        let mut transport = MapTransport::default();
        for id in (2..=30).step_by(2) {
            transport = transport.with(&live_url(id), document(50, 1..=3, T0));
        }
        let mut harvester = harvester(transport, store(), HistoryMode::All);
        let mut session = CrawlSession::new(cid(1), cid(30), 10);

        let termination = harvester.run(&mut session, &QuietHours::disabled()).await;

        assert_eq!(termination, Termination::Completed);
        assert_eq!(session.skipped().len(), 15);
        assert_eq!(session.skipped()[0], cid(1));
        let summary = session.finish(termination);
        assert!(summary.successful);
        assert_eq!(summary.covered_end, cid(30));
    }

    #[tokio::test]
    async fn test_lost_connection_is_fatal() {
        let transport = MapTransport::default()
            .with(&live_url(1), document(50, 1..=3, T0))
            .with(&live_url(2), document(50, 1..=3, T0));
        let mut harvester = harvester(transport, FaultyStore::lost_connection(), HistoryMode::All);
        let mut session = CrawlSession::new(cid(1), cid(2), 10);

        let termination = harvester.run(&mut session, &QuietHours::disabled()).await;

        assert!(matches!(termination, Termination::Fatal(_)));
        assert_eq!(session.skipped(), &[cid(1)]);
        assert_eq!(harvester.fetcher_transport().requested(&live_url(2)), 0);
        session.finish(termination);
    }

    /// Live rows of `backfill_transport` stay stored and the walk stops at the first segment
    fn assert_backfill_stopped<S: CommentStore>(harvester: &Harvester<MapTransport, S>) {
        assert_eq!(harvester.store().count_comments(cid(100)).unwrap().comments, 3);
        let transport = harvester.fetcher_transport();
        assert_eq!(transport.requested(&segment_url(T0 + 2 * DAY, 100)), 1);
        assert_eq!(transport.requested(&segment_url(T0 + DAY, 100)), 0);
    }

    #[tokio::test]
    async fn test_unreachable_segment_fails_backfill() {
        let transport = backfill_transport().without(&segment_url(T0 + 2 * DAY, 100));
        let mut harvester = harvester(transport, store(), HistoryMode::All);

        let result = harvester.harvest(cid(100)).await;

        assert!(matches!(result, Err(HarvestError::TransientNetwork { .. })));
        assert_backfill_stopped(&harvester);
    }

    #[tokio::test]
    async fn test_rejected_segment_fails_backfill() {
        let transport = backfill_transport().with(&segment_url(T0 + 2 * DAY, 100), "<i>error</i>");
        let mut harvester = harvester(transport, store(), HistoryMode::All);

        let result = harvester.harvest(cid(100)).await;

        assert!(matches!(result, Err(HarvestError::UpstreamRejection { .. })));
        assert_backfill_stopped(&harvester);
    }

    #[tokio::test]
    async fn test_failed_segment_insert_fails_backfill() {
        let mut harvester = harvester(
            backfill_transport(),
            FaultyStore::failing_inserts_from(1),
            HistoryMode::All,
        );

        let result = harvester.harvest(cid(100)).await;

        match result {
            Err(error) => assert!(!error.is_session_fatal(), "unexpected {:?}", error),
            Ok(outcome) => panic!("expected a storage failure, got {:?}", outcome),
        }
        assert_backfill_stopped(&harvester);
    }

    #[tokio::test]
    async fn test_failed_metadata_write_fails_id() {
        let transport = MapTransport::default().with(&live_url(1), document(50, 1..=3, T0));
        let mut harvester = harvester(transport, FaultyStore::failing_metadata(), HistoryMode::All);

        let result = harvester.harvest(cid(1)).await;

        assert!(result.is_err());
        assert_eq!(harvester.store().count_comments(cid(1)).unwrap().comments, 3);
    }

    #[tokio::test]
    async fn test_failed_metadata_write_is_skipped_in_session() {
        let transport = MapTransport::default()
            .with(&live_url(1), document(50, 1..=3, T0))
            .with(&live_url(2), document(50, 1..=2, T0));
        let mut harvester = harvester(transport, FaultyStore::failing_metadata(), HistoryMode::All);
        let mut session = CrawlSession::new(cid(1), cid(2), 10);

        let termination = harvester.run(&mut session, &QuietHours::disabled()).await;

        assert_eq!(termination, Termination::Completed);
        assert_eq!(session.skipped(), &[cid(1), cid(2)]);
        assert_eq!(session.failure_score(), 2);
        assert_eq!(harvester.store().count_comments(cid(2)).unwrap().comments, 2);
        session.finish(termination);
    }

    #[tokio::test]
    async fn test_metadata_failure_does_not_leak_to_next_id() {
        let transport = MapTransport::default().with(&live_url(5), document(50, 1..=3, T0));
        let mut harvester = harvester(transport, FaultyStore::failing_metadata(), HistoryMode::All);
        assert!(harvester.harvest(cid(5)).await.is_err());

        harvester.store_mut().upsert_error = None;
        let outcome = harvester.harvest(cid(5)).await.unwrap();

        assert_eq!(outcome, IdOutcome::Complete { live: 3 });
    }

    #[test]
    fn test_index_fixture_decodes() {
        let boundaries = parse_roll_date_index(index(2).as_bytes()).unwrap();
        assert_eq!(
            boundaries[1],
            RollDateBoundary {
                timestamp: T0 + DAY,
                approx_new_count: 10
            }
        );
    }

    impl<S> Harvester<MapTransport, S> {
        fn fetcher_transport(&self) -> &MapTransport {
            self.fetcher.transport()
        }
    }
}
