//! Integration tests for the harvester
//!
//! These tests use wiremock to stand in for the comment service and run
//! whole sessions end-to-end against a temporary database.

use danmaku_harvest::config::Config;
use danmaku_harvest::crawler::{run_harvest, Termination};
use danmaku_harvest::storage::{CommentStore, SessionStatus, SqliteStore};
use danmaku_harvest::ContentId;
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const DAY: i64 = 86_400;
const T0: i64 = 1_443_024_000;

/// Creates a test configuration pointing at the mock server
fn create_test_config(base_url: &str, dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.remote.comment_base_url = base_url.to_string();
    config.remote.rolldate_base_url = base_url.to_string();
    config.fetch.max_attempts = 2;
    config.fetch.relax_duration_ms = 10;
    config.fetch.timeout_secs = 5;
    config.session.quiet_hours_start = 0;
    config.session.quiet_hours_end = 0;
    config.output.database_path = dir.path().join("harvest.db").display().to_string();
    config.output.log_dir = dir.path().join("log").display().to_string();
    config
}

fn cid(value: u64) -> ContentId {
    ContentId::new(value).unwrap()
}

/// A comment document with one node per id, posted at `base + id`
fn comment_document(max_limit: usize, ids: impl IntoIterator<Item = i64>, base: i64) -> String {
    let nodes: String = ids
        .into_iter()
        .map(|id| {
            format!(
                r#"<d p="3.2,1,25,16777215,{},0,5f3a9c1e,{}">comment number {}</d>"#,
                base + id,
                id,
                id
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?><i><chatserver>chat.example.com</chatserver><chatid>100</chatid><mission>0</mission><maxlimit>{}</maxlimit><source>k-v</source>{}</i>"#,
        max_limit, nodes
    )
}

fn open_store(config: &Config) -> SqliteStore {
    SqliteStore::open(Path::new(&config.output.database_path)).unwrap()
}

async fn mount_xml(server: &MockServer, route: &str, body: String, times: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(body)
                .insert_header("content-type", "text/xml"),
        )
        .expect(times)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_full_live_document_triggers_backfill() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&mock_server.uri(), &dir);

    mount_xml(
        &mock_server,
        "/100.xml",
        comment_document(20, 1001..=1020, T0 + DAY),
        1,
    )
    .await;

    Mock::given(method("GET"))
        .and(path("/rolldate,100"))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!(
            r#"[{{"timestamp":"{}","new":"31"}}]"#,
            T0
        )))
        .expect(1)
        .mount(&mock_server)
        .await;

    mount_xml(
        &mock_server,
        &format!("/dmroll,{},100", T0),
        comment_document(20, 990..=1001, T0),
        1,
    )
    .await;

    let report = run_harvest(&config, "test-hash", cid(100), cid(100))
        .await
        .unwrap();

    assert_eq!(report.termination, Termination::Completed);
    assert!(report.summary.successful);
    assert!(report.summary.skipped.is_empty());

    let store = open_store(&config);
    assert_eq!(store.count_comments(cid(100)).unwrap().comments, 31);

    let metadata = store.metadata(cid(100)).unwrap().unwrap();
    assert_eq!(metadata.max_limit.as_deref(), Some("20"));
    assert_eq!(metadata.source.as_deref(), Some("k-v"));
}

#[tokio::test]
async fn test_partial_live_document_skips_history() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&mock_server.uri(), &dir);

    mount_xml(&mock_server, "/100.xml", comment_document(20, 1..=5, T0), 1).await;

    Mock::given(method("GET"))
        .and(path("/rolldate,100"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
        .expect(0)
        .mount(&mock_server)
        .await;

    let report = run_harvest(&config, "test-hash", cid(100), cid(100))
        .await
        .unwrap();

    assert_eq!(report.termination, Termination::Completed);
    let store = open_store(&config);
    assert_eq!(store.count_comments(cid(100)).unwrap().comments, 5);
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&mock_server.uri(), &dir);

    mount_xml(&mock_server, "/100.xml", comment_document(20, 1..=5, T0), 2).await;

    for _ in 0..2 {
        let report = run_harvest(&config, "test-hash", cid(100), cid(100))
            .await
            .unwrap();
        assert_eq!(report.termination, Termination::Completed);
    }

    let store = open_store(&config);
    assert_eq!(store.count_comments(cid(100)).unwrap().comments, 5);
    assert_eq!(store.statistics().unwrap().sessions, 2);
}

#[tokio::test]
async fn test_error_document_skips_id() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&mock_server.uri(), &dir);

    mount_xml(&mock_server, "/100.xml", "<i>error</i>".to_string(), 1).await;
    mount_xml(&mock_server, "/101.xml", comment_document(20, 1..=2, T0), 1).await;

    let report = run_harvest(&config, "test-hash", cid(100), cid(101))
        .await
        .unwrap();

    assert_eq!(report.termination, Termination::Completed);
    assert_eq!(report.summary.skipped, vec![cid(100)]);
    assert_eq!(report.summary.covered_total(), 2);

    let stats = open_store(&config).statistics().unwrap();
    let latest = stats.latest_session.unwrap();
    assert_eq!(latest.status, SessionStatus::Completed);
    assert_eq!(latest.skipped.as_deref(), Some("100"));
    assert_eq!(latest.config_hash, "test-hash");
}

#[tokio::test]
async fn test_html_page_is_recorded_as_fallback() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let config = create_test_config(&mock_server.uri(), &dir);

    Mock::given(method("GET"))
        .and(path("/100.xml"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(
                    "<html><head><title>Service Unavailable</title></head><body><br></body></html>",
                )
                .insert_header("content-type", "text/html"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let report = run_harvest(&config, "test-hash", cid(100), cid(100))
        .await
        .unwrap();

    assert_eq!(report.termination, Termination::Completed);
    assert!(report.summary.skipped.is_empty());

    let stats = open_store(&config).statistics().unwrap();
    assert_eq!(stats.fallback_content_ids, 1);
    assert_eq!(stats.comments, 0);
}

#[tokio::test]
async fn test_failure_budget_aborts_session() {
    let mock_server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = create_test_config(&mock_server.uri(), &dir);
    config.session.failure_budget = 3;

    // Nothing is mounted: every live document comes back as an empty 404
    let report = run_harvest(&config, "test-hash", cid(1), cid(20))
        .await
        .unwrap();

    assert_eq!(report.termination, Termination::BudgetExhausted);
    assert!(!report.summary.successful);
    assert_eq!(report.summary.skipped, vec![cid(1), cid(2), cid(3)]);
    assert_eq!(report.summary.covered_end, cid(3));

    let latest = open_store(&config)
        .statistics()
        .unwrap()
        .latest_session
        .unwrap();
    assert_eq!(latest.status, SessionStatus::Aborted);
    assert_eq!(latest.skipped.as_deref(), Some("1,2,3"));
}

#[tokio::test]
async fn test_unreachable_service_fails_ids() {
    let dir = tempfile::tempdir().unwrap();
    // Nothing listens on port 9 of localhost
    let config = create_test_config("http://127.0.0.1:9", &dir);

    let report = run_harvest(&config, "test-hash", cid(5), cid(5))
        .await
        .unwrap();

    assert_eq!(report.termination, Termination::Completed);
    assert_eq!(report.summary.skipped, vec![cid(5)]);
}
