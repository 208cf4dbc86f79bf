//! Integration tests for the ingestion pipeline against a mock listing
//! server.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

use reddit_sentiment_ingest::config::Config;
use reddit_sentiment_ingest::db::{
    append_record, count_records, get_record, is_post_seen, Database, NewRecord,
};
use reddit_sentiment_ingest::pipeline::{PipelineController, RunOptions};
use reddit_sentiment_ingest::sentiment::{
    LexiconScorer, ScoreError, SentimentScore, SentimentScorer,
};

/// Create a test configuration pointed at the mock server.
fn create_test_config(base_url: &str) -> Config {
    Config {
        source_base_url: base_url.to_string(),
        ..Config::for_testing()
    }
}

async fn setup_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("test.sqlite");
    let db = Database::new(&db_path)
        .await
        .expect("Failed to create database");
    (db, temp_dir)
}

fn run_options(subreddit: &str) -> RunOptions {
    RunOptions {
        subreddit: subreddit.to_string(),
        language: "rust".to_string(),
        max_pages: 0,
        since: None,
    }
}

/// Build a listing page body. Each entry is (id, selftext).
fn listing_body(entries: &[(&str, &str)], after: Option<&str>) -> serde_json::Value {
    let children: Vec<serde_json::Value> = entries
        .iter()
        .map(|(id, selftext)| {
            json!({
                "kind": "t3",
                "data": {
                    "id": id,
                    "permalink": format!("/r/rust/comments/{id}/post/"),
                    "title": format!("Post {id}"),
                    "author": "someone",
                    "subreddit": "rust",
                    "selftext": selftext,
                    "created_utc": 1_722_859_200.0,
                }
            })
        })
        .collect();

    json!({
        "kind": "Listing",
        "data": { "after": after, "children": children }
    })
}

async fn mount_single_page(server: &MockServer, entries: &[(&str, &str)]) {
    Mock::given(method("GET"))
        .and(path("/r/rust/hot.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing_body(entries, None)))
        .mount(server)
        .await;
}

/// Scorer wrapper that counts how many times it is invoked.
struct CountingScorer {
    inner: LexiconScorer,
    calls: Arc<AtomicUsize>,
}

impl SentimentScorer for CountingScorer {
    fn score(&self, text: &str) -> Result<SentimentScore, ScoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.score(text)
    }

    fn version(&self) -> &str {
        "counting/1"
    }
}

/// Scorer that is permanently unavailable.
struct DownScorer;

impl SentimentScorer for DownScorer {
    fn score(&self, _text: &str) -> Result<SentimentScore, ScoreError> {
        Err(ScoreError::ScorerUnavailable {
            reason: "scorer offline".to_string(),
        })
    }

    fn version(&self) -> &str {
        "down/1"
    }
}

#[tokio::test]
async fn test_run_persists_new_posts() {
    let (db, _temp_dir) = setup_db().await;
    let mock_server = MockServer::start().await;
    mount_single_page(
        &mock_server,
        &[
            ("aaa", "I love this release"),
            ("bbb", "the docs are terrible"),
            ("ccc", "plain neutral text"),
        ],
    )
    .await;

    let config = create_test_config(&mock_server.uri());
    let mut controller =
        PipelineController::new(config, db.clone(), Arc::new(LexiconScorer::new())).unwrap();

    let summary = controller
        .run(&run_options("rust"), CancellationToken::new())
        .await
        .expect("run failed");

    assert_eq!(summary.fetched, 3);
    assert_eq!(summary.persisted, 3);
    assert_eq!(summary.failed, 0);
    assert_eq!(count_records(db.pool()).await.unwrap(), 3);

    let record = get_record(db.pool(), "aaa")
        .await
        .unwrap()
        .expect("record not found");
    assert_eq!(record.subreddit, "rust");
    assert_eq!(record.source_language, "rust");
    assert_eq!(record.post_date, "1722859200");
    assert!(record.post_url.ends_with("/r/rust/comments/aaa/post/"));
    assert!(record.sentiment.compound > 0.0);
    assert!((-1.0..=1.0).contains(&record.sentiment.compound));
    assert!(is_post_seen(db.pool(), "aaa").await.unwrap());
}

#[tokio::test]
async fn test_run_is_idempotent() {
    let (db, _temp_dir) = setup_db().await;
    let mock_server = MockServer::start().await;
    mount_single_page(&mock_server, &[("aaa", "great"), ("bbb", "bad")]).await;

    let config = create_test_config(&mock_server.uri());
    let mut controller =
        PipelineController::new(config, db.clone(), Arc::new(LexiconScorer::new())).unwrap();

    let first = controller
        .run(&run_options("rust"), CancellationToken::new())
        .await
        .expect("first run failed");
    assert_eq!(first.persisted, 2);

    let second = controller
        .run(&run_options("rust"), CancellationToken::new())
        .await
        .expect("second run failed");
    assert_eq!(second.persisted, 0);
    assert_eq!(second.skipped_duplicate, 2);

    assert_eq!(count_records(db.pool()).await.unwrap(), 2);
}

#[tokio::test]
async fn test_duplicate_within_page_scored_once() {
    let (db, _temp_dir) = setup_db().await;
    let mock_server = MockServer::start().await;
    // The listing repeats id "aaa" within a single page.
    mount_single_page(
        &mock_server,
        &[("aaa", "first copy"), ("bbb", "other post"), ("aaa", "second copy")],
    )
    .await;

    let calls = Arc::new(AtomicUsize::new(0));
    let scorer = Arc::new(CountingScorer {
        inner: LexiconScorer::new(),
        calls: Arc::clone(&calls),
    });

    let config = create_test_config(&mock_server.uri());
    let mut controller = PipelineController::new(config, db.clone(), scorer).unwrap();

    let summary = controller
        .run(&run_options("rust"), CancellationToken::new())
        .await
        .expect("run failed");

    assert_eq!(summary.fetched, 3);
    assert_eq!(summary.persisted, 2);
    assert_eq!(summary.skipped_duplicate, 1);
    assert_eq!(count_records(db.pool()).await.unwrap(), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2, "duplicate must not be re-scored");
}

#[tokio::test]
async fn test_crash_between_append_and_mark_heals() {
    let (db, _temp_dir) = setup_db().await;

    // Simulate a crash after the record append but before the dedup mark:
    // the record exists, the membership set does not know it.
    let orphan = NewRecord {
        post_id: "aaa".to_string(),
        post_url: "https://www.reddit.com/r/rust/comments/aaa/post/".to_string(),
        source_language: "rust".to_string(),
        scraped_at: "2024-08-01T00:00:00.000000Z".to_string(),
        title: "Post aaa".to_string(),
        author: "someone".to_string(),
        subreddit: "rust".to_string(),
        post_date: "1722859200".to_string(),
        content: "I love this release".to_string(),
        sentiment: SentimentScore::NEUTRAL,
        scorer_version: "lexicon/1".to_string(),
    };
    append_record(db.pool(), &orphan).await.unwrap();
    assert!(!is_post_seen(db.pool(), "aaa").await.unwrap());

    let mock_server = MockServer::start().await;
    mount_single_page(&mock_server, &[("aaa", "I love this release")]).await;

    let config = create_test_config(&mock_server.uri());
    let mut controller =
        PipelineController::new(config, db.clone(), Arc::new(LexiconScorer::new())).unwrap();

    let summary = controller
        .run(&run_options("rust"), CancellationToken::new())
        .await
        .expect("run failed");

    // No duplicate row; the post is now marked and will be skipped next run.
    assert_eq!(summary.persisted, 1);
    assert_eq!(count_records(db.pool()).await.unwrap(), 1);
    assert!(is_post_seen(db.pool(), "aaa").await.unwrap());

    // The originally stored sentiment is untouched.
    let stored = get_record(db.pool(), "aaa").await.unwrap().unwrap();
    assert_eq!(stored.sentiment, SentimentScore::NEUTRAL);
}

#[tokio::test]
async fn test_fetch_failure_ends_run_gracefully() {
    let (db, _temp_dir) = setup_db().await;
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/r/rust/hot.json"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2) // fetch_max_attempts in the test config
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri());
    let mut controller =
        PipelineController::new(config, db.clone(), Arc::new(LexiconScorer::new())).unwrap();

    let summary = controller
        .run(&run_options("rust"), CancellationToken::new())
        .await
        .expect("run should end gracefully, not error");

    assert_eq!(summary.fetched, 0);
    assert_eq!(summary.persisted, 0);
    mock_server.verify().await;
}

#[tokio::test]
async fn test_pagination_follows_cursor() {
    let (db, _temp_dir) = setup_db().await;
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/r/rust/hot.json"))
        .and(query_param_is_missing("after"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing_body(
            &[("aaa", "first page post")],
            Some("t3_aaa"),
        )))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/r/rust/hot.json"))
        .and(query_param("after", "t3_aaa"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(listing_body(&[("bbb", "second page post")], None)),
        )
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri());
    let mut controller =
        PipelineController::new(config, db.clone(), Arc::new(LexiconScorer::new())).unwrap();

    let summary = controller
        .run(&run_options("rust"), CancellationToken::new())
        .await
        .expect("run failed");

    assert_eq!(summary.fetched, 2);
    assert_eq!(summary.persisted, 2);
    assert!(get_record(db.pool(), "bbb").await.unwrap().is_some());
}

#[tokio::test]
async fn test_max_pages_bounds_run() {
    let (db, _temp_dir) = setup_db().await;
    let mock_server = MockServer::start().await;

    // Every page points to another one; only max_pages should be walked.
    Mock::given(method("GET"))
        .and(path("/r/rust/hot.json"))
        .and(query_param_is_missing("after"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing_body(
            &[("aaa", "page one")],
            Some("t3_aaa"),
        )))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/r/rust/hot.json"))
        .and(query_param("after", "t3_aaa"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing_body(
            &[("bbb", "page two")],
            Some("t3_bbb"),
        )))
        .expect(0)
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri());
    let mut controller =
        PipelineController::new(config, db.clone(), Arc::new(LexiconScorer::new())).unwrap();

    let options = RunOptions {
        max_pages: 1,
        ..run_options("rust")
    };
    let summary = controller
        .run(&options, CancellationToken::new())
        .await
        .expect("run failed");

    assert_eq!(summary.fetched, 1);
    mock_server.verify().await;
}

#[tokio::test]
async fn test_since_cutoff_stops_paging() {
    let (db, _temp_dir) = setup_db().await;
    let mock_server = MockServer::start().await;

    // All entries on the first page are older than the cutoff.
    Mock::given(method("GET"))
        .and(path("/r/rust/hot.json"))
        .and(query_param_is_missing("after"))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing_body(
            &[("aaa", "old post"), ("bbb", "old post")],
            Some("t3_bbb"),
        )))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/r/rust/hot.json"))
        .and(query_param("after", "t3_bbb"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(listing_body(&[("ccc", "older still")], None)),
        )
        .expect(0)
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri());
    let mut controller =
        PipelineController::new(config, db.clone(), Arc::new(LexiconScorer::new())).unwrap();

    // Fixture entries report created_utc = 1722859200; bound is later.
    let options = RunOptions {
        since: Some(chrono::DateTime::from_timestamp(1_800_000_000, 0).unwrap()),
        ..run_options("rust")
    };
    let summary = controller
        .run(&options, CancellationToken::new())
        .await
        .expect("run failed");

    assert_eq!(summary.older_than_cutoff, 2);
    assert_eq!(summary.persisted, 0);
    mock_server.verify().await;
}

#[tokio::test]
async fn test_empty_text_scores_neutral() {
    let (db, _temp_dir) = setup_db().await;
    let mock_server = MockServer::start().await;

    // A link post: no selftext, and a title with no lexicon words.
    let body = json!({
        "kind": "Listing",
        "data": {
            "after": null,
            "children": [{
                "kind": "t3",
                "data": {
                    "id": "aaa",
                    "permalink": "/r/rust/comments/aaa/post/",
                    "title": "",
                    "subreddit": "rust",
                    "selftext": "",
                    "created_utc": 1_722_859_200.0,
                }
            }]
        }
    });
    Mock::given(method("GET"))
        .and(path("/r/rust/hot.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri());
    let mut controller =
        PipelineController::new(config, db.clone(), Arc::new(LexiconScorer::new())).unwrap();

    controller
        .run(&run_options("rust"), CancellationToken::new())
        .await
        .expect("run failed");

    let record = get_record(db.pool(), "aaa").await.unwrap().unwrap();
    assert_eq!(record.sentiment, SentimentScore::NEUTRAL);
    assert_eq!(record.author, "");
    assert_eq!(record.content, "");
}

#[tokio::test]
async fn test_malformed_entries_are_skipped_not_fatal() {
    let (db, _temp_dir) = setup_db().await;
    let mock_server = MockServer::start().await;

    let body = json!({
        "kind": "Listing",
        "data": {
            "after": null,
            "children": [
                { "kind": "t3", "data": { "title": "no id at all" } },
                {
                    "kind": "t3",
                    "data": {
                        "id": "bbb",
                        "permalink": "/r/rust/comments/bbb/post/",
                        "title": "Post bbb",
                        "subreddit": "rust",
                        "selftext": "works great",
                        "created_utc": 1_722_859_200.0,
                    }
                },
            ]
        }
    });
    Mock::given(method("GET"))
        .and(path("/r/rust/hot.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&mock_server)
        .await;

    let config = create_test_config(&mock_server.uri());
    let mut controller =
        PipelineController::new(config, db.clone(), Arc::new(LexiconScorer::new())).unwrap();

    let summary = controller
        .run(&run_options("rust"), CancellationToken::new())
        .await
        .expect("run failed");

    assert_eq!(summary.malformed, 1);
    assert_eq!(summary.persisted, 1);
    assert!(get_record(db.pool(), "bbb").await.unwrap().is_some());
}

#[tokio::test]
async fn test_scorer_failure_leaves_post_for_future_run() {
    let (db, _temp_dir) = setup_db().await;
    let mock_server = MockServer::start().await;
    mount_single_page(&mock_server, &[("aaa", "some text")]).await;

    let config = create_test_config(&mock_server.uri());
    let mut controller =
        PipelineController::new(config.clone(), db.clone(), Arc::new(DownScorer)).unwrap();

    let summary = controller
        .run(&run_options("rust"), CancellationToken::new())
        .await
        .expect("run should not error on scorer failure");

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.persisted, 0);
    assert_eq!(count_records(db.pool()).await.unwrap(), 0);
    // Never marked: the post stays eligible for a future run.
    assert!(!is_post_seen(db.pool(), "aaa").await.unwrap());

    // A later run with a working scorer picks the post up.
    let mut retry_controller =
        PipelineController::new(config, db.clone(), Arc::new(LexiconScorer::new())).unwrap();
    let retry = retry_controller
        .run(&run_options("rust"), CancellationToken::new())
        .await
        .expect("retry run failed");
    assert_eq!(retry.persisted, 1);
    assert!(is_post_seen(db.pool(), "aaa").await.unwrap());
}

#[tokio::test]
async fn test_cancelled_token_exits_cleanly() {
    let (db, _temp_dir) = setup_db().await;
    let mock_server = MockServer::start().await;
    mount_single_page(&mock_server, &[("aaa", "text")]).await;

    let config = create_test_config(&mock_server.uri());
    let mut controller =
        PipelineController::new(config, db.clone(), Arc::new(LexiconScorer::new())).unwrap();

    let token = CancellationToken::new();
    token.cancel();

    let summary = controller
        .run(&run_options("rust"), token)
        .await
        .expect("cancelled run should exit cleanly");

    assert_eq!(summary.fetched, 0);
    assert_eq!(count_records(db.pool()).await.unwrap(), 0);
}
