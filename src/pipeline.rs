//! Pipeline controller: fetch → normalize → dedup-check → score → persist.
//!
//! A single controller task walks the listing page by page, preserving
//! upstream order. Scoring and persistence for the posts of one page run
//! concurrently on a bounded worker pool; the next page is not fetched
//! until the current page's batch has fully settled, bounding memory to
//! one page plus in-flight scores.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::db::{append_record, is_post_seen, mark_post_seen, Database, NewRecord, StoreError};
use crate::fetch::Fetcher;
use crate::normalize::{normalize, DraftRecord};
use crate::sentiment::{ScoreError, SentimentScore, SentimentScorer};

/// Delay between scorer retry attempts, scaled by attempt number.
const SCORE_RETRY_DELAY: Duration = Duration::from_millis(250);

/// Per-run options from the CLI.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub subreddit: String,
    /// Language/locale tag recorded on every record of this run.
    pub language: String,
    /// Maximum listing pages to walk; 0 means unbounded.
    pub max_pages: u32,
    /// Skip posts whose reported creation time is older than this bound.
    pub since: Option<DateTime<Utc>>,
}

/// Counts reported at the end of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub fetched: u64,
    pub malformed: u64,
    pub skipped_duplicate: u64,
    pub older_than_cutoff: u64,
    pub persisted: u64,
    pub failed: u64,
}

/// Terminal state of one post within a run. Failed posts stay unmarked in
/// the deduplication store and are retried by a future run.
enum PostOutcome {
    Persisted,
    Failed,
}

pub struct PipelineController {
    config: Config,
    db: Database,
    fetcher: Fetcher,
    scorer: Arc<dyn SentimentScorer>,
}

impl PipelineController {
    /// Create a controller over the given store and scorer.
    ///
    /// # Errors
    ///
    /// Returns an error if the fetcher cannot be constructed.
    pub fn new(config: Config, db: Database, scorer: Arc<dyn SentimentScorer>) -> Result<Self> {
        let fetcher = Fetcher::new(&config)?;
        Ok(Self {
            config,
            db,
            fetcher,
            scorer,
        })
    }

    /// Drive one full ingestion run.
    ///
    /// The run ends when the listing is exhausted, the configured page
    /// limit is reached, an unrecoverable fetch error occurs (progress made
    /// so far is retained), or the stop token fires (the current page's
    /// in-flight work completes first).
    ///
    /// # Errors
    ///
    /// Returns an error only when a store becomes unavailable; per-post
    /// failures are counted in the summary instead.
    pub async fn run(
        &mut self,
        options: &RunOptions,
        shutdown: CancellationToken,
    ) -> Result<RunSummary> {
        let semaphore = Arc::new(Semaphore::new(self.config.score_concurrency));
        let mut summary = RunSummary::default();
        let mut seen_this_run: HashSet<String> = HashSet::new();
        let mut clock = MonotonicClock::default();
        let mut cursor: Option<String> = None;
        let mut pages = 0u32;

        info!(subreddit = %options.subreddit, "Starting ingestion run");

        loop {
            if shutdown.is_cancelled() {
                info!("Stop requested, ending run");
                break;
            }
            if options.max_pages > 0 && pages >= options.max_pages {
                info!(max_pages = options.max_pages, "Reached configured page limit");
                break;
            }

            let page = match self
                .fetcher
                .fetch_page(&options.subreddit, cursor.as_deref())
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    warn!(subreddit = %options.subreddit, "Listing fetch failed, ending run early: {e}");
                    break;
                }
            };
            pages += 1;
            summary.fetched += page.entries.len() as u64;

            let mut page_has_recent = page.entries.is_empty();
            let mut handles: Vec<JoinHandle<Result<PostOutcome, StoreError>>> = Vec::new();

            for entry in page.entries {
                if let (Some(bound), Some(created)) = (options.since, entry.created_utc) {
                    if created < bound.timestamp() as f64 {
                        summary.older_than_cutoff += 1;
                        continue;
                    }
                }
                page_has_recent = true;

                let draft = match normalize(&entry, &self.config.source_base_url) {
                    Ok(draft) => draft,
                    Err(e) => {
                        warn!("Skipping malformed listing entry: {e}");
                        summary.malformed += 1;
                        continue;
                    }
                };

                // Dedup against completed runs and against ids already
                // dispatched in this run; a listing can repeat an id, even
                // within a single page.
                if seen_this_run.contains(&draft.post_id)
                    || is_post_seen(self.db.pool(), &draft.post_id)
                        .await
                        .context("Deduplication lookup failed")?
                {
                    debug!(post_id = %draft.post_id, "Skipping already-ingested post");
                    summary.skipped_duplicate += 1;
                    continue;
                }
                seen_this_run.insert(draft.post_id.clone());

                let scraped_at = clock.next();
                let permit = semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .context("Scoring semaphore closed")?;
                let pool = self.db.pool().clone();
                let scorer = Arc::clone(&self.scorer);
                let language = options.language.clone();
                let max_attempts = self.config.score_max_attempts;

                handles.push(tokio::spawn(async move {
                    let _permit = permit;
                    ingest_post(&pool, scorer.as_ref(), draft, language, scraped_at, max_attempts)
                        .await
                }));
            }

            // Backpressure: join the page's scoring batch before fetching
            // the next page.
            for handle in handles {
                match handle.await {
                    Ok(Ok(PostOutcome::Persisted)) => summary.persisted += 1,
                    Ok(Ok(PostOutcome::Failed)) => summary.failed += 1,
                    Ok(Err(e)) => return Err(e).context("Record store became unavailable"),
                    Err(e) => {
                        warn!("Scoring task panicked: {e}");
                        summary.failed += 1;
                    }
                }
            }

            cursor = page.after;
            if cursor.is_none() {
                info!("Listing exhausted");
                break;
            }
            if !page_has_recent {
                info!("Entire page older than cutoff, stopping");
                break;
            }
        }

        info!(
            fetched = summary.fetched,
            malformed = summary.malformed,
            skipped_duplicate = summary.skipped_duplicate,
            older_than_cutoff = summary.older_than_cutoff,
            persisted = summary.persisted,
            failed = summary.failed,
            "Run complete"
        );

        Ok(summary)
    }
}

/// Score and persist a single draft. Runs on the scoring worker pool.
async fn ingest_post(
    pool: &sqlx::SqlitePool,
    scorer: &dyn SentimentScorer,
    draft: DraftRecord,
    language: String,
    scraped_at: String,
    max_attempts: u32,
) -> Result<PostOutcome, StoreError> {
    // Score the body text, falling back to the title for link posts.
    let text = if draft.content.trim().is_empty() {
        &draft.title
    } else {
        &draft.content
    };

    let sentiment = match score_with_retry(scorer, text, max_attempts).await {
        Ok(score) => score,
        Err(e) => {
            warn!(post_id = %draft.post_id, "Scoring failed, leaving post for a future run: {e}");
            return Ok(PostOutcome::Failed);
        }
    };

    let record = NewRecord {
        post_id: draft.post_id,
        post_url: draft.post_url,
        source_language: language,
        scraped_at,
        title: draft.title,
        author: draft.author,
        subreddit: draft.subreddit,
        post_date: draft.post_date,
        content: draft.content,
        sentiment,
        scorer_version: scorer.version().to_string(),
    };

    // Append before marking: a crash between the two leaves an unmarked
    // record, which the WriteConflict branch absorbs on the next run.
    match append_record(pool, &record).await {
        Ok(()) => {}
        Err(StoreError::WriteConflict { post_id }) => {
            debug!(post_id = %post_id, "Record already present, keeping stored copy");
        }
        Err(e) => return Err(e),
    }

    mark_post_seen(pool, &record.post_id).await?;
    Ok(PostOutcome::Persisted)
}

/// Call the scorer, retrying a bounded number of times when it reports
/// itself unavailable.
async fn score_with_retry(
    scorer: &dyn SentimentScorer,
    text: &str,
    max_attempts: u32,
) -> Result<SentimentScore, ScoreError> {
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match scorer.score(text) {
            Ok(score) => return Ok(score),
            Err(e) if attempt < max_attempts => {
                warn!(attempt, "Scorer unavailable: {e}; retrying");
                tokio::time::sleep(SCORE_RETRY_DELAY * attempt).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Issues RFC 3339 timestamps that never decrease within the process, so
/// `scraped_at` ordering matches insertion order even across clock skew.
#[derive(Debug, Default)]
struct MonotonicClock {
    last: Option<DateTime<Utc>>,
}

impl MonotonicClock {
    fn next(&mut self) -> String {
        let now = Utc::now();
        let stamped = match self.last {
            Some(last) if last > now => last,
            _ => now,
        };
        self.last = Some(stamped);
        stamped.to_rfc3339_opts(SecondsFormat::Micros, true)
    }
}
