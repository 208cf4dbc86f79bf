use serde::Serialize;

use crate::sentiment::SentimentScore;

/// A finalized, persisted post record. Immutable once written.
///
/// The `Serialize` impl produces exactly the on-disk JSON contract:
/// `post_id, post_url, language, scraped_at, title, author, subreddit,
/// post_date, content, sentiment{neg,neu,pos,compound}`. The row id and
/// scorer version are store-internal.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct PostRecord {
    #[serde(skip_serializing)]
    pub id: i64,
    pub post_id: String,
    pub post_url: String,
    #[serde(rename = "language")]
    #[sqlx(rename = "language")]
    pub source_language: String,
    pub scraped_at: String,
    pub title: String,
    pub author: String,
    pub subreddit: String,
    pub post_date: String,
    pub content: String,
    #[sqlx(flatten)]
    pub sentiment: SentimentScore,
    #[serde(skip_serializing)]
    pub scorer_version: String,
}

impl PostRecord {
    /// Cursor positioned at this record, for restarting a listing.
    #[must_use]
    pub fn cursor(&self) -> ListCursor {
        ListCursor {
            scraped_at: self.scraped_at.clone(),
            id: self.id,
        }
    }
}

/// A scored record ready to append, before the store assigns a row id.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub post_id: String,
    pub post_url: String,
    pub source_language: String,
    pub scraped_at: String,
    pub title: String,
    pub author: String,
    pub subreddit: String,
    pub post_date: String,
    pub content: String,
    pub sentiment: SentimentScore,
    pub scorer_version: String,
}

/// Position within the `(scraped_at, id)` ordering of the record store.
#[derive(Debug, Clone)]
pub struct ListCursor {
    pub scraped_at: String,
    pub id: i64,
}

/// Filter for [`list_records`](super::list_records). Records are returned
/// ordered by `(scraped_at, id)` ascending, strictly after `cursor` when
/// one is given.
#[derive(Debug, Clone)]
pub struct RecordFilter {
    pub subreddit: Option<String>,
    /// Inclusive lower bound on `scraped_at`.
    pub since: Option<String>,
    pub cursor: Option<ListCursor>,
    pub limit: i64,
}

impl Default for RecordFilter {
    fn default() -> Self {
        Self {
            subreddit: None,
            since: None,
            cursor: None,
            limit: 100,
        }
    }
}
