//! Paginated listing fetcher for a subreddit's JSON feed.
//!
//! Retrieves pages in upstream listing order (newest-first), pacing requests
//! with a minimum inter-request delay and retrying transient failures with
//! exponential backoff.

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Config;

/// Base delay for the exponential backoff between retry attempts.
const BACKOFF_BASE: Duration = Duration::from_secs(1);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("rate limited by upstream (HTTP 429)")]
    RateLimited,
    #[error("upstream returned HTTP {status}")]
    ServerError { status: u16 },
    #[error("network error: {source}")]
    NetworkError {
        #[from]
        source: reqwest::Error,
    },
}

impl FetchError {
    /// Whether another attempt may succeed. 4xx responses other than 429
    /// fail immediately.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RateLimited | Self::NetworkError { .. } => true,
            Self::ServerError { status } => *status >= 500,
        }
    }
}

/// A single raw entry from the upstream listing, prior to normalization.
///
/// Every field is optional upstream; absent fields deserialize to their
/// defaults so the normalizer sees one consistent shape.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawEntry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub permalink: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub subreddit: String,
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub created_utc: Option<f64>,
}

/// One page of the upstream listing.
#[derive(Debug)]
pub struct ListingPage {
    pub entries: Vec<RawEntry>,
    /// Opaque cursor for the next page; `None` when the listing is exhausted.
    pub after: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Listing {
    data: ListingData,
}

#[derive(Debug, Deserialize)]
struct ListingData {
    #[serde(default)]
    children: Vec<ListingChild>,
    #[serde(default)]
    after: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListingChild {
    data: RawEntry,
}

impl Listing {
    fn into_page(self) -> ListingPage {
        ListingPage {
            entries: self.data.children.into_iter().map(|c| c.data).collect(),
            // The upstream reports exhaustion as null or an empty string.
            after: self.data.after.filter(|a| !a.is_empty()),
        }
    }
}

/// Listing fetcher. Stateless across calls except for the cursor it is
/// handed and the timestamp of the previous request (pacing).
pub struct Fetcher {
    client: reqwest::Client,
    base_url: String,
    feed: String,
    page_size: u32,
    user_agent: String,
    request_delay: Duration,
    max_attempts: u32,
    last_request: Option<Instant>,
}

impl Fetcher {
    /// Create a fetcher from configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: config.source_base_url.trim_end_matches('/').to_string(),
            feed: config.listing_feed.clone(),
            page_size: config.page_size,
            user_agent: config.user_agent.clone(),
            request_delay: config.request_delay,
            max_attempts: config.fetch_max_attempts,
            last_request: None,
        })
    }

    /// Fetch one listing page, retrying transient failures with backoff.
    ///
    /// # Errors
    ///
    /// Returns the last error once the bounded attempt count is exhausted,
    /// or immediately for non-retryable failures.
    pub async fn fetch_page(
        &mut self,
        subreddit: &str,
        cursor: Option<&str>,
    ) -> Result<ListingPage, FetchError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.request_page(subreddit, cursor).await {
                Ok(page) => {
                    debug!(
                        subreddit,
                        entries = page.entries.len(),
                        has_more = page.after.is_some(),
                        "Fetched listing page"
                    );
                    return Ok(page);
                }
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let backoff = BACKOFF_BASE * 2u32.saturating_pow(attempt - 1);
                    warn!(
                        subreddit,
                        attempt,
                        "Listing fetch failed: {e}; retrying in {backoff:?}"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn request_page(
        &mut self,
        subreddit: &str,
        cursor: Option<&str>,
    ) -> Result<ListingPage, FetchError> {
        self.pace().await;

        let url = format!("{}/r/{}/{}.json", self.base_url, subreddit, self.feed);
        let mut query: Vec<(&str, String)> = vec![
            ("limit", self.page_size.to_string()),
            ("raw_json", "1".to_string()),
        ];
        if let Some(after) = cursor {
            query.push(("after", after.to_string()));
        }

        let response = self
            .client
            .get(&url)
            .header("User-Agent", &self.user_agent)
            .query(&query)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(FetchError::RateLimited);
        }
        if !status.is_success() {
            return Err(FetchError::ServerError {
                status: status.as_u16(),
            });
        }

        let listing: Listing = response.json().await?;
        Ok(listing.into_page())
    }

    /// Enforce the minimum inter-request delay, including across retries.
    async fn pace(&mut self) {
        if let Some(last) = self.last_request {
            let elapsed = last.elapsed();
            if elapsed < self.request_delay {
                tokio::time::sleep(self.request_delay - elapsed).await;
            }
        }
        self.last_request = Some(Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_LISTING: &str = r#"{
        "kind": "Listing",
        "data": {
            "after": "t3_def456",
            "children": [
                {
                    "kind": "t3",
                    "data": {
                        "id": "abc123",
                        "permalink": "/r/rust/comments/abc123/great_release/",
                        "url": "https://www.reddit.com/r/rust/comments/abc123/great_release/",
                        "title": "Great release",
                        "author": "someone",
                        "subreddit": "rust",
                        "selftext": "This release is great.",
                        "created_utc": 1722859200.0
                    }
                }
            ]
        }
    }"#;

    #[test]
    fn test_parse_listing() {
        let listing: Listing = serde_json::from_str(SAMPLE_LISTING).unwrap();
        let page = listing.into_page();

        assert_eq!(page.entries.len(), 1);
        assert_eq!(page.after.as_deref(), Some("t3_def456"));

        let entry = &page.entries[0];
        assert_eq!(entry.id, "abc123");
        assert_eq!(entry.author, "someone");
        assert_eq!(entry.created_utc, Some(1_722_859_200.0));
    }

    #[test]
    fn test_parse_listing_exhausted() {
        let listing: Listing =
            serde_json::from_str(r#"{"kind":"Listing","data":{"after":null,"children":[]}}"#)
                .unwrap();
        let page = listing.into_page();
        assert!(page.entries.is_empty());
        assert!(page.after.is_none());
    }

    #[test]
    fn test_parse_listing_empty_cursor_means_exhausted() {
        let listing: Listing =
            serde_json::from_str(r#"{"kind":"Listing","data":{"after":"","children":[]}}"#)
                .unwrap();
        assert!(listing.into_page().after.is_none());
    }

    #[test]
    fn test_parse_entry_missing_fields_default() {
        let listing: Listing = serde_json::from_str(
            r#"{"kind":"Listing","data":{"children":[{"kind":"t3","data":{"id":"x"}}]}}"#,
        )
        .unwrap();
        let page = listing.into_page();
        let entry = &page.entries[0];
        assert_eq!(entry.id, "x");
        assert_eq!(entry.author, "");
        assert_eq!(entry.selftext, "");
        assert!(entry.created_utc.is_none());
    }

    #[test]
    fn test_retryability() {
        assert!(FetchError::RateLimited.is_retryable());
        assert!(FetchError::ServerError { status: 503 }.is_retryable());
        assert!(!FetchError::ServerError { status: 404 }.is_retryable());
    }
}
