//! Shared constants used across the application.

/// Default user agent for listing requests.
///
/// Identifies the tool honestly; the listing endpoint throttles generic
/// or missing user agents much more aggressively.
pub const DEFAULT_USER_AGENT: &str = "reddit-sentiment-ingest/0.1";
