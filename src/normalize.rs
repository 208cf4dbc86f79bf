//! Conversion of raw listing entries into canonical record drafts.

use thiserror::Error;
use url::Url;

use crate::fetch::RawEntry;

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("malformed listing entry: {reason}")]
    MalformedEntry { reason: &'static str },
}

/// A post record draft, sentiment unset.
///
/// All text fields are present (possibly empty) so downstream code never
/// special-cases absence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftRecord {
    pub post_id: String,
    pub post_url: String,
    pub title: String,
    pub author: String,
    pub subreddit: String,
    /// Creation time as reported by the upstream listing, preserved
    /// verbatim. `scraped_at` is the authoritative timestamp.
    pub post_date: String,
    pub content: String,
}

/// Normalize a raw listing entry into a record draft.
///
/// Pure: the same entry always yields the same draft. Relative permalinks
/// are resolved against `site_origin`.
///
/// # Errors
///
/// Returns `MalformedEntry` when the entry's id or a usable link cannot be
/// extracted.
pub fn normalize(entry: &RawEntry, site_origin: &str) -> Result<DraftRecord, NormalizeError> {
    if entry.id.is_empty() {
        return Err(NormalizeError::MalformedEntry {
            reason: "missing post id",
        });
    }

    let post_url = canonical_url(entry, site_origin)?;

    Ok(DraftRecord {
        post_id: entry.id.clone(),
        post_url,
        title: entry.title.clone(),
        author: entry.author.clone(),
        subreddit: entry.subreddit.clone(),
        post_date: entry.created_utc.map(|t| t.to_string()).unwrap_or_default(),
        content: entry.selftext.clone(),
    })
}

/// Resolve the entry's canonical link: the permalink when present
/// (resolved against the site origin if relative), otherwise the raw url.
fn canonical_url(entry: &RawEntry, site_origin: &str) -> Result<String, NormalizeError> {
    if !entry.permalink.is_empty() {
        if entry.permalink.starts_with("http") {
            return Ok(entry.permalink.clone());
        }
        let base = Url::parse(site_origin).map_err(|_| NormalizeError::MalformedEntry {
            reason: "unresolvable site origin",
        })?;
        let resolved = base
            .join(&entry.permalink)
            .map_err(|_| NormalizeError::MalformedEntry {
                reason: "unresolvable permalink",
            })?;
        return Ok(resolved.to_string());
    }

    if !entry.url.is_empty() {
        return Ok(entry.url.clone());
    }

    Err(NormalizeError::MalformedEntry {
        reason: "missing permalink and url",
    })
}
