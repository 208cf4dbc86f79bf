//! JSON export of the persisted dataset.
//!
//! Emits records as a JSON array honoring the on-disk field contract, in
//! `(scraped_at, id)` order, reading the store through its restartable
//! cursor.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::db::{list_records, Database, PostRecord, RecordFilter};

/// Batch size for cursor-paged reads.
const EXPORT_PAGE: i64 = 500;

/// Export records as a JSON array to `out`, or stdout when no path is
/// given. Returns the number of records written.
///
/// # Errors
///
/// Returns an error if the store cannot be read or the output cannot be
/// written.
pub async fn export_records(
    db: &Database,
    subreddit: Option<&str>,
    out: Option<&Path>,
) -> Result<u64> {
    let records = collect(db, subreddit).await?;
    let json = serde_json::to_string_pretty(&records).context("Failed to serialize records")?;

    match out {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent).await.with_context(|| {
                    format!("Failed to create export directory: {}", parent.display())
                })?;
            }
            tokio::fs::write(path, &json)
                .await
                .with_context(|| format!("Failed to write export file: {}", path.display()))?;
            info!(path = %path.display(), records = records.len(), "Export written");
        }
        None => println!("{json}"),
    }

    Ok(records.len() as u64)
}

/// Collect all records matching the filter by walking the listing cursor.
async fn collect(db: &Database, subreddit: Option<&str>) -> Result<Vec<PostRecord>> {
    let mut filter = RecordFilter {
        subreddit: subreddit.map(ToString::to_string),
        limit: EXPORT_PAGE,
        ..RecordFilter::default()
    };

    let mut all = Vec::new();
    loop {
        let batch = list_records(db.pool(), &filter)
            .await
            .context("Failed to list records")?;
        let Some(last) = batch.last() else {
            break;
        };
        filter.cursor = Some(last.cursor());
        let exhausted = (batch.len() as i64) < EXPORT_PAGE;
        all.extend(batch);
        if exhausted {
            break;
        }
    }
    Ok(all)
}
