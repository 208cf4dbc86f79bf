use sqlx::SqlitePool;

use super::models::{NewRecord, PostRecord, RecordFilter};
use super::StoreError;

// ========== Deduplication store ==========

/// Whether a post id has already been ingested by a previous run.
///
/// # Errors
///
/// Returns `Unavailable` if the store cannot be queried.
pub async fn is_post_seen(pool: &SqlitePool, post_id: &str) -> Result<bool, StoreError> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM seen_posts WHERE post_id = ?")
        .bind(post_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}

/// Mark a post id as ingested.
///
/// Idempotent: marking an already-marked id is a no-op. Returns whether a
/// new mark was written.
///
/// # Errors
///
/// Returns `Unavailable` if the store cannot be written.
pub async fn mark_post_seen(pool: &SqlitePool, post_id: &str) -> Result<bool, StoreError> {
    let result =
        sqlx::query("INSERT OR IGNORE INTO seen_posts (post_id, marked_at) VALUES (?, datetime('now'))")
            .bind(post_id)
            .execute(pool)
            .await?;
    Ok(result.rows_affected() == 1)
}

// ========== Record store ==========

/// Append a finalized record.
///
/// # Errors
///
/// Returns `WriteConflict` when a record with the same `post_id` already
/// exists; the stored record is left untouched. Returns `Unavailable` on
/// any other failure.
pub async fn append_record(pool: &SqlitePool, record: &NewRecord) -> Result<(), StoreError> {
    let result = sqlx::query(
        r"
        INSERT INTO records
            (post_id, post_url, language, scraped_at, title, author, subreddit,
             post_date, content, neg, neu, pos, compound, scorer_version)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ",
    )
    .bind(&record.post_id)
    .bind(&record.post_url)
    .bind(&record.source_language)
    .bind(&record.scraped_at)
    .bind(&record.title)
    .bind(&record.author)
    .bind(&record.subreddit)
    .bind(&record.post_date)
    .bind(&record.content)
    .bind(record.sentiment.neg)
    .bind(record.sentiment.neu)
    .bind(record.sentiment.pos)
    .bind(record.sentiment.compound)
    .bind(&record.scorer_version)
    .execute(pool)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(e) if is_unique_violation(&e) => Err(StoreError::WriteConflict {
            post_id: record.post_id.clone(),
        }),
        Err(e) => Err(StoreError::Unavailable(e)),
    }
}

/// Get a record by its post id.
///
/// # Errors
///
/// Returns `Unavailable` if the store cannot be queried.
pub async fn get_record(pool: &SqlitePool, post_id: &str) -> Result<Option<PostRecord>, StoreError> {
    let record = sqlx::query_as("SELECT * FROM records WHERE post_id = ?")
        .bind(post_id)
        .fetch_optional(pool)
        .await?;
    Ok(record)
}

/// List records ordered by `(scraped_at, id)` ascending.
///
/// The filter's cursor restarts the listing strictly after the last row a
/// previous call returned.
///
/// # Errors
///
/// Returns `Unavailable` if the store cannot be queried.
pub async fn list_records(
    pool: &SqlitePool,
    filter: &RecordFilter,
) -> Result<Vec<PostRecord>, StoreError> {
    let mut sql = String::from("SELECT * FROM records");
    let mut clauses: Vec<&str> = Vec::new();
    if filter.subreddit.is_some() {
        clauses.push("subreddit = ?");
    }
    if filter.since.is_some() {
        clauses.push("scraped_at >= ?");
    }
    if filter.cursor.is_some() {
        clauses.push("(scraped_at > ? OR (scraped_at = ? AND id > ?))");
    }
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY scraped_at ASC, id ASC LIMIT ?");

    let mut query = sqlx::query_as::<_, PostRecord>(&sql);
    if let Some(subreddit) = &filter.subreddit {
        query = query.bind(subreddit);
    }
    if let Some(since) = &filter.since {
        query = query.bind(since);
    }
    if let Some(cursor) = &filter.cursor {
        query = query
            .bind(&cursor.scraped_at)
            .bind(&cursor.scraped_at)
            .bind(cursor.id);
    }
    query = query.bind(filter.limit);

    let records = query.fetch_all(pool).await?;
    Ok(records)
}

/// Total number of persisted records.
///
/// # Errors
///
/// Returns `Unavailable` if the store cannot be queried.
pub async fn count_records(pool: &SqlitePool) -> Result<i64, StoreError> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error().is_some_and(|db| db.is_unique_violation())
}
