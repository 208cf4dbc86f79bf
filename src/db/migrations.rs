use anyhow::{Context, Result};
use sqlx::SqlitePool;
use tracing::debug;

/// Run all pending migrations.
pub async fn run(pool: &SqlitePool) -> Result<()> {
    create_migration_table(pool).await?;
    let current_version = get_schema_version(pool).await?;

    if current_version < 1 {
        debug!("Running migration v1");
        run_migration_v1(pool).await?;
        set_schema_version(pool, 1).await?;
    }

    Ok(())
}

async fn create_migration_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS _schema_version (
            version INTEGER PRIMARY KEY
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create schema version table")?;

    Ok(())
}

async fn get_schema_version(pool: &SqlitePool) -> Result<i32> {
    let row: Option<(i32,)> = sqlx::query_as("SELECT version FROM _schema_version LIMIT 1")
        .fetch_optional(pool)
        .await
        .context("Failed to get schema version")?;

    Ok(row.map_or(0, |(v,)| v))
}

async fn set_schema_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("DELETE FROM _schema_version")
        .execute(pool)
        .await?;
    sqlx::query("INSERT INTO _schema_version (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await?;
    Ok(())
}

async fn run_migration_v1(pool: &SqlitePool) -> Result<()> {
    debug!("Running migration v1: creating initial schema");

    // Finalized post records; rows are immutable once written.
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS records (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            post_id TEXT NOT NULL UNIQUE,
            post_url TEXT NOT NULL,
            language TEXT NOT NULL DEFAULT '',
            scraped_at TEXT NOT NULL,
            title TEXT NOT NULL DEFAULT '',
            author TEXT NOT NULL DEFAULT '',
            subreddit TEXT NOT NULL DEFAULT '',
            post_date TEXT NOT NULL DEFAULT '',
            content TEXT NOT NULL DEFAULT '',
            neg REAL NOT NULL,
            neu REAL NOT NULL,
            pos REAL NOT NULL,
            compound REAL NOT NULL,
            scorer_version TEXT NOT NULL DEFAULT ''
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create records table")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_order ON records (scraped_at, id)")
        .execute(pool)
        .await
        .context("Failed to create records ordering index")?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_subreddit ON records (subreddit)")
        .execute(pool)
        .await
        .context("Failed to create records subreddit index")?;

    // Membership set of ingested post ids, consulted on subsequent runs.
    sqlx::query(
        r"
        CREATE TABLE IF NOT EXISTS seen_posts (
            post_id TEXT PRIMARY KEY,
            marked_at TEXT NOT NULL
        )
        ",
    )
    .execute(pool)
    .await
    .context("Failed to create seen_posts table")?;

    Ok(())
}
