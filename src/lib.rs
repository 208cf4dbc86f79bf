//! Reddit sentiment ingestion library.
//!
//! An incremental pipeline that polls a subreddit's post listing, skips
//! posts ingested on previous runs, scores each new post's sentiment, and
//! appends the finalized records to a durable SQLite store.

pub mod config;
pub mod constants;
pub mod db;
pub mod export;
pub mod fetch;
pub mod normalize;
pub mod pipeline;
pub mod sentiment;
