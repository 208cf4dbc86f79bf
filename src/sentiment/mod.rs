//! Sentiment scoring capability.
//!
//! The pipeline only depends on the [`SentimentScorer`] trait; the bundled
//! [`LexiconScorer`] is one deterministic implementation. Scorers are
//! versioned so persisted records can be told apart when the scorer changes.

mod lexicon;

pub use lexicon::LexiconScorer;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("sentiment scorer unavailable: {reason}")]
    ScorerUnavailable { reason: String },
}

/// A 4-tuple sentiment score.
///
/// `neg`, `neu` and `pos` are non-negative proportions summing to
/// approximately 1.0; `compound` is a scalar summary in [-1.0, 1.0].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct SentimentScore {
    pub neg: f64,
    pub neu: f64,
    pub pos: f64,
    pub compound: f64,
}

impl SentimentScore {
    /// The well-defined score for empty text.
    pub const NEUTRAL: Self = Self {
        neg: 0.0,
        neu: 1.0,
        pos: 0.0,
        compound: 0.0,
    };
}

/// A sentiment scoring capability.
///
/// Implementations must be deterministic for identical input text and
/// version, and must score empty text as [`SentimentScore::NEUTRAL`]
/// rather than failing.
pub trait SentimentScorer: Send + Sync {
    /// Score a piece of text.
    ///
    /// # Errors
    ///
    /// Returns `ScorerUnavailable` when the underlying capability cannot be
    /// reached; the caller retries a bounded number of times.
    fn score(&self, text: &str) -> Result<SentimentScore, ScoreError>;

    /// Version tag recorded alongside every score this scorer produces.
    fn version(&self) -> &str;
}
