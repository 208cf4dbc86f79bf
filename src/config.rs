use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::constants::DEFAULT_USER_AGENT;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Database
    pub database_path: PathBuf,

    // Listing source
    pub source_base_url: String,
    pub listing_feed: String,
    pub page_size: u32,
    pub user_agent: String,

    // Rate limiting and retries
    pub request_delay: Duration,
    pub fetch_max_attempts: u32,
    pub score_max_attempts: u32,

    // Scoring workers
    pub score_concurrency: usize,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if an environment variable has an unparseable value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            database_path: PathBuf::from(env_or_default("DATABASE_PATH", "./data/ingest.sqlite")),

            source_base_url: env_or_default("SOURCE_BASE_URL", "https://www.reddit.com"),
            listing_feed: env_or_default("LISTING_FEED", "hot"),
            page_size: parse_env_u32("PAGE_SIZE", 100)?,
            user_agent: env_or_default("USER_AGENT", DEFAULT_USER_AGENT),

            request_delay: Duration::from_millis(parse_env_u64("REQUEST_DELAY_MS", 3000)?),
            fetch_max_attempts: parse_env_u32("FETCH_MAX_ATTEMPTS", 3)?,
            score_max_attempts: parse_env_u32("SCORE_MAX_ATTEMPTS", 3)?,

            score_concurrency: parse_env_usize("SCORE_CONCURRENCY", 4)?,
        })
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source_base_url.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "SOURCE_BASE_URL".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        if self.page_size == 0 {
            return Err(ConfigError::InvalidValue {
                name: "PAGE_SIZE".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.fetch_max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                name: "FETCH_MAX_ATTEMPTS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.score_max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                name: "SCORE_MAX_ATTEMPTS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.score_concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                name: "SCORE_CONCURRENCY".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Configuration for tests: no request pacing, small pages, scratch paths.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            database_path: PathBuf::from("./test.sqlite"),
            source_base_url: "http://127.0.0.1:0".to_string(),
            listing_feed: "hot".to_string(),
            page_size: 25,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_delay: Duration::ZERO,
            fetch_max_attempts: 2,
            score_max_attempts: 2,
            score_concurrency: 4,
        }
    }
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_u32(name: &str, default: u32) -> Result<u32, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}
