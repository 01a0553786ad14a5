use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
// Use the interfaces crate for the record contract
pub use interfaces::defs::{FeedEntry, LiveSourceSpec, SourceItem, Stage};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
    pub max_feed_size_mb: usize,
    pub max_redirects: usize,
    /// Minimum spacing between two requests to the same host.
    pub min_host_interval_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "Feed-Enricher/1.0".to_string(),
            timeout_seconds: 30,
            max_retries: 2,
            retry_delay_seconds: 2,
            max_feed_size_mb: 10,
            max_redirects: 5,
            min_host_interval_ms: 1000,
        }
    }
}

/// A normalized item ready to be upserted. Carries only content fields;
/// stage outputs are never part of an upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateEntry {
    pub link: String,
    pub source_url: String,
    pub title: String,
    pub description: String,
    pub pub_date: DateTime<Utc>,
}

/// A stage result addressed to one entry. Value and completion timestamp
/// always travel together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageUpdate {
    Translation {
        title_en: String,
        description_en: String,
        at: DateTime<Utc>,
    },
    Summary { text: String, at: DateTime<Utc> },
    AiTitle { text: String, at: DateTime<Utc> },
    Category { value: String, at: DateTime<Utc> },
}

impl StageUpdate {
    pub fn stage(&self) -> Stage {
        match self {
            StageUpdate::Translation { .. } => Stage::Translate,
            StageUpdate::Summary { .. } => Stage::Summarize,
            StageUpdate::AiTitle { .. } => Stage::AiTitle,
            StageUpdate::Category { .. } => Stage::Categorize,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EnricherError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Feed parse error: {0}")]
    Parse(String),

    #[error("Fetching {url} failed: {reason}")]
    SourceFetch { url: String, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Feed size exceeds limit: {size_mb}MB")]
    FeedTooLarge { size_mb: usize },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("General error: {0}")]
    General(String),
}

impl EnricherError {
    /// Store failures abort the current phase; everything else is scoped to
    /// one source or one item.
    pub fn is_store_failure(&self) -> bool {
        matches!(
            self,
            EnricherError::Database(_) | EnricherError::Migration(_) | EnricherError::Store(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, EnricherError>;
