use crate::enrichment::{ModelParams, PromptTemplates, ProviderConfig, RateLimitConfig};
use crate::rss_utils::url::is_valid_feed_url;
use crate::types::{EnricherError, FetchConfig, LiveSourceSpec, Result, Stage};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use whatlang::Lang;

/// Top-level configuration, loaded from TOML. Every field has a default so
/// an empty file is a valid configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub sources: SourcesConfig,
    pub fetch: FetchConfig,
    pub enrichment: EnrichmentConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Overridden by `DATABASE_URL` when set.
    pub url: Option<String>,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub default_lookback_days: i64,
    pub feeds: Vec<FeedSourceConfig>,
    /// Plain-text file with one feed URL per line.
    pub urls_file: Option<PathBuf>,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            default_lookback_days: 7,
            feeds: Vec::new(),
            urls_file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSourceConfig {
    pub url: String,
    #[serde(default)]
    pub lookback_days: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchSizes {
    pub translate: usize,
    pub summarize: usize,
    pub ai_title: usize,
    pub categorize: usize,
}

impl Default for BatchSizes {
    fn default() -> Self {
        Self {
            translate: 10,
            summarize: 10,
            ai_title: 10,
            categorize: 10,
        }
    }
}

impl BatchSizes {
    pub fn uniform(size: usize) -> Self {
        Self {
            translate: size,
            summarize: size,
            ai_title: size,
            categorize: size,
        }
    }

    pub fn for_stage(&self, stage: Stage) -> usize {
        match stage {
            Stage::Translate => self.translate,
            Stage::Summarize => self.summarize,
            Stage::AiTitle => self.ai_title,
            Stage::Categorize => self.categorize,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    /// ISO 639-3 code, e.g. `eng`.
    pub target_language: String,
    pub categories: Vec<String>,
    pub summary_max_chars: usize,
    pub ai_title_max_chars: usize,
    pub batch_sizes: BatchSizes,
    pub rate_limit: RateLimitConfig,
    pub provider: ProviderConfig,
    pub model: ModelParams,
    pub prompts: PromptTemplates,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            target_language: "eng".to_string(),
            categories: [
                "Politics",
                "Business",
                "Technology",
                "Science",
                "Health",
                "Sports",
                "Entertainment",
                "World",
            ]
            .iter()
            .map(|c| c.to_string())
            .collect(),
            summary_max_chars: 600,
            ai_title_max_chars: 100,
            batch_sizes: BatchSizes::default(),
            rate_limit: RateLimitConfig::default(),
            provider: ProviderConfig::default(),
            model: ModelParams::default(),
            prompts: PromptTemplates::default(),
        }
    }
}

impl EnrichmentConfig {
    pub fn target_lang(&self) -> Result<Lang> {
        Lang::from_code(self.target_language.trim()).ok_or_else(|| {
            EnricherError::Config(format!(
                "unknown target language code '{}' (expected ISO 639-3, e.g. 'eng')",
                self.target_language
            ))
        })
    }
}

impl AppConfig {
    /// Load from `path` when given, otherwise start from defaults. Environment
    /// overrides are applied and the result is validated.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                let raw = std::fs::read_to_string(path)?;
                Self::from_toml_str(&raw)?
            }
            None => {
                debug!("No configuration file given, using defaults");
                Self::default()
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            if !url.trim().is_empty() {
                self.database.url = Some(url);
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.enrichment.target_lang()?;

        if self.enrichment.categories.iter().all(|c| c.trim().is_empty()) {
            return Err(EnricherError::Config(
                "enrichment.categories must not be empty".to_string(),
            ));
        }

        for stage in Stage::ALL {
            if self.enrichment.batch_sizes.for_stage(stage) == 0 {
                return Err(EnricherError::Config(format!(
                    "batch size for stage {} must be positive",
                    stage
                )));
            }
        }

        if self.sources.default_lookback_days < 0 {
            return Err(EnricherError::Config(
                "sources.default_lookback_days must not be negative".to_string(),
            ));
        }

        for feed in &self.sources.feeds {
            if !is_valid_feed_url(&feed.url) {
                return Err(EnricherError::Config(format!("invalid feed URL: {}", feed.url)));
            }
            if feed.lookback_days.is_some_and(|days| days < 0) {
                return Err(EnricherError::Config(format!(
                    "negative lookback for feed {}",
                    feed.url
                )));
            }
        }

        Ok(())
    }

    /// All configured sources: `[[sources.feeds]]` first, then the URLs from
    /// `urls_file`. Duplicate URLs keep their first definition.
    pub fn source_specs(&self) -> Result<Vec<LiveSourceSpec>> {
        let default_days = self.sources.default_lookback_days;
        let mut seen = HashSet::new();
        let mut specs = Vec::new();

        for feed in &self.sources.feeds {
            if seen.insert(feed.url.clone()) {
                specs.push(LiveSourceSpec {
                    uri: feed.url.clone(),
                    lookback_days: feed.lookback_days.unwrap_or(default_days),
                });
            }
        }

        if let Some(path) = &self.sources.urls_file {
            let raw = std::fs::read_to_string(path)?;
            for url in parse_urls_file(&raw) {
                if !is_valid_feed_url(&url) {
                    return Err(EnricherError::Config(format!(
                        "invalid feed URL in {}: {}",
                        path.display(),
                        url
                    )));
                }
                if seen.insert(url.clone()) {
                    specs.push(LiveSourceSpec {
                        uri: url,
                        lookback_days: default_days,
                    });
                }
            }
        }

        Ok(specs)
    }
}

/// One URL per line; blank lines and `#` comments are ignored.
pub fn parse_urls_file(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect()
}
