use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A configured feed endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveSourceSpec {
    pub uri: String,
    pub lookback_days: i64,
}

/// One raw item as a source yields it, before normalization.
/// `published_at` is None when the item carried no parseable timestamp.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceItem {
    pub title: String,
    pub link: Option<String>,
    pub description: String,
    pub published_at: Option<DateTime<Utc>>,
}

/// A stored entry. `(link, source_url)` is the identity; `id` only
/// addresses partial updates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedEntry {
    pub id: Uuid,
    pub link: String,
    pub source_url: String,
    pub title: String,
    pub description: String,
    pub pub_date: DateTime<Utc>,

    pub title_en: Option<String>,
    pub description_en: Option<String>,
    pub translated_at: Option<DateTime<Utc>>,

    pub summary: Option<String>,
    pub summarized_at: Option<DateTime<Utc>>,

    pub ai_title: Option<String>,
    pub ai_title_generated_at: Option<DateTime<Utc>>,

    pub category: Option<String>,
    pub category_generated_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FeedEntry {
    /// Title to feed downstream stages: the translation when present, else the original.
    pub fn working_title(&self) -> &str {
        match self.title_en.as_deref() {
            Some(t) if !t.trim().is_empty() => t,
            _ => &self.title,
        }
    }

    pub fn working_description(&self) -> &str {
        match self.description_en.as_deref() {
            Some(d) if !d.trim().is_empty() => d,
            _ => &self.description,
        }
    }

    pub fn completed_at(&self, stage: Stage) -> Option<DateTime<Utc>> {
        match stage {
            Stage::Translate => self.translated_at,
            Stage::Summarize => self.summarized_at,
            Stage::AiTitle => self.ai_title_generated_at,
            Stage::Categorize => self.category_generated_at,
        }
    }

    /// Whether `stage` would select this entry.
    pub fn is_pending(&self, stage: Stage) -> bool {
        if self.completed_at(stage).is_some() {
            return false;
        }
        !stage.requires_translation() || self.translated_at.is_some()
    }
}

/// Enrichment stages in dependency order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Translate,
    Summarize,
    AiTitle,
    Categorize,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::Translate,
        Stage::Summarize,
        Stage::AiTitle,
        Stage::Categorize,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Translate => "translate",
            Stage::Summarize => "summarize",
            Stage::AiTitle => "ai_title",
            Stage::Categorize => "categorize",
        }
    }

    pub fn requires_translation(&self) -> bool {
        !matches!(self, Stage::Translate)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// Object style note:
// The enrichment state of an entry lives entirely in these nullable
// timestamp columns. Consumers reading finished records should treat a
// missing timestamp as "not yet available" and fall back to the original
// title/description.
