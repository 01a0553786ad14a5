use super::client::RateLimitedClient;
use super::prompts::{render, PromptTemplates};
use super::GenerateError;
use crate::rss_utils::feed::truncate_chars;
use crate::types::{FeedEntry, Stage, StageUpdate};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::debug;
use whatlang::Lang;

/// Texts shorter than this (after trimming) are not worth a detection or a
/// remote translation and are copied through.
const MIN_DETECTABLE_CHARS: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error(transparent)]
    Generation(#[from] GenerateError),

    #[error("rejected output: {0}")]
    Validation(String),
}

/// One enrichment step. Selection and persistence are done by the pipeline
/// through the store; a stage only turns an entry into its update.
#[async_trait]
pub trait EnrichmentStage: Send + Sync {
    fn stage(&self) -> Stage;

    async fn transform(&self, entry: &FeedEntry) -> Result<StageUpdate, StageError>;

    fn stage_name(&self) -> String {
        self.stage().name().to_string()
    }
}

/// What every stage needs to talk to the model
#[derive(Clone)]
pub struct StageContext {
    pub client: Arc<RateLimitedClient>,
    pub prompts: Arc<PromptTemplates>,
    pub target_language: Lang,
}

impl StageContext {
    async fn ask(&self, template: &str, vars: &[(&str, &str)]) -> Result<String, StageError> {
        let language = self.target_language.eng_name();
        let mut all_vars: Vec<(&str, &str)> = vec![("language", language)];
        all_vars.extend_from_slice(vars);

        let prompt = render(template, &all_vars);
        Ok(self.client.request(&prompt).await?)
    }
}

/// A detected language. `reliable` is false when the text was too short or
/// too ambiguous for the detector to be confident.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detection {
    pub lang: Lang,
    pub reliable: bool,
}

pub trait LanguageDetector: Send + Sync {
    fn detect(&self, text: &str) -> Option<Detection>;
}

pub struct WhatlangDetector;

impl LanguageDetector for WhatlangDetector {
    fn detect(&self, text: &str) -> Option<Detection> {
        whatlang::detect(text).map(|info| Detection {
            lang: info.lang(),
            reliable: info.is_reliable(),
        })
    }
}

pub struct TranslationStage {
    ctx: StageContext,
    detector: Box<dyn LanguageDetector>,
}

impl TranslationStage {
    pub fn new(ctx: StageContext) -> Self {
        Self::with_detector(ctx, Box::new(WhatlangDetector))
    }

    pub fn with_detector(ctx: StageContext, detector: Box<dyn LanguageDetector>) -> Self {
        Self { ctx, detector }
    }

    /// Language of title and description read together. Headlines alone are
    /// often too short to detect.
    fn entry_language(&self, entry: &FeedEntry) -> Option<Lang> {
        let combined = format!("{}\n{}", entry.title.trim(), entry.description.trim());
        self.detector.detect(combined.trim()).map(|d| d.lang)
    }

    /// A reliable field-level detection wins; otherwise the entry-level
    /// language decides.
    fn needs_translation(&self, text: &str, entry_lang: Option<Lang>) -> bool {
        let trimmed = text.trim();
        if trimmed.chars().count() < MIN_DETECTABLE_CHARS {
            return false;
        }
        let lang = match self.detector.detect(trimmed) {
            Some(detection) if detection.reliable => Some(detection.lang),
            unreliable => entry_lang.or(unreliable.map(|d| d.lang)),
        };
        lang != Some(self.ctx.target_language)
    }

    async fn translate_field(
        &self,
        text: &str,
        entry_lang: Option<Lang>,
    ) -> Result<String, StageError> {
        if !self.needs_translation(text, entry_lang) {
            return Ok(text.to_string());
        }

        let output = self
            .ctx
            .ask(&self.ctx.prompts.translate, &[("text", text)])
            .await?;
        let translated = output.trim();
        if translated.is_empty() {
            return Err(StageError::Validation("empty translation".to_string()));
        }
        Ok(translated.to_string())
    }
}

#[async_trait]
impl EnrichmentStage for TranslationStage {
    fn stage(&self) -> Stage {
        Stage::Translate
    }

    async fn transform(&self, entry: &FeedEntry) -> Result<StageUpdate, StageError> {
        let entry_lang = self.entry_language(entry);
        let title_en = self.translate_field(&entry.title, entry_lang).await?;
        let description_en = self.translate_field(&entry.description, entry_lang).await?;

        Ok(StageUpdate::Translation {
            title_en,
            description_en,
            at: Utc::now(),
        })
    }
}

pub struct SummarizationStage {
    ctx: StageContext,
    max_chars: usize,
}

impl SummarizationStage {
    pub fn new(ctx: StageContext, max_chars: usize) -> Self {
        Self { ctx, max_chars }
    }
}

#[async_trait]
impl EnrichmentStage for SummarizationStage {
    fn stage(&self) -> Stage {
        Stage::Summarize
    }

    async fn transform(&self, entry: &FeedEntry) -> Result<StageUpdate, StageError> {
        let output = self
            .ctx
            .ask(
                &self.ctx.prompts.summarize,
                &[
                    ("title", entry.working_title()),
                    ("description", entry.working_description()),
                ],
            )
            .await?;

        let summary = sanitize_summary(&output, self.max_chars)
            .ok_or_else(|| StageError::Validation("empty summary".to_string()))?;

        Ok(StageUpdate::Summary {
            text: summary,
            at: Utc::now(),
        })
    }
}

pub struct AiTitleStage {
    ctx: StageContext,
    max_chars: usize,
}

impl AiTitleStage {
    pub fn new(ctx: StageContext, max_chars: usize) -> Self {
        Self { ctx, max_chars }
    }
}

#[async_trait]
impl EnrichmentStage for AiTitleStage {
    fn stage(&self) -> Stage {
        Stage::AiTitle
    }

    async fn transform(&self, entry: &FeedEntry) -> Result<StageUpdate, StageError> {
        let max_chars = self.max_chars.to_string();
        let output = self
            .ctx
            .ask(
                &self.ctx.prompts.ai_title,
                &[
                    ("title", entry.working_title()),
                    ("description", entry.working_description()),
                    ("max_chars", max_chars.as_str()),
                ],
            )
            .await?;

        let title = sanitize_title(&output, self.max_chars)
            .ok_or_else(|| StageError::Validation("empty title".to_string()))?;

        Ok(StageUpdate::AiTitle {
            text: title,
            at: Utc::now(),
        })
    }
}

pub struct CategorizationStage {
    ctx: StageContext,
    vocabulary: Vec<String>,
}

impl CategorizationStage {
    pub fn new(ctx: StageContext, vocabulary: Vec<String>) -> Self {
        Self { ctx, vocabulary }
    }
}

#[async_trait]
impl EnrichmentStage for CategorizationStage {
    fn stage(&self) -> Stage {
        Stage::Categorize
    }

    async fn transform(&self, entry: &FeedEntry) -> Result<StageUpdate, StageError> {
        let categories = self.vocabulary.join(", ");
        let output = self
            .ctx
            .ask(
                &self.ctx.prompts.categorize,
                &[
                    ("title", entry.working_title()),
                    ("description", entry.working_description()),
                    ("categories", categories.as_str()),
                ],
            )
            .await?;

        let value = match_category(&output, &self.vocabulary).ok_or_else(|| {
            StageError::Validation(format!("category '{}' is not in the vocabulary", output.trim()))
        })?;
        debug!("Entry {} categorized as {}", entry.id, value);

        Ok(StageUpdate::Category {
            value,
            at: Utc::now(),
        })
    }
}

fn strip_quotes(text: &str) -> &str {
    text.trim()
        .trim_matches(|c: char| matches!(c, '"' | '\'' | '`' | '“' | '”' | '‘' | '’' | '«' | '»'))
        .trim()
}

/// Collapse the model output to one paragraph within `max_chars`.
pub fn sanitize_summary(output: &str, max_chars: usize) -> Option<String> {
    let collapsed = output.split_whitespace().collect::<Vec<_>>().join(" ");
    let summary = truncate_chars(&collapsed, max_chars);
    (!summary.is_empty()).then_some(summary)
}

/// First non-empty line of the output, unquoted and bounded.
pub fn sanitize_title(output: &str, max_chars: usize) -> Option<String> {
    let line = output.lines().map(str::trim).find(|l| !l.is_empty())?;
    let title = truncate_chars(strip_quotes(line), max_chars);
    (!title.is_empty()).then_some(title)
}

/// Case-insensitive lookup of the output in the vocabulary, returning the
/// vocabulary's own spelling.
pub fn match_category(output: &str, vocabulary: &[String]) -> Option<String> {
    let candidate = strip_quotes(output).trim_end_matches('.').trim().to_lowercase();
    if candidate.is_empty() {
        return None;
    }
    vocabulary
        .iter()
        .find(|category| category.to_lowercase() == candidate)
        .cloned()
}
