use crate::config::{BatchSizes, EnrichmentConfig};
use crate::enrichment::{
    AiTitleStage, CategorizationStage, EnrichmentStage, RateLimitedClient, StageContext,
    StageError, SummarizationStage, TextGenerator, TranslationStage,
};
use crate::store::EntryStore;
use crate::types::{Result, Stage};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Outcome counters for one stage over one pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    pub selected: usize,
    pub written: usize,
    /// Model output rejected by validation; the entry stays pending.
    pub no_result: usize,
    /// Generation failed after retries; the entry stays pending.
    pub failed: usize,
    /// The guarded write found the stage already completed.
    pub stale: usize,
}

impl StageReport {
    pub fn new(stage: Stage) -> Self {
        Self {
            stage,
            selected: 0,
            written: 0,
            no_result: 0,
            failed: 0,
            stale: 0,
        }
    }
}

/// Runs enrichment stages in dependency order, draining each backlog in
/// batches.
pub struct EnrichmentPipeline {
    stages: Vec<Box<dyn EnrichmentStage>>,
    batch_sizes: BatchSizes,
}

impl EnrichmentPipeline {
    pub fn new(batch_sizes: BatchSizes) -> Self {
        Self {
            stages: Vec::new(),
            batch_sizes,
        }
    }

    /// Build the four standard stages on top of one shared rate-limited
    /// client, so pacing applies across stages.
    pub fn from_config(config: &EnrichmentConfig, generator: Arc<dyn TextGenerator>) -> Result<Self> {
        let client = Arc::new(RateLimitedClient::new(
            generator,
            config.model.clone(),
            config.rate_limit.clone(),
        ));
        let ctx = StageContext {
            client,
            prompts: Arc::new(config.prompts.clone()),
            target_language: config.target_lang()?,
        };

        let mut pipeline = Self::new(config.batch_sizes.clone());
        pipeline.add_stage(Box::new(TranslationStage::new(ctx.clone())));
        pipeline.add_stage(Box::new(SummarizationStage::new(
            ctx.clone(),
            config.summary_max_chars,
        )));
        pipeline.add_stage(Box::new(AiTitleStage::new(
            ctx.clone(),
            config.ai_title_max_chars,
        )));
        pipeline.add_stage(Box::new(CategorizationStage::new(
            ctx,
            config.categories.clone(),
        )));
        Ok(pipeline)
    }

    /// Add a stage. Stages always run in dependency order regardless of the
    /// order they were added in.
    pub fn add_stage(&mut self, stage: Box<dyn EnrichmentStage>) {
        info!("Adding enrichment stage: {}", stage.stage_name());
        self.stages.push(stage);
        self.stages.sort_by_key(|s| stage_rank(s.stage()));
    }

    /// Drain every stage once, appending one report per stage to `reports`.
    /// A store error aborts the phase; reports of the stages drained before
    /// it are kept. Item errors are counted and logged.
    pub async fn run(
        &self,
        store: &dyn EntryStore,
        is_running: &RwLock<bool>,
        reports: &mut Vec<StageReport>,
    ) -> Result<()> {
        for stage in &self.stages {
            if !*is_running.read().await {
                info!("Shutdown requested, skipping remaining stages");
                break;
            }
            let report = self.drain_stage(stage.as_ref(), store, is_running).await?;
            reports.push(report);
        }

        Ok(())
    }

    /// Walk the stage's backlog forward with a keyset cursor. Entries that
    /// fail stay pending but are not reselected in this pass.
    pub async fn drain_stage(
        &self,
        stage: &dyn EnrichmentStage,
        store: &dyn EntryStore,
        is_running: &RwLock<bool>,
    ) -> Result<StageReport> {
        let kind = stage.stage();
        let batch_size = self.batch_sizes.for_stage(kind).max(1);
        let mut report = StageReport::new(kind);
        let mut cursor = None;

        'drain: loop {
            let batch = store.select_unprocessed(kind, cursor, batch_size).await?;
            if batch.is_empty() {
                break;
            }
            debug!("Stage {}: processing batch of {}", kind, batch.len());
            report.selected += batch.len();

            for entry in &batch {
                if !*is_running.read().await {
                    info!("Shutdown requested, stopping stage {}", kind);
                    break 'drain;
                }
                cursor = Some(entry.id);

                match stage.transform(entry).await {
                    Ok(update) => {
                        if store.apply_stage_update(entry.id, &update).await? {
                            report.written += 1;
                        } else {
                            debug!("Stage {} already complete for entry {}", kind, entry.id);
                            report.stale += 1;
                        }
                    }
                    Err(StageError::Validation(reason)) => {
                        warn!(
                            "Stage {} discarded output for {} ({}): {}",
                            kind, entry.link, entry.source_url, reason
                        );
                        report.no_result += 1;
                    }
                    Err(StageError::Generation(e)) => {
                        warn!(
                            "Stage {} failed for {} ({}): {}",
                            kind, entry.link, entry.source_url, e
                        );
                        report.failed += 1;
                    }
                }
            }
        }

        info!(
            "Stage {}: selected {}, written {}, no result {}, failed {}",
            kind, report.selected, report.written, report.no_result, report.failed
        );
        Ok(report)
    }
}

fn stage_rank(stage: Stage) -> usize {
    Stage::ALL
        .iter()
        .position(|s| *s == stage)
        .unwrap_or(Stage::ALL.len())
}
