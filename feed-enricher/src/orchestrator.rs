use crate::ingest::fetch_candidates;
use crate::pipeline::{EnrichmentPipeline, StageReport};
use crate::store::EntryStore;
use crate::traits::FeedSource;
use crate::types::{EnricherError, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FetchReport {
    pub sources_ok: usize,
    pub sources_failed: usize,
    pub candidates: usize,
    pub applied: usize,
}

/// Summary of one orchestrator pass
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub fetch: FetchReport,
    pub stages: Vec<StageReport>,
    /// Store error that ended the fetch phase early, if any.
    pub fetch_error: Option<String>,
    /// Store error that ended the enrichment phase early, if any.
    pub enrichment_error: Option<String>,
}

impl PassReport {
    pub fn is_clean(&self) -> bool {
        self.fetch_error.is_none() && self.enrichment_error.is_none()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PassOptions {
    pub skip_fetch: bool,
    pub skip_enrich: bool,
}

/// Drives the fetch phase and then the enrichment phase. Holds no entry
/// state of its own; all progress lives in the store.
pub struct Orchestrator {
    sources: Vec<Box<dyn FeedSource>>,
    store: Arc<dyn EntryStore>,
    pipeline: EnrichmentPipeline,
    is_running: Arc<RwLock<bool>>,
}

impl Orchestrator {
    pub async fn stop(&self) {
        let mut is_running = self.is_running.write().await;
        *is_running = false;
        info!("Stopping orchestrator");
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    pub async fn run_pass(&self, options: PassOptions) -> PassReport {
        let started_at = Utc::now();
        let mut fetch = FetchReport::default();
        let mut stages = Vec::new();
        let mut fetch_error = None;
        let mut enrichment_error = None;

        if !options.skip_fetch {
            if let Err(e) = self.run_fetch_phase(&mut fetch).await {
                error!("Fetch phase aborted: {}", e);
                fetch_error = Some(e.to_string());
            }
        }

        if !options.skip_enrich && self.is_running().await {
            if let Err(e) = self
                .pipeline
                .run(self.store.as_ref(), &self.is_running, &mut stages)
                .await
            {
                error!("Enrichment phase aborted: {}", e);
                enrichment_error = Some(e.to_string());
            }
        }

        let report = PassReport {
            started_at,
            finished_at: Utc::now(),
            fetch,
            stages,
            fetch_error,
            enrichment_error,
        };
        info!(
            "Pass finished: {}/{} sources ok, {} candidates, {} rows applied",
            report.fetch.sources_ok,
            report.fetch.sources_ok + report.fetch.sources_failed,
            report.fetch.candidates,
            report.fetch.applied
        );
        report
    }

    /// Fetch and upsert every source. Source failures are skipped; a store
    /// failure ends the phase.
    pub async fn run_fetch_phase(&self, report: &mut FetchReport) -> Result<()> {
        info!("Fetching {} sources", self.sources.len());

        for source in &self.sources {
            if !self.is_running().await {
                info!("Shutdown requested, stopping fetch phase");
                break;
            }

            let candidates = match fetch_candidates(self.store.as_ref(), source.as_ref(), Utc::now()).await {
                Ok(candidates) => candidates,
                Err(e) if e.is_store_failure() => return Err(e),
                Err(e) => {
                    warn!("Skipping source {} this cycle: {}", source.source_url(), e);
                    report.sources_failed += 1;
                    continue;
                }
            };

            let applied = self.store.upsert(&candidates).await?;
            info!(
                "Source {}: {} candidates, {} rows applied",
                source.source_url(),
                candidates.len(),
                applied
            );
            report.sources_ok += 1;
            report.candidates += candidates.len();
            report.applied += applied;
        }

        Ok(())
    }
}

/// Builder for assembling an orchestrator
pub struct OrchestratorBuilder {
    sources: Vec<Box<dyn FeedSource>>,
    store: Option<Arc<dyn EntryStore>>,
    pipeline: Option<EnrichmentPipeline>,
    is_running: Option<Arc<RwLock<bool>>>,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            store: None,
            pipeline: None,
            is_running: None,
        }
    }

    pub fn add_source(mut self, source: Box<dyn FeedSource>) -> Self {
        info!("Adding source: {}", source.source_url());
        self.sources.push(source);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn EntryStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_pipeline(mut self, pipeline: EnrichmentPipeline) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    pub fn with_running_flag(mut self, is_running: Arc<RwLock<bool>>) -> Self {
        self.is_running = Some(is_running);
        self
    }

    pub fn build(self) -> Result<Orchestrator> {
        let store = self
            .store
            .ok_or_else(|| EnricherError::Config("orchestrator needs a store".to_string()))?;

        Ok(Orchestrator {
            sources: self.sources,
            store,
            pipeline: self
                .pipeline
                .unwrap_or_else(|| EnrichmentPipeline::new(Default::default())),
            is_running: self
                .is_running
                .unwrap_or_else(|| Arc::new(RwLock::new(true))),
        })
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
