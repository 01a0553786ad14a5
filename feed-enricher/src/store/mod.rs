//! Dedup-upsert store boundary.
//!
//! The store is the single source of truth for both ingest progress
//! (watermarks are derived from stored `pub_date`s) and enrichment progress
//! (the per-stage completion timestamps). Nothing above this layer keeps
//! entry state between phases.

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgEntryStore;

use crate::types::{CandidateEntry, FeedEntry, Result, Stage, StageUpdate};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

#[async_trait]
pub trait EntryStore: Send + Sync {
    /// Insert new entries and merge content fields of existing ones, keyed on
    /// `(link, source_url)`. Stage outputs are never touched. Returns the
    /// number of rows inserted or whose content changed.
    async fn upsert(&self, entries: &[CandidateEntry]) -> Result<usize>;

    /// Most recent stored `pub_date` for a source.
    async fn latest_pub_date(&self, source_url: &str) -> Result<Option<DateTime<Utc>>>;

    /// Up to `limit` entries pending for `stage`, ordered by id, with ids
    /// strictly greater than `after` when given.
    async fn select_unprocessed(
        &self,
        stage: Stage,
        after: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<FeedEntry>>;

    /// Write a stage result and its completion timestamp together, only if
    /// the stage is still pending for that entry. Returns whether it applied.
    async fn apply_stage_update(&self, id: Uuid, update: &StageUpdate) -> Result<bool>;

    async fn get_entry(&self, link: &str, source_url: &str) -> Result<Option<FeedEntry>>;

    async fn stats(&self) -> Result<StoreStats>;
}

/// Entry counts for logging and the `stats` command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub total_entries: i64,
    pub pending: BTreeMap<String, i64>,
}
