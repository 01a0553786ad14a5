use super::{EntryStore, StoreStats};
use crate::types::{CandidateEntry, FeedEntry, Result, Stage, StageUpdate};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

#[derive(Default)]
struct MemoryState {
    entries: BTreeMap<Uuid, FeedEntry>,
    by_identity: HashMap<(String, String), Uuid>,
}

/// In-process store with the same semantics as the PostgreSQL store.
/// Used for dry runs without a database and by the test suite.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every stored entry, ordered by id.
    pub async fn all_entries(&self) -> Vec<FeedEntry> {
        self.state.read().await.entries.values().cloned().collect()
    }
}

#[async_trait]
impl EntryStore for MemoryStore {
    async fn upsert(&self, entries: &[CandidateEntry]) -> Result<usize> {
        let mut state = self.state.write().await;
        let now = Utc::now();
        let mut applied = 0;

        for candidate in entries {
            let key = (candidate.link.clone(), candidate.source_url.clone());

            match state.by_identity.get(&key).copied() {
                Some(id) => {
                    let Some(existing) = state.entries.get_mut(&id) else {
                        continue;
                    };
                    let changed = existing.title != candidate.title
                        || existing.description != candidate.description
                        || existing.pub_date != candidate.pub_date;
                    if changed {
                        existing.title = candidate.title.clone();
                        existing.description = candidate.description.clone();
                        existing.pub_date = candidate.pub_date;
                        existing.updated_at = now;
                        applied += 1;
                    }
                }
                None => {
                    let id = Uuid::new_v4();
                    state.entries.insert(id, new_entry(id, candidate, now));
                    state.by_identity.insert(key, id);
                    applied += 1;
                }
            }
        }

        debug!("Memory upsert applied {} of {} entries", applied, entries.len());
        Ok(applied)
    }

    async fn latest_pub_date(&self, source_url: &str) -> Result<Option<DateTime<Utc>>> {
        let state = self.state.read().await;
        Ok(state
            .entries
            .values()
            .filter(|e| e.source_url == source_url)
            .map(|e| e.pub_date)
            .max())
    }

    async fn select_unprocessed(
        &self,
        stage: Stage,
        after: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<FeedEntry>> {
        let state = self.state.read().await;
        let lower = match after {
            Some(id) => Bound::Excluded(id),
            None => Bound::Unbounded,
        };

        Ok(state
            .entries
            .range((lower, Bound::Unbounded))
            .map(|(_, e)| e)
            .filter(|e| e.is_pending(stage))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn apply_stage_update(&self, id: Uuid, update: &StageUpdate) -> Result<bool> {
        let mut state = self.state.write().await;
        let Some(entry) = state.entries.get_mut(&id) else {
            return Ok(false);
        };

        if !entry.is_pending(update.stage()) {
            return Ok(false);
        }

        match update {
            StageUpdate::Translation {
                title_en,
                description_en,
                at,
            } => {
                entry.title_en = Some(title_en.clone());
                entry.description_en = Some(description_en.clone());
                entry.translated_at = Some(*at);
            }
            StageUpdate::Summary { text, at } => {
                entry.summary = Some(text.clone());
                entry.summarized_at = Some(*at);
            }
            StageUpdate::AiTitle { text, at } => {
                entry.ai_title = Some(text.clone());
                entry.ai_title_generated_at = Some(*at);
            }
            StageUpdate::Category { value, at } => {
                entry.category = Some(value.clone());
                entry.category_generated_at = Some(*at);
            }
        }
        entry.updated_at = Utc::now();
        Ok(true)
    }

    async fn get_entry(&self, link: &str, source_url: &str) -> Result<Option<FeedEntry>> {
        let state = self.state.read().await;
        let key = (link.to_string(), source_url.to_string());
        Ok(state
            .by_identity
            .get(&key)
            .and_then(|id| state.entries.get(id))
            .cloned())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let state = self.state.read().await;
        let mut stats = StoreStats {
            total_entries: state.entries.len() as i64,
            ..Default::default()
        };
        for stage in Stage::ALL {
            let pending = state.entries.values().filter(|e| e.is_pending(stage)).count();
            stats.pending.insert(stage.name().to_string(), pending as i64);
        }
        Ok(stats)
    }
}

fn new_entry(id: Uuid, candidate: &CandidateEntry, now: DateTime<Utc>) -> FeedEntry {
    FeedEntry {
        id,
        link: candidate.link.clone(),
        source_url: candidate.source_url.clone(),
        title: candidate.title.clone(),
        description: candidate.description.clone(),
        pub_date: candidate.pub_date,
        title_en: None,
        description_en: None,
        translated_at: None,
        summary: None,
        summarized_at: None,
        ai_title: None,
        ai_title_generated_at: None,
        category: None,
        category_generated_at: None,
        created_at: now,
        updated_at: now,
    }
}
