use super::{EntryStore, StoreStats};
use crate::types::{CandidateEntry, FeedEntry, Result, Stage, StageUpdate};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::Row;
use tracing::{debug, info};
use uuid::Uuid;

const ENTRY_COLUMNS: &str = "id, link, source_url, title, description, pub_date, \
     title_en, description_en, translated_at, summary, summarized_at, \
     ai_title, ai_title_generated_at, category, category_generated_at, \
     created_at, updated_at";

pub struct PgEntryStore {
    db: PgPool,
}

impl PgEntryStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let db = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self { db })
    }

    /// Apply the embedded schema migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.db).await?;
        info!("Database schema is up to date");
        Ok(())
    }
}

fn completion_column(stage: Stage) -> &'static str {
    match stage {
        Stage::Translate => "translated_at",
        Stage::Summarize => "summarized_at",
        Stage::AiTitle => "ai_title_generated_at",
        Stage::Categorize => "category_generated_at",
    }
}

/// SQL predicate selecting entries pending for `stage`.
fn pending_predicate(stage: Stage) -> String {
    let mut predicate = format!("{} IS NULL", completion_column(stage));
    if stage.requires_translation() {
        predicate.push_str(" AND translated_at IS NOT NULL");
    }
    predicate
}

fn row_to_entry(row: &PgRow) -> Result<FeedEntry> {
    Ok(FeedEntry {
        id: row.try_get("id")?,
        link: row.try_get("link")?,
        source_url: row.try_get("source_url")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        pub_date: row.try_get("pub_date")?,
        title_en: row.try_get("title_en")?,
        description_en: row.try_get("description_en")?,
        translated_at: row.try_get("translated_at")?,
        summary: row.try_get("summary")?,
        summarized_at: row.try_get("summarized_at")?,
        ai_title: row.try_get("ai_title")?,
        ai_title_generated_at: row.try_get("ai_title_generated_at")?,
        category: row.try_get("category")?,
        category_generated_at: row.try_get("category_generated_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl EntryStore for PgEntryStore {
    async fn upsert(&self, entries: &[CandidateEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        let mut tx = self.db.begin().await?;
        let mut applied = 0;

        for entry in entries {
            // The WHERE clause turns an identical re-upsert into a no-op
            let result = sqlx::query(
                r#"
                INSERT INTO feed_entries (id, link, source_url, title, description, pub_date)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (link, source_url) DO UPDATE SET
                    title = EXCLUDED.title,
                    description = EXCLUDED.description,
                    pub_date = EXCLUDED.pub_date,
                    updated_at = NOW()
                WHERE (feed_entries.title, feed_entries.description, feed_entries.pub_date)
                    IS DISTINCT FROM (EXCLUDED.title, EXCLUDED.description, EXCLUDED.pub_date)
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(&entry.link)
            .bind(&entry.source_url)
            .bind(&entry.title)
            .bind(&entry.description)
            .bind(entry.pub_date)
            .execute(&mut *tx)
            .await?;

            applied += result.rows_affected() as usize;
        }

        tx.commit().await?;
        debug!("Upserted {} of {} entries", applied, entries.len());
        Ok(applied)
    }

    async fn latest_pub_date(&self, source_url: &str) -> Result<Option<DateTime<Utc>>> {
        let latest: Option<DateTime<Utc>> =
            sqlx::query_scalar("SELECT MAX(pub_date) FROM feed_entries WHERE source_url = $1")
                .bind(source_url)
                .fetch_one(&self.db)
                .await?;
        Ok(latest)
    }

    async fn select_unprocessed(
        &self,
        stage: Stage,
        after: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<FeedEntry>> {
        let sql = format!(
            "SELECT {} FROM feed_entries \
             WHERE {} AND ($1::uuid IS NULL OR id > $1) \
             ORDER BY id LIMIT $2",
            ENTRY_COLUMNS,
            pending_predicate(stage)
        );

        let rows = sqlx::query(&sql)
            .bind(after)
            .bind(limit as i64)
            .fetch_all(&self.db)
            .await?;

        rows.iter().map(row_to_entry).collect()
    }

    async fn apply_stage_update(&self, id: Uuid, update: &StageUpdate) -> Result<bool> {
        let guard = pending_predicate(update.stage());

        let query = match update {
            StageUpdate::Translation {
                title_en,
                description_en,
                at,
            } => {
                let sql = format!(
                    "UPDATE feed_entries SET title_en = $2, description_en = $3, \
                     translated_at = $4, updated_at = NOW() WHERE id = $1 AND {}",
                    guard
                );
                sqlx::query(&sql)
                    .bind(id)
                    .bind(title_en)
                    .bind(description_en)
                    .bind(at)
                    .execute(&self.db)
                    .await?
            }
            StageUpdate::Summary { text, at } => {
                let sql = format!(
                    "UPDATE feed_entries SET summary = $2, summarized_at = $3, \
                     updated_at = NOW() WHERE id = $1 AND {}",
                    guard
                );
                sqlx::query(&sql)
                    .bind(id)
                    .bind(text)
                    .bind(at)
                    .execute(&self.db)
                    .await?
            }
            StageUpdate::AiTitle { text, at } => {
                let sql = format!(
                    "UPDATE feed_entries SET ai_title = $2, ai_title_generated_at = $3, \
                     updated_at = NOW() WHERE id = $1 AND {}",
                    guard
                );
                sqlx::query(&sql)
                    .bind(id)
                    .bind(text)
                    .bind(at)
                    .execute(&self.db)
                    .await?
            }
            StageUpdate::Category { value, at } => {
                let sql = format!(
                    "UPDATE feed_entries SET category = $2, category_generated_at = $3, \
                     updated_at = NOW() WHERE id = $1 AND {}",
                    guard
                );
                sqlx::query(&sql)
                    .bind(id)
                    .bind(value)
                    .bind(at)
                    .execute(&self.db)
                    .await?
            }
        };

        Ok(query.rows_affected() > 0)
    }

    async fn get_entry(&self, link: &str, source_url: &str) -> Result<Option<FeedEntry>> {
        let sql = format!(
            "SELECT {} FROM feed_entries WHERE link = $1 AND source_url = $2",
            ENTRY_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(link)
            .bind(source_url)
            .fetch_optional(&self.db)
            .await?;

        row.as_ref().map(row_to_entry).transpose()
    }

    async fn stats(&self) -> Result<StoreStats> {
        let total_entries: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM feed_entries")
            .fetch_one(&self.db)
            .await?;

        let mut stats = StoreStats {
            total_entries,
            ..Default::default()
        };

        for stage in Stage::ALL {
            let sql = format!(
                "SELECT COUNT(*) FROM feed_entries WHERE {}",
                pending_predicate(stage)
            );
            let pending: i64 = sqlx::query_scalar(&sql).fetch_one(&self.db).await?;
            stats.pending.insert(stage.name().to_string(), pending);
        }

        Ok(stats)
    }
}
