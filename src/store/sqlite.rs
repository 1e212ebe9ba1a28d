//! SQLite-backed [`EmailStore`], [`JobLog`] and [`ListDirectory`].

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::{EmailStore, JobLog, JobRun, ListDirectory, StoreStats, email, schema};
use crate::mail::{CanonicalMessage, EmailMessage, SyncCheckpoint};

/// A single background process writes; a few readers (the `status` command)
/// may look in at the same time.
const POOL_SIZE: u32 = 4;

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let db_url = format!("sqlite:{}?mode=rwc", path.display());

        let options = SqliteConnectOptions::from_str(&db_url)?
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(POOL_SIZE)
            .connect_with(options)
            .await
            .context("Failed to create connection pool")?;

        schema::init_schema(&pool).await?;
        tracing::debug!("Opened store at {}", path.display());

        Ok(Self { pool })
    }

    #[cfg(test)]
    pub async fn open_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .context("Failed to create in-memory connection pool")?;

        schema::init_schema(&pool).await?;

        Ok(Self { pool })
    }

    #[cfg(test)]
    pub async fn get_by_provider_id(&self, provider_id: &str) -> Result<Option<EmailMessage>> {
        email::get_by_provider_id(&self.pool, provider_id).await
    }

    /// Most recent job runs, newest first.
    pub async fn recent_job_runs(&self, limit: usize) -> Result<Vec<JobRun>> {
        let rows = sqlx::query(
            r#"
            SELECT job, status, message, attempts, finished_at
            FROM job_runs
            ORDER BY finished_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| JobRun {
                job: row.get("job"),
                status: row.get("status"),
                message: row.get("message"),
                attempts: row.get::<i64, _>("attempts") as u32,
                finished_at: row.get("finished_at"),
            })
            .collect())
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COALESCE(SUM(processed = 0), 0) AS unprocessed,
                COALESCE(SUM(processed = 1 AND todos_synced = 0
                    AND extracted_todo IS NOT NULL AND extracted_todo <> ''), 0) AS todos_pending,
                COALESCE(SUM(todos_synced = 1), 0) AS todos_synced
            FROM emails
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(StoreStats {
            total: row.get("total"),
            unprocessed: row.get("unprocessed"),
            todos_pending: row.get("todos_pending"),
            todos_synced: row.get("todos_synced"),
        })
    }
}

#[async_trait]
impl EmailStore for SqliteStore {
    async fn exists_by_provider_id(&self, provider_id: &str) -> Result<bool> {
        email::exists(&self.pool, provider_id).await
    }

    async fn insert_ignore_duplicates(&self, messages: &[CanonicalMessage]) -> Result<usize> {
        email::insert_ignore_duplicates(&self.pool, messages).await
    }

    async fn mark_processed(&self, id: i64, extracted_todo: Option<&str>) -> Result<bool> {
        email::mark_processed(&self.pool, id, extracted_todo).await
    }

    async fn mark_synced(&self, id: i64) -> Result<bool> {
        email::mark_synced(&self.pool, id).await
    }

    async fn unprocessed(&self) -> Result<Vec<EmailMessage>> {
        email::unprocessed(&self.pool).await
    }

    async fn unsynced_todos(&self) -> Result<Vec<EmailMessage>> {
        email::unsynced_todos(&self.pool).await
    }

    async fn load_checkpoint(&self) -> Result<SyncCheckpoint> {
        let row = sqlx::query("SELECT cursor, last_sync FROM sync_state WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;

        Ok(match row {
            Some(row) => SyncCheckpoint {
                cursor: row.get("cursor"),
                last_sync: row.get("last_sync"),
            },
            None => SyncCheckpoint::default(),
        })
    }

    async fn save_checkpoint(&self, checkpoint: &SyncCheckpoint) -> Result<()> {
        sqlx::query("INSERT OR REPLACE INTO sync_state (id, cursor, last_sync) VALUES (1, ?, ?)")
            .bind(&checkpoint.cursor)
            .bind(checkpoint.last_sync)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl JobLog for SqliteStore {
    async fn record_job_run(&self, run: &JobRun) -> Result<()> {
        sqlx::query(
            "INSERT INTO job_runs (job, status, message, attempts, finished_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&run.job)
        .bind(&run.status)
        .bind(&run.message)
        .bind(run.attempts as i64)
        .bind(run.finished_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl ListDirectory for SqliteStore {
    async fn list_id(&self, name: &str) -> Result<Option<String>> {
        let id: Option<String> = sqlx::query_scalar("SELECT list_id FROM todo_lists WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }

    async fn save_list_id(&self, name: &str, id: &str) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO todo_lists (name, list_id, created_at) VALUES (?, ?, ?)")
            .bind(name)
            .bind(id)
            .bind(chrono::Utc::now().timestamp())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
