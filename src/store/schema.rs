//! Database schema initialization.

use anyhow::{Context, Result};
use sqlx::SqlitePool;

const SCHEMA_VERSION: i64 = 1;

/// Create all tables and indexes. Safe to run on every open.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );

        -- One row per provider message; a delivered to-do must exist
        CREATE TABLE IF NOT EXISTS emails (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            provider_id TEXT NOT NULL UNIQUE,
            subject TEXT NOT NULL DEFAULT '',
            sender TEXT NOT NULL DEFAULT '',
            sender_name TEXT,
            body TEXT NOT NULL DEFAULT '',
            received_at INTEGER NOT NULL,
            has_attachments INTEGER NOT NULL DEFAULT 0,
            processed INTEGER NOT NULL DEFAULT 0,
            extracted_todo TEXT,
            todos_synced INTEGER NOT NULL DEFAULT 0,
            fetched_at INTEGER NOT NULL,
            CHECK (todos_synced = 0 OR (extracted_todo IS NOT NULL AND extracted_todo <> ''))
        );

        CREATE INDEX IF NOT EXISTS idx_emails_processed ON emails(processed, received_at);
        CREATE INDEX IF NOT EXISTS idx_emails_pending_todos ON emails(todos_synced, processed);
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create email tables")?;

    sqlx::query(
        r#"
        -- Single checkpoint row
        CREATE TABLE IF NOT EXISTS sync_state (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            cursor TEXT,
            last_sync INTEGER
        );

        CREATE TABLE IF NOT EXISTS job_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            job TEXT NOT NULL,
            status TEXT NOT NULL,
            message TEXT NOT NULL DEFAULT '',
            attempts INTEGER NOT NULL DEFAULT 1,
            finished_at INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_job_runs_finished ON job_runs(finished_at DESC);

        -- Lists created on the to-do backend
        CREATE TABLE IF NOT EXISTS todo_lists (
            name TEXT PRIMARY KEY,
            list_id TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create state tables")?;

    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(SCHEMA_VERSION)
        .execute(pool)
        .await?;

    Ok(())
}
