//! Email row operations.

use anyhow::Result;
use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::mail::{CanonicalMessage, EmailMessage};

const EMAIL_COLUMNS: &str = "id, provider_id, subject, sender, body, received_at, processed, extracted_todo, todos_synced";

fn row_to_email(row: SqliteRow) -> EmailMessage {
    EmailMessage {
        id: row.get("id"),
        provider_id: row.get("provider_id"),
        subject: row.get("subject"),
        sender: row.get("sender"),
        body: row.get("body"),
        received_at: row.get("received_at"),
        processed: row.get("processed"),
        extracted_todo: row.get("extracted_todo"),
        todos_synced: row.get("todos_synced"),
    }
}

pub async fn exists(pool: &SqlitePool, provider_id: &str) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM emails WHERE provider_id = ?")
        .bind(provider_id)
        .fetch_optional(pool)
        .await?;
    Ok(found.is_some())
}

/// Insert in one transaction, ignoring provider ids that already exist.
pub async fn insert_ignore_duplicates(
    pool: &SqlitePool,
    messages: &[CanonicalMessage],
) -> Result<usize> {
    if messages.is_empty() {
        return Ok(0);
    }

    let fetched_at = Utc::now().timestamp();
    let mut tx = pool.begin().await?;
    let mut inserted = 0;

    for message in messages {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO emails
            (provider_id, subject, sender, sender_name, body, received_at, has_attachments, fetched_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&message.provider_id)
        .bind(&message.subject)
        .bind(&message.sender)
        .bind(&message.sender_name)
        .bind(&message.body)
        .bind(message.received_at)
        .bind(message.has_attachments)
        .bind(fetched_at)
        .execute(&mut *tx)
        .await?;
        inserted += result.rows_affected() as usize;
    }

    tx.commit().await?;
    Ok(inserted)
}

pub async fn mark_processed(
    pool: &SqlitePool,
    id: i64,
    extracted_todo: Option<&str>,
) -> Result<bool> {
    let todo = extracted_todo.map(str::trim).filter(|t| !t.is_empty());
    let result =
        sqlx::query("UPDATE emails SET processed = 1, extracted_todo = ? WHERE id = ? AND processed = 0")
            .bind(todo)
            .bind(id)
            .execute(pool)
            .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn mark_synced(pool: &SqlitePool, id: i64) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE emails SET todos_synced = 1
        WHERE id = ? AND todos_synced = 0
          AND extracted_todo IS NOT NULL AND extracted_todo <> ''
        "#,
    )
    .bind(id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn unprocessed(pool: &SqlitePool) -> Result<Vec<EmailMessage>> {
    let rows = sqlx::query(&format!(
        "SELECT {EMAIL_COLUMNS} FROM emails WHERE processed = 0 ORDER BY received_at ASC, id ASC"
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(row_to_email).collect())
}

pub async fn unsynced_todos(pool: &SqlitePool) -> Result<Vec<EmailMessage>> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {EMAIL_COLUMNS} FROM emails
        WHERE processed = 1 AND todos_synced = 0
          AND extracted_todo IS NOT NULL AND extracted_todo <> ''
        ORDER BY received_at ASC, id ASC
        "#
    ))
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(row_to_email).collect())
}

#[cfg(test)]
pub async fn get_by_provider_id(
    pool: &SqlitePool,
    provider_id: &str,
) -> Result<Option<EmailMessage>> {
    let row = sqlx::query(&format!(
        "SELECT {EMAIL_COLUMNS} FROM emails WHERE provider_id = ?"
    ))
    .bind(provider_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(row_to_email))
}
