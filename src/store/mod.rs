//! Durable pipeline state.
//!
//! The orchestrators only see the [`EmailStore`] and [`JobLog`] traits, the
//! to-do gateway only sees [`ListDirectory`]; [`SqliteStore`] is the
//! production implementation.

mod email;
mod schema;
mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::mail::{CanonicalMessage, EmailMessage, SyncCheckpoint};

pub use sqlite::SqliteStore;

/// Per-message processing state keyed by provider id.
///
/// Every mutation is idempotent so that retried or overlapping cycles can
/// call it again without harm; the store never wraps several items in one
/// transaction on behalf of a caller.
#[async_trait]
pub trait EmailStore: Send + Sync {
    async fn exists_by_provider_id(&self, provider_id: &str) -> Result<bool>;

    /// Insert messages, silently skipping provider ids already stored.
    /// Returns the number of rows actually inserted.
    async fn insert_ignore_duplicates(&self, messages: &[CanonicalMessage]) -> Result<usize>;

    /// Record the analysis result. Blank extractions are stored as absent.
    /// Returns `false` when the message was already processed.
    async fn mark_processed(&self, id: i64, extracted_todo: Option<&str>) -> Result<bool>;

    /// Flag the extracted to-do as delivered. Returns `false` when the message
    /// has no to-do or was already synced.
    async fn mark_synced(&self, id: i64) -> Result<bool>;

    /// Messages awaiting analysis, oldest first.
    async fn unprocessed(&self) -> Result<Vec<EmailMessage>>;

    /// Processed messages holding a to-do that has not been delivered, oldest first.
    async fn unsynced_todos(&self) -> Result<Vec<EmailMessage>>;

    async fn load_checkpoint(&self) -> Result<SyncCheckpoint>;

    /// Overwrite the single checkpoint record.
    async fn save_checkpoint(&self, checkpoint: &SyncCheckpoint) -> Result<()>;
}

/// One finished scheduler job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRun {
    pub job: String,
    pub status: String,
    pub message: String,
    pub attempts: u32,
    /// Unix seconds
    pub finished_at: i64,
}

#[async_trait]
pub trait JobLog: Send + Sync {
    async fn record_job_run(&self, run: &JobRun) -> Result<()>;
}

/// Backend list ids created by this process, keyed by list name.
#[async_trait]
pub trait ListDirectory: Send + Sync {
    async fn list_id(&self, name: &str) -> Result<Option<String>>;

    /// Remember the id of a created list. The first id stored for a name wins.
    async fn save_list_id(&self, name: &str, id: &str) -> Result<()>;
}

/// Message counts shown by `mailflow status`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub total: i64,
    pub unprocessed: i64,
    pub todos_pending: i64,
    pub todos_synced: i64,
}
