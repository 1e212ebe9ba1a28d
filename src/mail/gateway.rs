use anyhow::Result;
use async_trait::async_trait;

use super::types::{FetchBatch, SyncCheckpoint};

/// Source of new mail.
///
/// Calling `fetch_new_messages` repeatedly with an unchanged checkpoint must be
/// safe: it may return the same messages again, never lose any.
#[async_trait]
pub trait MailGateway: Send + Sync {
    async fn fetch_new_messages(&self, since: &SyncCheckpoint) -> Result<FetchBatch>;
}
