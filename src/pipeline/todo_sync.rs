//! Delivery of extracted to-dos to the backend list.

use std::sync::Arc;

use super::outcome::{BatchResult, Outcome};
use crate::error::{ErrorKind, ProcessingError};
use crate::mail::EmailMessage;
use crate::store::EmailStore;
use crate::todo::TodoGateway;

const ALREADY_SYNCED: &str = "TODOs already synced";
const SKIP_NO_TODO: &str = "No TODOs";
const SKIP_SYNCED: &str = "Already synced";

pub struct TodoSyncOrchestrator {
    gateway: Arc<dyn TodoGateway>,
    store: Arc<dyn EmailStore>,
}

/// Why a message takes no part in a sync batch, if it doesn't.
fn skip_reason(message: &EmailMessage) -> Option<&'static str> {
    if message.todo().is_none() {
        Some(SKIP_NO_TODO)
    } else if message.todos_synced {
        Some(SKIP_SYNCED)
    } else {
        None
    }
}

impl TodoSyncOrchestrator {
    pub fn new(gateway: Arc<dyn TodoGateway>, store: Arc<dyn EmailStore>) -> Self {
        Self { gateway, store }
    }

    /// Push one message's to-do to `list_name`.
    ///
    /// A message already synced is reported as success without calling the
    /// backend. A gateway failure leaves the synced flag untouched so a later
    /// run can try again.
    pub async fn sync_single(&self, message: &EmailMessage, list_name: &str) -> Outcome<String> {
        let Some(todo) = message.todo() else {
            return Outcome::Error(ProcessingError::validation(format!(
                "No TODO to sync for '{}'",
                message.subject
            )));
        };
        if message.todos_synced {
            return Outcome::Success(ALREADY_SYNCED.to_string());
        }

        if let Err(e) = self.gateway.add_todo(list_name, todo).await {
            return Outcome::Error(
                ProcessingError::classify("Failed to add TODO", e, ErrorKind::Api).into_remote(),
            );
        }

        // The backend has the item now; a failure here means the next run
        // delivers it a second time.
        if let Err(e) = self.store.mark_synced(message.id).await {
            return Outcome::Error(ProcessingError::classify(
                "TODO added but not marked synced",
                e,
                ErrorKind::Database,
            ));
        }

        tracing::debug!("Synced to-do '{}' to '{}'", todo, list_name);
        Outcome::Success(format!("TODO synced: {}", todo))
    }

    /// Sort messages into skipped and eligible, then push the eligible ones
    /// one at a time. Items keep input order.
    pub async fn sync_multiple(&self, messages: &[EmailMessage], list_name: &str) -> BatchResult {
        let classified: Vec<(&EmailMessage, Option<&'static str>)> =
            messages.iter().map(|m| (m, skip_reason(m))).collect();
        let eligible = classified.iter().filter(|(_, skip)| skip.is_none()).count();
        tracing::debug!(
            "{} of {} messages eligible for to-do sync",
            eligible,
            messages.len()
        );

        let mut batch = BatchResult::with_capacity(messages.len());
        for (message, skip) in classified {
            if let Some(reason) = skip {
                batch.record_skip(message.id, &message.subject, reason);
                continue;
            }

            match self.sync_single(message, list_name).await {
                Outcome::Success(summary) => {
                    batch.record_success(message.id, &message.subject, summary)
                }
                Outcome::Error(e) => {
                    tracing::warn!("To-do sync of '{}' failed: {}", message.subject, e);
                    batch.record_failure(message.id, &message.subject, e.message)
                }
                Outcome::Loading => {
                    batch.record_skip(message.id, &message.subject, "Sync pending")
                }
            }
        }

        tracing::info!(
            "To-do sync: {} synced, {} failed, {} skipped",
            batch.successful,
            batch.failed,
            batch.skipped
        );
        batch
    }

    /// Push every stored to-do not delivered yet.
    pub async fn sync_pending(&self, list_name: &str) -> Outcome<BatchResult> {
        match self.store.unsynced_todos().await {
            Ok(messages) => Outcome::Success(self.sync_multiple(&messages, list_name).await),
            Err(e) => Outcome::Error(ProcessingError::classify(
                "Failed to load pending TODOs",
                e,
                ErrorKind::Database,
            )),
        }
    }
}
