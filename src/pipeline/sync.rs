//! Mail sync cycle: fetch, filter per target, deduplicate, persist.

use std::sync::Arc;

use chrono::Utc;

use super::outcome::SyncResult;
use crate::error::{ErrorKind, ProcessingError};
use crate::mail::{CanonicalMessage, MailGateway, MessageFilter, SyncCheckpoint};
use crate::store::EmailStore;

/// A named slice of the mailbox worth persisting.
#[derive(Debug, Clone)]
pub struct SyncTarget {
    pub name: String,
    pub filter: MessageFilter,
}

impl SyncTarget {
    pub fn new(name: impl Into<String>, filter: MessageFilter) -> Self {
        Self {
            name: name.into(),
            filter,
        }
    }

    /// Accepts every message. Used when nothing is configured.
    pub fn catch_all() -> Self {
        Self::new("all", MessageFilter::any())
    }
}

pub struct SyncOrchestrator {
    gateway: Arc<dyn MailGateway>,
    store: Arc<dyn EmailStore>,
    targets: Vec<SyncTarget>,
}

impl SyncOrchestrator {
    pub fn new(
        gateway: Arc<dyn MailGateway>,
        store: Arc<dyn EmailStore>,
        targets: Vec<SyncTarget>,
    ) -> Self {
        let targets = if targets.is_empty() {
            vec![SyncTarget::catch_all()]
        } else {
            targets
        };
        Self {
            gateway,
            store,
            targets,
        }
    }

    /// Run one sync cycle. Never retries; that is the scheduler's call.
    pub async fn sync(&self) -> SyncResult {
        let checkpoint = match self.store.load_checkpoint().await {
            Ok(checkpoint) => checkpoint,
            Err(e) => {
                return SyncResult::Failure(ProcessingError::classify(
                    "Failed to load sync checkpoint",
                    e,
                    ErrorKind::Database,
                ));
            }
        };

        let batch = match self.gateway.fetch_new_messages(&checkpoint).await {
            Ok(batch) => batch,
            Err(e) => {
                let error = ProcessingError::classify("Failed to fetch messages", e, ErrorKind::Network);
                tracing::error!("{}", error);
                return SyncResult::Failure(error);
            }
        };
        let fetched = batch.messages.len();
        tracing::info!("Fetched {} messages", fetched);

        let mut outcomes = Vec::with_capacity(self.targets.len());
        for target in &self.targets {
            let outcome = self.persist_target(target, &batch.messages).await;
            match &outcome {
                Ok(inserted) => {
                    tracing::debug!("Target '{}': {} new messages", target.name, inserted)
                }
                Err(e) => tracing::warn!("Target '{}' failed: {}", target.name, e),
            }
            outcomes.push((target.name.as_str(), outcome));
        }

        let result = aggregate_targets(fetched, outcomes);

        // Messages past the cursor are never offered again, so it only moves
        // once every target has persisted its share.
        match (&result, batch.new_cursor) {
            (SyncResult::Success { .. }, Some(cursor)) => {
                let checkpoint = SyncCheckpoint {
                    cursor: Some(cursor),
                    last_sync: Some(Utc::now().timestamp()),
                };
                if let Err(e) = self.store.save_checkpoint(&checkpoint).await {
                    return SyncResult::Failure(ProcessingError::classify(
                        "Failed to save sync checkpoint",
                        e,
                        ErrorKind::Database,
                    ));
                }
            }
            (SyncResult::Success { .. }, None) => {}
            _ => tracing::info!("Keeping sync cursor until every target has stored its messages"),
        }

        result
    }

    /// Persist the messages one target selects that are not stored yet.
    async fn persist_target(
        &self,
        target: &SyncTarget,
        messages: &[CanonicalMessage],
    ) -> Result<usize, ProcessingError> {
        let mut fresh = Vec::new();
        for message in messages.iter().filter(|m| target.filter.matches(m)) {
            let known = self
                .store
                .exists_by_provider_id(&message.provider_id)
                .await
                .map_err(|e| {
                    ProcessingError::classify("Failed to check for duplicates", e, ErrorKind::Database)
                })?;
            if !known {
                tracing::debug!(
                    "Storing '{}' from {} for '{}'",
                    message.subject,
                    message.display_sender(),
                    target.name
                );
                fresh.push(message.clone());
            }
        }

        if fresh.is_empty() {
            return Ok(0);
        }

        self.store
            .insert_ignore_duplicates(&fresh)
            .await
            .map_err(|e| ProcessingError::classify("Failed to save messages", e, ErrorKind::Database))
    }
}

/// Fold per-target results into one cycle result.
///
/// All targets failing is a failure, some failing is a partial success
/// carrying one message per failed target, none failing is a success. A total
/// failure keeps the error kind when every target failed the same way.
pub fn aggregate_targets(
    fetched: usize,
    outcomes: Vec<(&str, Result<usize, ProcessingError>)>,
) -> SyncResult {
    let total = outcomes.len();
    let mut processed = 0;
    let mut error_messages = Vec::new();
    let mut kinds = Vec::new();

    for (name, outcome) in outcomes {
        match outcome {
            Ok(inserted) => processed += inserted,
            Err(e) => {
                error_messages.push(format!("Target '{}': {}", name, e.message));
                kinds.push(e.kind);
            }
        }
    }

    let errors = error_messages.len();
    if total > 0 && errors == total {
        let kind = match kinds.split_first() {
            Some((first, rest)) if rest.iter().all(|kind| kind == first) => *first,
            _ => ErrorKind::Database,
        };
        return SyncResult::Failure(ProcessingError::new(
            kind,
            format!("All targets failed to sync: {}", error_messages.join("; ")),
        ));
    }

    if errors > 0 {
        SyncResult::PartialSuccess {
            fetched,
            processed,
            errors,
            error_messages,
        }
    } else {
        SyncResult::Success {
            fetched,
            processed,
            errors: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayError;
    use crate::pipeline::testing::{CursorMailbox, FakeMailGateway, FlakyStore, canonical};
    use crate::store::SqliteStore;

    async fn store() -> Arc<SqliteStore> {
        Arc::new(SqliteStore::open_in_memory().await.unwrap())
    }

    fn subject_target(name: &str, subject: &str) -> SyncTarget {
        let filter = MessageFilter::new(&[], &[subject.to_string()], &[], None).unwrap();
        SyncTarget::new(name, filter)
    }

    #[tokio::test]
    async fn test_resync_of_same_messages_stores_each_once() {
        let store = store().await;
        let gateway = Arc::new(FakeMailGateway::returning(
            vec![canonical("a"), canonical("b"), canonical("c")],
            Some("1:3"),
        ));
        let sync = SyncOrchestrator::new(gateway.clone(), store.clone(), Vec::new());

        let first = sync.sync().await;
        assert!(matches!(
            first,
            SyncResult::Success { fetched: 3, processed: 3, errors: 0 }
        ));

        let second = sync.sync().await;
        assert!(matches!(
            second,
            SyncResult::Success { fetched: 3, processed: 0, errors: 0 }
        ));

        assert_eq!(store.stats().await.unwrap().total, 3);
        assert_eq!(gateway.calls(), 2);
    }

    #[tokio::test]
    async fn test_cursor_saved_even_without_new_messages() {
        let store = store().await;
        let gateway = Arc::new(FakeMailGateway::returning(Vec::new(), Some("5:99")));
        let sync = SyncOrchestrator::new(gateway.clone(), store.clone(), Vec::new());

        let result = sync.sync().await;
        assert!(matches!(
            result,
            SyncResult::Success { fetched: 0, processed: 0, errors: 0 }
        ));

        let checkpoint = store.load_checkpoint().await.unwrap();
        assert_eq!(checkpoint.cursor.as_deref(), Some("5:99"));
        assert!(checkpoint.last_sync.is_some());

        // The next fetch starts from the saved cursor
        sync.sync().await;
        assert_eq!(gateway.last_checkpoint().cursor.as_deref(), Some("5:99"));
    }

    #[tokio::test]
    async fn test_fetch_failure_is_classified_failure() {
        let store = store().await;
        let gateway = Arc::new(FakeMailGateway::failing(|| {
            GatewayError::NotAuthenticated("no session".into()).into()
        }));
        let sync = SyncOrchestrator::new(gateway, store.clone(), Vec::new());

        match sync.sync().await {
            SyncResult::Failure(e) => assert_eq!(e.kind, ErrorKind::Authentication),
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(store.load_checkpoint().await.unwrap(), SyncCheckpoint::default());
    }

    #[tokio::test]
    async fn test_one_failing_target_gives_partial_success() {
        let store = Arc::new(FlakyStore::new(store().await, ["invoice-2"]));
        let gateway = Arc::new(FakeMailGateway::returning(
            vec![
                canonical("receipt-1").with_subject("Receipt"),
                canonical("invoice-2").with_subject("Invoice"),
                canonical("meeting-3").with_subject("Meeting"),
            ],
            None,
        ));
        let targets = vec![
            subject_target("receipts", "receipt"),
            subject_target("invoices", "invoice"),
            subject_target("meetings", "meeting"),
        ];
        let sync = SyncOrchestrator::new(gateway, store.clone(), targets);

        match sync.sync().await {
            SyncResult::PartialSuccess {
                fetched,
                processed,
                errors,
                error_messages,
            } => {
                assert_eq!(fetched, 3);
                assert_eq!(processed, 2);
                assert_eq!(errors, 1);
                assert_eq!(error_messages.len(), 1);
                assert!(error_messages[0].starts_with("Target 'invoices'"));
            }
            other => panic!("expected partial success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_all_targets_failing_is_failure() {
        let store = Arc::new(FlakyStore::new(store().await, ["a", "b"]));
        let gateway = Arc::new(FakeMailGateway::returning(
            vec![
                canonical("a").with_subject("alpha"),
                canonical("b").with_subject("beta"),
            ],
            None,
        ));
        let targets = vec![subject_target("alpha", "alpha"), subject_target("beta", "beta")];
        let sync = SyncOrchestrator::new(gateway, store, targets);

        match sync.sync().await {
            SyncResult::Failure(e) => {
                assert_eq!(e.kind, ErrorKind::Database);
                assert!(e.message.starts_with("All targets failed to sync"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_insert_keeps_cursor_so_retry_refetches() {
        let healthy = store().await;
        let mailbox = Arc::new(CursorMailbox::new(vec![canonical("a"), canonical("b")]));

        let failing = SyncOrchestrator::new(
            mailbox.clone(),
            Arc::new(FlakyStore::new(healthy.clone(), ["a"])),
            Vec::new(),
        );
        assert!(matches!(failing.sync().await, SyncResult::Failure(_)));
        assert_eq!(healthy.load_checkpoint().await.unwrap(), SyncCheckpoint::default());

        // Once the store recovers, the same messages are offered again
        let retry = SyncOrchestrator::new(mailbox, healthy.clone(), Vec::new());
        assert!(matches!(
            retry.sync().await,
            SyncResult::Success { fetched: 2, processed: 2, errors: 0 }
        ));
        assert_eq!(healthy.stats().await.unwrap().total, 2);
        assert_eq!(
            healthy.load_checkpoint().await.unwrap().cursor.as_deref(),
            Some("2")
        );

        assert!(matches!(
            retry.sync().await,
            SyncResult::Success { fetched: 0, processed: 0, errors: 0 }
        ));
    }

    #[tokio::test]
    async fn test_partial_success_keeps_cursor_for_failed_target() {
        let healthy = store().await;
        let mailbox = Arc::new(CursorMailbox::new(vec![
            canonical("r1").with_subject("Receipt"),
            canonical("i1").with_subject("Invoice"),
        ]));
        let targets = || {
            vec![
                subject_target("receipts", "receipt"),
                subject_target("invoices", "invoice"),
            ]
        };

        let flaky = SyncOrchestrator::new(
            mailbox.clone(),
            Arc::new(FlakyStore::new(healthy.clone(), ["i1"])),
            targets(),
        );
        assert!(matches!(
            flaky.sync().await,
            SyncResult::PartialSuccess { processed: 1, errors: 1, .. }
        ));
        assert_eq!(healthy.load_checkpoint().await.unwrap().cursor, None);

        let recovered = SyncOrchestrator::new(mailbox, healthy.clone(), targets());
        assert!(matches!(
            recovered.sync().await,
            SyncResult::Success { fetched: 2, processed: 1, errors: 0 }
        ));
        assert!(healthy.exists_by_provider_id("i1").await.unwrap());
        assert_eq!(healthy.stats().await.unwrap().total, 2);
    }

    #[tokio::test]
    async fn test_overlapping_targets_store_message_once() {
        let store = store().await;
        let gateway = Arc::new(FakeMailGateway::returning(
            vec![canonical("x").with_subject("Invoice receipt")],
            None,
        ));
        let targets = vec![
            subject_target("invoices", "invoice"),
            subject_target("receipts", "receipt"),
        ];
        let sync = SyncOrchestrator::new(gateway, store.clone(), targets);

        assert!(matches!(
            sync.sync().await,
            SyncResult::Success { fetched: 1, processed: 1, errors: 0 }
        ));
        assert_eq!(store.stats().await.unwrap().total, 1);
    }

    #[test]
    fn test_aggregate_three_way() {
        let ok = || Ok::<usize, ProcessingError>(1);
        let err = || Err::<usize, _>(ProcessingError::new(ErrorKind::Database, "disk full"));

        assert!(matches!(
            aggregate_targets(3, vec![("1", ok()), ("2", ok()), ("3", ok())]),
            SyncResult::Success { processed: 3, .. }
        ));
        assert!(matches!(
            aggregate_targets(3, vec![("1", ok()), ("2", err()), ("3", ok())]),
            SyncResult::PartialSuccess { processed: 2, errors: 1, .. }
        ));
        assert!(matches!(
            aggregate_targets(3, vec![("1", err()), ("2", err())]),
            SyncResult::Failure(_)
        ));
    }

    #[test]
    fn test_total_failure_keeps_shared_kind() {
        let fail = |kind| Err::<usize, _>(ProcessingError::new(kind, "unreachable"));

        match aggregate_targets(2, vec![("1", fail(ErrorKind::Network)), ("2", fail(ErrorKind::Network))]) {
            SyncResult::Failure(e) => assert_eq!(e.kind, ErrorKind::Network),
            other => panic!("expected failure, got {:?}", other),
        }
        match aggregate_targets(2, vec![("1", fail(ErrorKind::Network)), ("2", fail(ErrorKind::Parsing))]) {
            SyncResult::Failure(e) => assert_eq!(e.kind, ErrorKind::Database),
            other => panic!("expected failure, got {:?}", other),
        }
    }
}
