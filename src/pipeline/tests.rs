//! Whole-pipeline scenarios over the in-memory store.

use std::sync::Arc;

use super::testing::{FakeMailGateway, FakeTodoGateway, FakeTransport, canonical};
use super::*;
use crate::ai::{AiClient, GenerationConfig, JitterBand, RateLimiter};
use crate::store::{EmailStore, SqliteStore};

/// Messages whose reply is the no-task sentinel.
const NO_TASK: [usize; 3] = [2, 5, 8];

fn reply_for(prompt: &str) -> anyhow::Result<String> {
    let index = (0..10)
        .find(|i| prompt.contains(&format!("Email Subject: Message m{}\n", i)))
        .ok_or_else(|| anyhow::anyhow!("unexpected prompt"))?;
    if NO_TASK.contains(&index) {
        Ok("NONE".to_string())
    } else {
        Ok(format!("Task: Follow up on m{}", index))
    }
}

#[tokio::test]
async fn test_fetch_analyze_and_sync_ten_messages() {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let messages = (0..10)
        .map(|i| canonical(&format!("m{}", i)).received(1_700_000_000 + i))
        .collect();
    let gateway = Arc::new(FakeMailGateway::returning(messages, Some("9:10")));
    let transport = Arc::new(FakeTransport::answering(reply_for));
    let todos = Arc::new(FakeTodoGateway::rejecting(["Follow up on m4"]));

    let sync = SyncOrchestrator::new(gateway, store.clone(), Vec::new());
    let ai = AiClient::new(
        transport.clone(),
        Arc::new(RateLimiter::per_minute(100)),
        GenerationConfig::default(),
        JitterBand::none(),
    );
    let analysis = AnalysisOrchestrator::new(ai, store.clone());
    let todo_sync = TodoSyncOrchestrator::new(todos.clone(), store.clone());

    // Fetch: everything is new
    assert!(matches!(
        sync.sync().await,
        SyncResult::Success { fetched: 10, processed: 10, errors: 0 }
    ));

    // Analyze: "no task" replies count as successes
    let analyzed = match analysis.analyze_pending().await {
        Outcome::Success(batch) => batch,
        other => panic!("analysis failed: {:?}", other),
    };
    assert_eq!(analyzed.total, 10);
    assert_eq!(analyzed.successful, 10);
    assert_eq!(analyzed.failed, 0);
    assert_eq!(transport.calls(), 10);

    let mut with_todo = 0;
    for i in 0..10 {
        let message = store
            .get_by_provider_id(&format!("m{}", i))
            .await
            .unwrap()
            .unwrap();
        assert!(message.processed);
        if NO_TASK.contains(&(i as usize)) {
            assert_eq!(message.extracted_todo, None);
        } else {
            assert_eq!(
                message.extracted_todo,
                Some(format!("Follow up on m{}", i))
            );
            with_todo += 1;
        }
    }
    assert_eq!(with_todo, 7);

    // Sync: one delivery fails
    let synced = match todo_sync.sync_pending("inbox-test").await {
        Outcome::Success(batch) => batch,
        other => panic!("to-do sync failed: {:?}", other),
    };
    assert_eq!(synced.total, 7);
    assert_eq!(synced.successful, 6);
    assert_eq!(synced.failed, 1);
    assert_eq!(synced.skipped, 0);
    assert_eq!(todos.added().len(), 6);

    // The failed one stays pending for the next cycle
    let pending = store.unsynced_todos().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].provider_id, "m4");
}

#[tokio::test]
async fn test_second_cycle_is_a_no_op() {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let gateway = Arc::new(FakeMailGateway::returning(
        vec![canonical("m1"), canonical("m3")],
        Some("1:2"),
    ));
    let transport = Arc::new(FakeTransport::answering(reply_for));
    let todos = Arc::new(FakeTodoGateway::new());

    let sync = SyncOrchestrator::new(gateway, store.clone(), Vec::new());
    let ai = AiClient::new(
        transport.clone(),
        Arc::new(RateLimiter::per_minute(100)),
        GenerationConfig::default(),
        JitterBand::none(),
    );
    let analysis = AnalysisOrchestrator::new(ai, store.clone());
    let todo_sync = TodoSyncOrchestrator::new(todos.clone(), store.clone());

    for _ in 0..2 {
        sync.sync().await;
        analysis.analyze_pending().await;
        todo_sync.sync_pending("inbox-test").await;
    }

    assert_eq!(transport.calls(), 2);
    assert_eq!(todos.added().len(), 2);
    assert_eq!(store.stats().await.unwrap().todos_synced, 2);
}
