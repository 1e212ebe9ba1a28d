//! List name to backend id resolution.
//!
//! Created lists are recorded in a [`ListDirectory`] so a list is created once,
//! not once per process or cache eviction. The moka cache only saves the
//! directory round trip.

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};

use super::TodoList;
use crate::constants::LIST_CACHE_MAX_CAPACITY;
use crate::store::ListDirectory;

pub struct ListResolver {
    directory: Arc<dyn ListDirectory>,
    cache: moka::future::Cache<String, String>,
}

impl ListResolver {
    pub fn new(directory: Arc<dyn ListDirectory>) -> Self {
        Self {
            directory,
            cache: moka::future::Cache::builder()
                .max_capacity(LIST_CACHE_MAX_CAPACITY)
                .build(),
        }
    }

    /// Id of the list called `name`, running `create` only if no list of that
    /// name was created before.
    pub async fn resolve<F, Fut>(&self, name: &str, create: F) -> Result<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<TodoList>>,
    {
        if let Some(id) = self.cache.get(name).await {
            return Ok(id);
        }

        let known = self
            .directory
            .list_id(name)
            .await
            .context("Failed to look up to-do list")?;
        let id = match known {
            Some(id) => id,
            None => {
                let list = create().await?;
                tracing::info!(
                    "Created to-do list '{}' ({})",
                    name,
                    list.url.as_deref().unwrap_or(&list.id)
                );
                self.directory
                    .save_list_id(name, &list.id)
                    .await
                    .context("Failed to record created to-do list")?;
                // Another writer may have recorded the name first
                self.directory.list_id(name).await?.unwrap_or(list.id)
            }
        };

        self.cache.insert(name.to_string(), id.clone()).await;
        Ok(id)
    }

    #[cfg(test)]
    async fn forget_cached(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SqliteStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn created(calls: &AtomicUsize, id: &str) -> Result<TodoList> {
        calls.fetch_add(1, Ordering::SeqCst);
        Ok(TodoList {
            id: id.to_string(),
            url: None,
        })
    }

    #[tokio::test]
    async fn test_list_is_created_once_across_evictions_and_restarts() {
        let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
        let calls = AtomicUsize::new(0);

        let resolver = ListResolver::new(store.clone());
        assert_eq!(resolver.resolve("inbox", || created(&calls, "L1")).await.unwrap(), "L1");
        assert_eq!(resolver.resolve("inbox", || created(&calls, "L2")).await.unwrap(), "L1");

        resolver.forget_cached().await;
        assert_eq!(resolver.resolve("inbox", || created(&calls, "L3")).await.unwrap(), "L1");

        // A fresh resolver over the same store stands in for a restart
        let restarted = ListResolver::new(store);
        assert_eq!(restarted.resolve("inbox", || created(&calls, "L4")).await.unwrap(), "L1");

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_creation_is_not_remembered() {
        let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
        let resolver = ListResolver::new(store.clone());

        let err = resolver
            .resolve("work", || async { Err::<TodoList, _>(anyhow::anyhow!("backend down")) })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("backend down"));
        assert_eq!(store.list_id("work").await.unwrap(), None);

        let calls = AtomicUsize::new(0);
        assert_eq!(resolver.resolve("work", || created(&calls, "W1")).await.unwrap(), "W1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
