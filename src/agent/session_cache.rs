// src/agent/session_cache.rs
// Identity-keyed cache of runtime client handles with time-based eviction.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use moka::notification::RemovalCause;

use super::runtime::AgentRuntimeClient;

const IDLE_EVICTION: Duration = Duration::from_secs(30 * 60);

/// Caches one runtime client handle per identity. Entries idle for 30 minutes
/// are evicted; on eviction the handle is asked to shut down (errors ignored).
#[derive(Clone)]
pub struct AgentSessionClientCache {
    cache: Cache<String, Arc<dyn AgentRuntimeClient>>,
}

impl AgentSessionClientCache {
    pub fn new() -> Self {
        let cache = Cache::builder()
            .time_to_idle(IDLE_EVICTION)
            .async_eviction_listener(|_key: Arc<String>, client: Arc<dyn AgentRuntimeClient>, cause| {
                Box::pin(async move {
                    if cause != RemovalCause::Explicit {
                        client.shutdown().await;
                    }
                })
            })
            .build();
        Self { cache }
    }

    pub async fn get(&self, identity: &str) -> Option<Arc<dyn AgentRuntimeClient>> {
        self.cache.get(identity).await
    }

    pub async fn get_or_insert_with<F>(&self, identity: &str, init: F) -> Arc<dyn AgentRuntimeClient>
    where
        F: FnOnce() -> Arc<dyn AgentRuntimeClient>,
    {
        if let Some(existing) = self.cache.get(identity).await {
            return existing;
        }
        let client = init();
        self.cache.insert(identity.to_string(), client.clone()).await;
        client
    }

    /// Asks every cached client to shut down and clears the cache.
    pub async fn shutdown_all(&self) {
        for (_, client) in self.cache.iter() {
            client.shutdown().await;
        }
        self.cache.invalidate_all();
        self.cache.run_pending_tasks().await;
    }
}

impl Default for AgentSessionClientCache {
    fn default() -> Self {
        Self::new()
    }
}
