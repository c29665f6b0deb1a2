// src/agent/reaper.rs
// StaleJobReaper: periodic task that fails jobs stuck in `processing`.

use tracing::{info, warn};

use crate::admission::RateLimitGuard;

use super::job::AgentJobStore;

/// Finds jobs stuck `processing` beyond the configured timeout and finalizes
/// them as failed, releasing their admission slot exactly once. Races the
/// session task to finalize the same job; `AgentJobStore::reap_stale` only
/// reports jobs this call was first to finalize.
pub fn spawn(store: AgentJobStore, guard: RateLimitGuard, gc_interval_ms: u64, stale_job_timeout_ms: u64) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_millis(gc_interval_ms));
        loop {
            ticker.tick().await;
            let released = store.reap_stale(stale_job_timeout_ms);
            for (job_id, identity) in released {
                warn!(job_id, "stale agent job timed out, releasing slot");
                guard.release(&identity);
            }
        }
    });
    info!("stale job reaper started");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::job::AgentJob;
    use crate::config::RateLimitConfig;

    fn test_config() -> RateLimitConfig {
        RateLimitConfig {
            max_global_concurrency: 10,
            max_per_user_concurrency: 10,
            window_ms: 60_000,
            max_global_per_window: 1_000,
            max_per_user_per_window: 1_000,
            quota_reject_threshold_percent: 10.0,
            stale_job_timeout_ms: 5_000,
            gc_interval_ms: 20,
        }
    }

    #[tokio::test]
    async fn reaper_releases_exactly_one_slot_for_timed_out_job() {
        let store = AgentJobStore::new();
        let guard = RateLimitGuard::new(test_config());
        guard.acquire("U");
        assert_eq!(guard.stats().concurrency.global_active, 1);

        let mut job = AgentJob::new(
            "j1".to_string(),
            "p".to_string(),
            vec![],
            None,
            "gpt-4.1".to_string(),
            "U".to_string(),
        );
        job.created_at_ms = 0;
        store.insert(job);

        spawn(store.clone(), guard.clone(), 10, 1);
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        assert_eq!(guard.stats().concurrency.global_active, 0);
    }
}
