// src/agent/job.rs
// AgentJob record and the job store - source of truth for status polling.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::Value;

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Processing,
    Completed,
    Failed,
    RateLimited,
}

/// A single agent research job. Created when a request is admitted, mutated
/// only by the engine task that owns it and by the reaper, never destroyed
/// (the store applies an implementation-defined retention for finished jobs).
#[derive(Debug, Clone)]
pub struct AgentJob {
    pub id: String,
    pub status: JobStatus,
    pub prompt: String,
    pub urls: Vec<String>,
    pub schema: Option<Value>,
    pub model: String,
    pub created_at_ms: u64,
    pub completed_at_ms: Option<u64>,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub progress: Option<String>,
    pub identity: String,
}

impl AgentJob {
    pub fn new(
        id: String,
        prompt: String,
        urls: Vec<String>,
        schema: Option<Value>,
        model: String,
        identity: String,
    ) -> Self {
        Self {
            id,
            status: JobStatus::Processing,
            prompt,
            urls,
            schema,
            model,
            created_at_ms: now_ms(),
            completed_at_ms: None,
            result: None,
            error: None,
            progress: None,
            identity,
        }
    }

    pub fn duration_s(&self) -> Option<f64> {
        self.completed_at_ms
            .map(|done| (done.saturating_sub(self.created_at_ms)) as f64 / 1000.0)
    }
}

/// A job record plus a one-shot "already finalized" flag so both the session
/// task and the reaper can race to finish the same job without double-releasing
/// its concurrency slot.
struct JobRecord {
    job: AgentJob,
    finalized: bool,
}

#[derive(Clone, Default)]
pub struct AgentJobStore {
    jobs: Arc<Mutex<HashMap<String, JobRecord>>>,
}

impl AgentJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, job: AgentJob) {
        let Ok(mut jobs) = self.jobs.lock() else {
            return;
        };
        jobs.insert(
            job.id.clone(),
            JobRecord {
                job,
                finalized: false,
            },
        );
    }

    pub fn get(&self, id: &str) -> Option<AgentJob> {
        self.jobs.lock().ok()?.get(id).map(|r| r.job.clone())
    }

    pub fn set_progress(&self, id: &str, progress: String) {
        if let Ok(mut jobs) = self.jobs.lock()
            && let Some(r) = jobs.get_mut(id)
        {
            r.job.progress = Some(progress);
        }
    }

    /// Marks the job completed. No-op if it was already finalized by the reaper.
    pub fn complete(&self, id: &str, result: Value) {
        if let Ok(mut jobs) = self.jobs.lock()
            && let Some(r) = jobs.get_mut(id)
            && !r.finalized
        {
            r.finalized = true;
            r.job.status = JobStatus::Completed;
            r.job.result = Some(result);
            r.job.completed_at_ms = Some(now_ms());
        }
    }

    /// Marks the job failed. No-op if it was already finalized by the reaper.
    pub fn fail(&self, id: &str, error: String) {
        if let Ok(mut jobs) = self.jobs.lock()
            && let Some(r) = jobs.get_mut(id)
            && !r.finalized
        {
            r.finalized = true;
            r.job.status = JobStatus::Failed;
            r.job.error = Some(error);
            r.job.completed_at_ms = Some(now_ms());
        }
    }

    /// Finds jobs stuck `processing` past `timeout_ms` and finalizes them as
    /// failed, returning the identities whose slot the caller must release.
    ///
    /// Only jobs this call is first to finalize are returned — if the session
    /// task already completed/failed the job, it is skipped.
    pub fn reap_stale(&self, timeout_ms: u64) -> Vec<(String, String)> {
        let now = now_ms();
        let Ok(mut jobs) = self.jobs.lock() else {
            return Vec::new();
        };
        let mut released = Vec::new();
        for r in jobs.values_mut() {
            if r.job.status == JobStatus::Processing
                && now.saturating_sub(r.job.created_at_ms) > timeout_ms
                && !r.finalized
            {
                r.finalized = true;
                r.job.status = JobStatus::Failed;
                r.job.error = Some(format!(
                    "Job timed out after {}s without completing.",
                    timeout_ms / 1000
                ));
                r.job.completed_at_ms = Some(now);
                released.push((r.job.id.clone(), r.job.identity.clone()));
            }
        }
        released
    }

    /// Drops completed/failed jobs older than `retention_ms` to bound memory
    /// growth in long-running processes.
    pub fn evict_expired(&self, retention_ms: u64) {
        let now = now_ms();
        if let Ok(mut jobs) = self.jobs.lock() {
            jobs.retain(|_, r| match r.job.completed_at_ms {
                Some(done) => now.saturating_sub(done) < retention_ms,
                None => true,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_job(id: &str, identity: &str) -> AgentJob {
        AgentJob::new(
            id.to_string(),
            "prompt".to_string(),
            vec![],
            None,
            "gpt-4.1".to_string(),
            identity.to_string(),
        )
    }

    #[test]
    fn scenario_7_reap_only_stale_jobs() {
        let store = AgentJobStore::new();
        let mut old = sample_job("old", "U");
        old.created_at_ms = now_ms().saturating_sub(10_000);
        let new = sample_job("new", "U");
        store.insert(old);
        store.insert(new);

        let released = store.reap_stale(5_000);
        let ids: Vec<_> = released.into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["old".to_string()]);
        assert_eq!(store.get("new").unwrap().status, JobStatus::Processing);
    }

    #[test]
    fn complete_then_reap_does_not_double_finalize() {
        let store = AgentJobStore::new();
        let mut job = sample_job("j1", "U");
        job.created_at_ms = now_ms().saturating_sub(10_000);
        store.insert(job);

        store.complete("j1", serde_json::json!({"success": true}));
        let released = store.reap_stale(5_000);
        assert!(released.is_empty());
        assert_eq!(store.get("j1").unwrap().status, JobStatus::Completed);
    }

    #[test]
    fn get_on_missing_job_returns_none() {
        let store = AgentJobStore::new();
        assert!(store.get("nope").is_none());
    }

    #[test]
    fn evict_expired_drops_old_completed_jobs_only() {
        let store = AgentJobStore::new();
        let mut job = sample_job("done", "U");
        job.created_at_ms = 0;
        store.insert(job);
        store.complete("done", serde_json::json!({}));
        if let Ok(mut jobs) = store.jobs.lock() {
            jobs.get_mut("done").unwrap().job.completed_at_ms = Some(0);
        }
        store.insert(sample_job("still-running", "U"));

        store.evict_expired(1);
        assert!(store.get("done").is_none());
        assert!(store.get("still-running").is_some());
    }
}
