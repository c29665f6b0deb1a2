// src/admission/guard.rs
// Facade composing concurrency, rate-limit, and quota state behind one lock.

use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use super::concurrency::{ConcurrencyStats, ConcurrencyTracker};
use super::quota::{QuotaMonitor, QuotaUpdate};
use super::rate_limiter::SlidingWindowRateLimiter;
use super::AdmissionDecision;
use crate::config::RateLimitConfig;

struct GuardInner {
    concurrency: ConcurrencyTracker,
    rate_limiter: SlidingWindowRateLimiter,
    quota: QuotaMonitor,
}

#[derive(Debug, Clone)]
pub struct GuardStats {
    pub concurrency: ConcurrencyStats,
    pub max_global_concurrency: u64,
    pub max_per_user_concurrency: u64,
    pub window_ms: u64,
    pub max_global_per_window: u64,
    pub max_per_user_per_window: u64,
    pub quota_reject_threshold_percent: f64,
}

/// Single-lock facade over `ConcurrencyTracker`, `SlidingWindowRateLimiter`,
/// and `QuotaMonitor`. Owns the periodic GC task.
///
/// `check` followed by `acquire` must be serialized against other
/// `check`/`acquire` pairs so two concurrent admissions can't both observe
/// "allowed" when only one slot is free — one lock covering all three
/// sub-components gives us that for free.
#[derive(Clone)]
pub struct RateLimitGuard {
    inner: Arc<Mutex<GuardInner>>,
    config: Arc<RateLimitConfig>,
    gc_task: Arc<Mutex<Option<tokio::task::JoinHandle<()>>>>,
}

impl RateLimitGuard {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(GuardInner {
                concurrency: ConcurrencyTracker::new(),
                rate_limiter: SlidingWindowRateLimiter::new(),
                quota: QuotaMonitor::new(),
            })),
            config: Arc::new(config),
            gc_task: Arc::new(Mutex::new(None)),
        }
    }

    /// Evaluates concurrency, then sliding-window, then quota, in that fixed
    /// order (concurrency is cheapest; quota's reason is the most informative
    /// so it goes last).
    pub fn check(&self, identity: &str) -> AdmissionDecision {
        let Ok(mut inner) = self.inner.lock() else {
            return AdmissionDecision::allowed();
        };

        let decision = inner.concurrency.can_acquire(
            identity,
            self.config.max_global_concurrency,
            self.config.max_per_user_concurrency,
        );
        if !decision.allowed {
            return decision;
        }

        let decision = inner.rate_limiter.check(
            identity,
            self.config.window_ms,
            self.config.max_global_per_window,
            self.config.max_per_user_per_window,
        );
        if !decision.allowed {
            return decision;
        }

        inner
            .quota
            .check(identity, self.config.quota_reject_threshold_percent)
    }

    /// Atomically acquires a concurrency slot and records the rate-limit
    /// admission. Callers must have called `check` first.
    pub fn acquire(&self, identity: &str) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        inner.concurrency.acquire(identity);
        inner.rate_limiter.record(identity);
    }

    /// Releases the concurrency slot only; rate-limit timestamps persist
    /// until they age out naturally.
    pub fn release(&self, identity: &str) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        inner.concurrency.release(identity);
    }

    pub fn quota_update(&self, identity: &str, update: QuotaUpdate) {
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        inner.quota.update(identity, update);
    }

    pub fn gc_interval_ms(&self) -> u64 {
        self.config.gc_interval_ms
    }

    pub fn stale_job_timeout_ms(&self) -> u64 {
        self.config.stale_job_timeout_ms
    }

    pub fn stats(&self) -> GuardStats {
        let concurrency = self
            .inner
            .lock()
            .map(|inner| inner.concurrency.stats())
            .unwrap_or_default();
        GuardStats {
            concurrency,
            max_global_concurrency: self.config.max_global_concurrency,
            max_per_user_concurrency: self.config.max_per_user_concurrency,
            window_ms: self.config.window_ms,
            max_global_per_window: self.config.max_global_per_window,
            max_per_user_per_window: self.config.max_per_user_per_window,
            quota_reject_threshold_percent: self.config.quota_reject_threshold_percent,
        }
    }

    /// Spawns the periodic GC task. The task tolerates being cancelled
    /// mid-tick and never blocks process exit.
    pub fn spawn_gc_task(self) -> Self {
        let guard = self.clone();
        let interval_ms = self.config.gc_interval_ms;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_millis(interval_ms));
            loop {
                ticker.tick().await;
                guard.run_gc();
            }
        });
        if let Ok(mut slot) = self.gc_task.lock() {
            *slot = Some(handle);
        }
        self
    }

    fn run_gc(&self) {
        let Ok(mut inner) = self.inner.lock() else {
            warn!("rate limit guard mutex poisoned, skipping GC tick");
            return;
        };
        inner.rate_limiter.gc(self.config.window_ms);
        inner.quota.gc();
        debug!("admission GC tick complete");
    }

    /// Cancels the internal GC timer.
    pub fn shutdown(&self) {
        if let Ok(mut slot) = self.gc_task.lock()
            && let Some(handle) = slot.take()
        {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> RateLimitConfig {
        RateLimitConfig {
            max_global_concurrency: 3,
            max_per_user_concurrency: 2,
            window_ms: 60_000,
            max_global_per_window: 1_000,
            max_per_user_per_window: 1_000,
            quota_reject_threshold_percent: 10.0,
            stale_job_timeout_ms: 300_000,
            gc_interval_ms: 30_000,
        }
    }

    #[test]
    fn check_then_acquire_then_release_round_trips() {
        let guard = RateLimitGuard::new(test_config());
        assert!(guard.check("A").allowed);
        guard.acquire("A");
        assert_eq!(guard.stats().concurrency.global_active, 1);
        guard.release("A");
        assert_eq!(guard.stats().concurrency.global_active, 0);
    }

    #[test]
    fn quota_rejection_surfaces_through_check() {
        let guard = RateLimitGuard::new(test_config());
        guard.quota_update(
            "A",
            QuotaUpdate {
                remaining_percent: Some(1.0),
                is_unlimited: Some(false),
                ..Default::default()
            },
        );
        let d = guard.check("A");
        assert!(!d.allowed);
    }

    #[test]
    fn shutdown_is_idempotent_without_a_spawned_task() {
        let guard = RateLimitGuard::new(test_config());
        guard.shutdown();
        guard.shutdown();
    }
}
