// src/admission/mod.rs
// Unified admission gate: concurrency, sliding-window rate limiting, and quota.

mod concurrency;
mod guard;
mod quota;
mod rate_limiter;

pub use concurrency::{ConcurrencyStats, ConcurrencyTracker};
pub use guard::{GuardStats, RateLimitGuard};
pub use quota::{QuotaMonitor, QuotaSnapshot, QuotaUpdate};
pub use rate_limiter::SlidingWindowRateLimiter;

/// Outcome of a `can_acquire`/`check` call, shared by all three sub-components.
#[derive(Debug, Clone, PartialEq)]
pub struct AdmissionDecision {
    pub allowed: bool,
    pub reason: Option<String>,
    pub retry_after_s: Option<u64>,
}

impl AdmissionDecision {
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            reason: None,
            retry_after_s: None,
        }
    }

    pub fn rejected(reason: String, retry_after_s: u64) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
            retry_after_s: Some(retry_after_s.max(1)),
        }
    }

    pub fn rejected_no_retry(reason: String) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
            retry_after_s: None,
        }
    }
}

fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
