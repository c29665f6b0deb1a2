// src/admission/rate_limiter.rs
// Sliding-window request admission limiter.

use std::collections::HashMap;

use super::{now_ms, AdmissionDecision};

/// Records per-identity and global admission timestamps and enforces a
/// sliding window limit on how many may occur within `window_ms`.
#[derive(Debug, Default)]
pub struct SlidingWindowRateLimiter {
    global: Vec<u64>,
    per_identity: HashMap<String, Vec<u64>>,
}

impl SlidingWindowRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prunes both sequences against `now - window_ms`, then checks the
    /// global limit before the per-identity limit.
    pub fn check(
        &mut self,
        identity: &str,
        window_ms: u64,
        max_global_per_window: u64,
        max_per_user_per_window: u64,
    ) -> AdmissionDecision {
        let now = now_ms();
        self.gc_with_now(now, window_ms);

        if self.global.len() as u64 >= max_global_per_window {
            let retry_after_s = retry_after_seconds(self.global.first().copied(), now, window_ms);
            return AdmissionDecision::rejected(
                "global request rate limit exceeded".to_string(),
                retry_after_s,
            );
        }

        let per_id = self.per_identity.get(identity);
        if per_id.map(|v| v.len() as u64).unwrap_or(0) >= max_per_user_per_window {
            let oldest = per_id.and_then(|v| v.first().copied());
            let retry_after_s = retry_after_seconds(oldest, now, window_ms);
            return AdmissionDecision::rejected(
                "per-identity request rate limit exceeded".to_string(),
                retry_after_s,
            );
        }

        AdmissionDecision::allowed()
    }

    /// Appends `now` to both sequences. Should follow a passed `check` in
    /// admission order (see the guard's atomicity contract).
    pub fn record(&mut self, identity: &str) {
        let now = now_ms();
        self.global.push(now);
        self.per_identity
            .entry(identity.to_string())
            .or_default()
            .push(now);
    }

    pub fn gc(&mut self, window_ms: u64) {
        self.gc_with_now(now_ms(), window_ms);
    }

    fn gc_with_now(&mut self, now: u64, window_ms: u64) {
        let cutoff = now.saturating_sub(window_ms);
        self.global.retain(|t| *t > cutoff);
        self.per_identity.retain(|_, v| {
            v.retain(|t| *t > cutoff);
            !v.is_empty()
        });
    }
}

fn retry_after_seconds(oldest: Option<u64>, now: u64, window_ms: u64) -> u64 {
    let oldest = match oldest {
        Some(o) => o,
        None => return 1,
    };
    let expires_at = oldest + window_ms;
    if expires_at <= now {
        1
    } else {
        ((expires_at - now) as f64 / 1000.0).ceil() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;
    use std::time::Duration;

    #[test]
    fn scenario_2_window_expiry() {
        let mut rl = SlidingWindowRateLimiter::new();
        let window_ms = 500;
        let max_per_window = 3;

        for _ in 0..3 {
            rl.record("U");
        }
        let d = rl.check("U", window_ms, 1_000_000, max_per_window);
        assert!(!d.allowed);

        sleep(Duration::from_millis(550));
        let d = rl.check("U", window_ms, 1_000_000, max_per_window);
        assert!(d.allowed);
    }

    #[test]
    fn rejection_includes_retry_after_at_least_one() {
        let mut rl = SlidingWindowRateLimiter::new();
        rl.record("U");
        let d = rl.check("U", 60_000, 1_000_000, 1);
        assert!(!d.allowed);
        assert!(d.retry_after_s.unwrap() >= 1);
    }

    #[test]
    fn gc_removes_stale_entries_and_empty_identities() {
        let mut rl = SlidingWindowRateLimiter::new();
        rl.record("U");
        // Force the entry to look stale by gc'ing with a window of 0ms after a sleep.
        sleep(Duration::from_millis(5));
        rl.gc(0);
        assert!(!rl.per_identity.contains_key("U"));
        assert!(rl.global.is_empty());
    }

    #[test]
    fn independent_identities_do_not_interfere() {
        let mut rl = SlidingWindowRateLimiter::new();
        rl.record("A");
        rl.record("A");
        let d = rl.check("B", 60_000, 1_000_000, 1);
        assert!(d.allowed);
    }
}
