// src/admission/concurrency.rs
// Per-identity and global in-flight job counting.

use std::collections::HashMap;

use super::AdmissionDecision;

/// Tracks how many agent jobs are currently in flight, globally and per identity.
///
/// Invariant: the sum of all per-identity counts equals `global_active`.
#[derive(Debug, Default)]
pub struct ConcurrencyTracker {
    global_active: u64,
    per_identity: HashMap<String, u64>,
}

#[derive(Debug, Clone, Default)]
pub struct ConcurrencyStats {
    pub global_active: u64,
    pub per_identity: HashMap<String, u64>,
}

impl ConcurrencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn can_acquire(
        &self,
        identity: &str,
        max_global: u64,
        max_per_user: u64,
    ) -> AdmissionDecision {
        if self.global_active >= max_global {
            return AdmissionDecision::rejected(
                "server at maximum capacity, retry in ~10s".to_string(),
                10,
            );
        }
        let current = self.per_identity.get(identity).copied().unwrap_or(0);
        if current >= max_per_user {
            return AdmissionDecision::rejected(
                format!(
                    "you already hold {current} concurrent agent jobs (max {max_per_user}), retry in ~15s"
                ),
                15,
            );
        }
        AdmissionDecision::allowed()
    }

    /// Callers MUST call `can_acquire` first; calling this without a passed
    /// check is a contract violation but never panics or corrupts state.
    pub fn acquire(&mut self, identity: &str) {
        self.global_active += 1;
        *self.per_identity.entry(identity.to_string()).or_insert(0) += 1;
    }

    /// Saturating decrement; removes the identity once its count reaches zero.
    pub fn release(&mut self, identity: &str) {
        self.global_active = self.global_active.saturating_sub(1);
        if let Some(count) = self.per_identity.get_mut(identity) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.per_identity.remove(identity);
            }
        }
    }

    pub fn stats(&self) -> ConcurrencyStats {
        ConcurrencyStats {
            global_active: self.global_active,
            per_identity: self.per_identity.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_1_concurrency_capacity() {
        let mut t = ConcurrencyTracker::new();
        let max_global = 3;
        let max_per_user = 2;

        t.acquire("A");
        t.acquire("A");
        let d = t.can_acquire("A", max_global, max_per_user);
        assert!(!d.allowed);
        assert!(d.reason.unwrap().contains("concurrent agent jobs"));

        let d = t.can_acquire("B", max_global, max_per_user);
        assert!(d.allowed);

        t.acquire("B");
        t.acquire("C");
        let d = t.can_acquire("D", max_global, max_per_user);
        assert!(!d.allowed);
        assert!(d.reason.unwrap().contains("maximum capacity"));
    }

    #[test]
    fn release_is_saturating_and_never_negative() {
        let mut t = ConcurrencyTracker::new();
        t.release("nobody");
        assert_eq!(t.stats().global_active, 0);
    }

    #[test]
    fn release_removes_identity_entry_at_zero() {
        let mut t = ConcurrencyTracker::new();
        t.acquire("A");
        t.release("A");
        assert!(!t.stats().per_identity.contains_key("A"));
        assert_eq!(t.stats().global_active, 0);
    }

    #[test]
    fn concurrency_rejections_never_mutate_state() {
        let mut t = ConcurrencyTracker::new();
        t.acquire("A");
        let before = t.stats();
        let _ = t.can_acquire("A", 1, 1);
        let after = t.stats();
        assert_eq!(before.global_active, after.global_active);
    }
}
