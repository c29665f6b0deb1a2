// src/admission/quota.rs
// Proactive quota tracking fed by asynchronous usage snapshots from the agent runtime.

use std::collections::HashMap;

use super::{now_ms, AdmissionDecision};

const STALE_GRACE_MS: u64 = 5 * 60 * 1000;
const GC_RETENTION_MS: u64 = 30 * 60 * 1000;

/// Most recent upstream quota snapshot known for one identity.
#[derive(Debug, Clone)]
pub struct QuotaSnapshot {
    pub remaining_percent: f64,
    pub used_requests: u64,
    pub entitlement_requests: i64,
    pub is_unlimited: bool,
    pub reset_date: Option<String>,
    pub last_updated_ms: u64,
}

impl Default for QuotaSnapshot {
    fn default() -> Self {
        Self {
            remaining_percent: 100.0,
            used_requests: 0,
            entitlement_requests: -1,
            is_unlimited: false,
            reset_date: None,
            last_updated_ms: 0,
        }
    }
}

/// A partial update; `None` fields retain the prior stored value.
#[derive(Debug, Clone, Default)]
pub struct QuotaUpdate {
    pub remaining_percent: Option<f64>,
    pub used_requests: Option<u64>,
    pub entitlement_requests: Option<i64>,
    pub is_unlimited: Option<bool>,
    pub reset_date: Option<String>,
}

#[derive(Debug, Default)]
pub struct QuotaMonitor {
    records: HashMap<String, QuotaSnapshot>,
}

impl QuotaMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges `update` into the stored record, creating one with defaults
    /// first if none exists.
    pub fn update(&mut self, identity: &str, update: QuotaUpdate) {
        let entry = self.records.entry(identity.to_string()).or_default();
        if let Some(v) = update.remaining_percent {
            entry.remaining_percent = v;
        }
        if let Some(v) = update.used_requests {
            entry.used_requests = v;
        }
        if let Some(v) = update.entitlement_requests {
            entry.entitlement_requests = v;
        }
        if let Some(v) = update.is_unlimited {
            entry.is_unlimited = v;
        }
        if update.reset_date.is_some() {
            entry.reset_date = update.reset_date;
        }
        entry.last_updated_ms = now_ms();
    }

    pub fn check(&self, identity: &str, threshold_percent: f64) -> AdmissionDecision {
        let Some(record) = self.records.get(identity) else {
            return AdmissionDecision::allowed();
        };
        if record.is_unlimited {
            return AdmissionDecision::allowed();
        }
        let age_ms = now_ms().saturating_sub(record.last_updated_ms);
        if age_ms > STALE_GRACE_MS {
            return AdmissionDecision::allowed();
        }
        if record.remaining_percent > threshold_percent {
            return AdmissionDecision::allowed();
        }

        let mut reason = format!(
            "quota nearly exhausted: {:.1}% remaining (used {} of {})",
            record.remaining_percent,
            record.used_requests,
            if record.entitlement_requests < 0 {
                "unlimited".to_string()
            } else {
                record.entitlement_requests.to_string()
            }
        );
        if let Some(reset) = &record.reset_date {
            reason.push_str(&format!(", resets {reset}"));
        }
        AdmissionDecision::rejected_no_retry(reason)
    }

    pub fn gc(&mut self) {
        let now = now_ms();
        self.records
            .retain(|_, r| now.saturating_sub(r.last_updated_ms) < GC_RETENTION_MS);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_3_quota_nearly_exhausted() {
        let mut q = QuotaMonitor::new();
        q.update(
            "U",
            QuotaUpdate {
                remaining_percent: Some(5.0),
                is_unlimited: Some(false),
                ..Default::default()
            },
        );
        let d = q.check("U", 10.0);
        assert!(!d.allowed);
        assert!(d.reason.unwrap().contains("quota nearly exhausted"));
    }

    #[test]
    fn unlimited_identities_never_rejected() {
        let mut q = QuotaMonitor::new();
        q.update(
            "U",
            QuotaUpdate {
                remaining_percent: Some(0.0),
                is_unlimited: Some(true),
                ..Default::default()
            },
        );
        assert!(q.check("U", 50.0).allowed);
    }

    #[test]
    fn unknown_identity_is_allowed() {
        let q = QuotaMonitor::new();
        assert!(q.check("stranger", 10.0).allowed);
    }

    #[test]
    fn partial_update_preserves_prior_fields() {
        let mut q = QuotaMonitor::new();
        q.update(
            "U",
            QuotaUpdate {
                remaining_percent: Some(42.0),
                used_requests: Some(7),
                ..Default::default()
            },
        );
        q.update(
            "U",
            QuotaUpdate {
                used_requests: Some(8),
                ..Default::default()
            },
        );
        let record = q.records.get("U").unwrap();
        assert_eq!(record.remaining_percent, 42.0);
        assert_eq!(record.used_requests, 8);
    }

    #[test]
    fn gc_drops_entries_older_than_thirty_minutes() {
        let mut q = QuotaMonitor::new();
        q.update("U", QuotaUpdate::default());
        q.records.get_mut("U").unwrap().last_updated_ms = 0;
        q.gc();
        assert!(q.records.get("U").is_none());
    }
}
