use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Default)]
pub struct StoreStats {
    applied: AtomicU64,
    stale: AtomicU64,
    invalid: AtomicU64,
    offline: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub reports_applied: u64,
    pub reports_stale: u64,
    pub reports_invalid: u64,
    pub offline_transitions: u64,
}

impl StoreStats {
    pub fn record_applied(&self) {
        self.applied.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_stale(&self) {
        self.stale.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invalid(&self) {
        self.invalid.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_offline(&self) {
        self.offline.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            reports_applied: self.applied.load(Ordering::Relaxed),
            reports_stale: self.stale.load(Ordering::Relaxed),
            reports_invalid: self.invalid.load(Ordering::Relaxed),
            offline_transitions: self.offline.load(Ordering::Relaxed),
        }
    }
}
