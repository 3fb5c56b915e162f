use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;

use super::filter::VehicleFilter;
use super::state::{ChangeKind, StateChange, VehicleState, VehicleStatus};
use super::stats::StoreStats;
use crate::eta::Estimator;
use crate::ingest::VehicleReport;

#[derive(Debug, Clone, Copy)]
pub struct StoreSettings {
    pub staleness_window: Duration,
    /// Below this speed a reporting vehicle is `idle` rather than `active`.
    pub idle_speed_kmh: f64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            staleness_window: Duration::seconds(120),
            idle_speed_kmh: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    Stale,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    Applied(VehicleState),
    Dropped(DropReason),
}

impl ApplyOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ApplyOutcome::Applied(_))
    }
}

type Slot = Arc<Mutex<Option<VehicleState>>>;

/// Latest state per vehicle. Each vehicle sits behind its own lock so
/// writers for different vehicles never wait on each other.
pub struct VehicleStore {
    slots: DashMap<String, Slot>,
    estimator: Arc<Estimator>,
    settings: StoreSettings,
    changes: mpsc::UnboundedSender<StateChange>,
    stats: StoreStats,
}

impl VehicleStore {
    pub fn new(
        settings: StoreSettings,
        estimator: Arc<Estimator>,
        changes: mpsc::UnboundedSender<StateChange>,
    ) -> Self {
        Self {
            slots: DashMap::new(),
            estimator,
            settings,
            changes,
            stats: StoreStats::default(),
        }
    }

    pub fn stats(&self) -> &StoreStats {
        &self.stats
    }

    /// Apply `report` if it is newer than what the vehicle already has.
    ///
    /// Position, route progress, ETA and status are replaced together, and
    /// the change event is emitted before the vehicle's lock is released.
    pub fn apply(&self, report: VehicleReport) -> ApplyOutcome {
        let slot = self.slot(&report.vehicle_id);
        let mut current = slot.lock();

        if let Some(state) = current.as_ref() {
            if report.source_timestamp <= state.last_report.source_timestamp {
                self.stats.record_stale();
                log::debug!(
                    "Dropping stale report for {} ({} <= {})",
                    report.vehicle_id,
                    report.source_timestamp,
                    state.last_report.source_timestamp
                );
                return ApplyOutcome::Dropped(DropReason::Stale);
            }
        }

        let estimate = self.estimator.estimate(current.as_ref(), &report);
        let status = if report.speed < self.settings.idle_speed_kmh {
            VehicleStatus::Idle
        } else {
            VehicleStatus::Active
        };
        let version = current.as_ref().map_or(1, |s| s.version + 1);

        let next = VehicleState {
            vehicle_id: report.vehicle_id.clone(),
            route_id: estimate.route_id,
            trip_id: estimate.trip_id,
            last_known_stop_index: estimate.stop_index,
            trip_complete: estimate.trip_complete,
            estimated_eta: estimate.eta,
            occupancy_level: estimate.occupancy_level,
            status,
            version,
            last_report: report,
        };

        *current = Some(next.clone());
        self.stats.record_applied();
        self.emit(ChangeKind::Report, next.clone());

        ApplyOutcome::Applied(next)
    }

    pub fn get(&self, vehicle_id: &str) -> Option<VehicleState> {
        let slot = self.slots.get(vehicle_id).map(|s| Arc::clone(s.value()))?;
        let state = slot.lock().clone();
        state
    }

    /// Current states matching `filter`, ordered by vehicle id.
    pub fn snapshot(&self, filter: &VehicleFilter) -> Vec<VehicleState> {
        if let VehicleFilter::Vehicle(id) = filter {
            return self.get(id).into_iter().collect();
        }

        let mut states: Vec<VehicleState> = self
            .slot_handles()
            .into_iter()
            .filter_map(|slot| slot.lock().clone())
            .filter(|state| filter.matches(state))
            .collect();
        states.sort_by(|a, b| a.vehicle_id.cmp(&b.vehicle_id));
        states
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Mark every vehicle silent for longer than the staleness window as
    /// offline. Returns how many vehicles changed.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let mut marked = 0;
        for slot in self.slot_handles() {
            let mut current = slot.lock();
            let Some(state) = current.as_mut() else {
                continue;
            };
            if state.status == VehicleStatus::Offline {
                continue;
            }
            if now - state.last_report.received_timestamp <= self.settings.staleness_window {
                continue;
            }

            state.status = VehicleStatus::Offline;
            state.estimated_eta = None;
            state.version += 1;
            let changed = state.clone();
            log::info!(
                "Vehicle {} offline, last report received {}",
                changed.vehicle_id,
                changed.last_report.received_timestamp
            );
            self.stats.record_offline();
            self.emit(ChangeKind::Offline, changed);
            marked += 1;
        }
        marked
    }

    fn slot(&self, vehicle_id: &str) -> Slot {
        if let Some(slot) = self.slots.get(vehicle_id) {
            return Arc::clone(slot.value());
        }
        Arc::clone(self.slots.entry(vehicle_id.to_string()).or_default().value())
    }

    // Clone the handles out so no map shard stays locked while a vehicle
    // lock is held.
    fn slot_handles(&self) -> Vec<Slot> {
        self.slots.iter().map(|s| Arc::clone(s.value())).collect()
    }

    fn emit(&self, kind: ChangeKind, state: VehicleState) {
        if self.changes.send(StateChange { kind, state }).is_err() {
            log::debug!("No broadcaster listening for state changes");
        }
    }
}
