use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::eta::{EtaEstimate, OccupancyLevel};
use crate::ingest::VehicleReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum VehicleStatus {
    Active,
    Idle,
    Offline,
}

/// Latest known state of one vehicle.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VehicleState {
    pub vehicle_id: String,
    pub last_report: VehicleReport,
    pub route_id: Option<String>,
    pub trip_id: Option<String>,
    /// Upcoming stop on the route; never decreases within a trip.
    pub last_known_stop_index: Option<usize>,
    pub trip_complete: bool,
    pub estimated_eta: Option<EtaEstimate>,
    pub occupancy_level: OccupancyLevel,
    pub status: VehicleStatus,
    /// Bumped on every change of this vehicle's state.
    pub version: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Report,
    Offline,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct StateChange {
    pub kind: ChangeKind,
    pub state: VehicleState,
}
