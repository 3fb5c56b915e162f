use axum::{extract::State, Json};
use serde::Serialize;
use utoipa::ToSchema;

use crate::store::{StatsSnapshot, VehicleFilter, VehicleStatus};
use crate::web::api::error::{ApiResult, ErrorResponse};
use crate::web::auth::{require_permission, AppState, Caller};
use crate::web::config::Permission;

#[derive(Debug, Default, Serialize, ToSchema)]
pub struct VehicleCounts {
    pub active: usize,
    pub idle: usize,
    pub offline: usize,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub reports: StatsSnapshot,
    pub vehicles: VehicleCounts,
    pub subscribers: usize,
    pub routes: usize,
}

#[utoipa::path(
    get,
    path = "/stats",
    security(
        ("api_key" = [])
    ),
    responses(
        (status = 200, description = "Ingestion and fleet counters", body = StatsResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    ),
    tag = "stats"
)]
pub async fn stats(State(state): State<AppState>, caller: Caller) -> ApiResult<Json<StatsResponse>> {
    require_permission(&caller, Permission::ReadLocations)?;

    let mut vehicles = VehicleCounts::default();
    for vehicle in state.fleet.store.snapshot(&VehicleFilter::All) {
        match vehicle.status {
            VehicleStatus::Active => vehicles.active += 1,
            VehicleStatus::Idle => vehicles.idle += 1,
            VehicleStatus::Offline => vehicles.offline += 1,
        }
    }

    Ok(Json(StatsResponse {
        reports: state.fleet.store.stats().snapshot(),
        vehicles,
        subscribers: state.fleet.broadcaster.active_subscribers(),
        routes: state.fleet.catalog.len(),
    }))
}
