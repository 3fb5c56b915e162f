use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use utoipa::ToSchema;

use crate::eta::{EtaEstimate, OccupancyLevel, Route};
use crate::store::{VehicleFilter, VehicleStatus};
use crate::web::api::error::{ApiError, ApiResult, ErrorResponse};
use crate::web::auth::{require_permission, AppState, Caller};
use crate::web::config::Permission;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Arrival {
    pub vehicle_id: String,
    pub route_id: String,
    pub status: VehicleStatus,
    pub occupancy_level: OccupancyLevel,
    pub eta: EtaEstimate,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StopArrivals {
    pub stop_id: String,
    pub arrivals: Vec<Arrival>,
}

#[utoipa::path(
    get,
    path = "/routes",
    security(
        ("api_key" = [])
    ),
    responses(
        (status = 200, description = "All routes", body = Vec<Route>),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    ),
    tag = "routes"
)]
pub async fn list_routes(
    State(state): State<AppState>,
    caller: Caller,
) -> ApiResult<Json<Vec<Route>>> {
    require_permission(&caller, Permission::ReadLocations)?;
    let routes = state
        .fleet
        .catalog
        .routes()
        .iter()
        .map(|r| r.as_ref().clone())
        .collect();
    Ok(Json(routes))
}

#[utoipa::path(
    get,
    path = "/routes/{id}",
    params(
        ("id" = String, Path, description = "Route id")
    ),
    security(
        ("api_key" = [])
    ),
    responses(
        (status = 200, description = "Route with its stops", body = Route),
        (status = 404, description = "Unknown route", body = ErrorResponse)
    ),
    tag = "routes"
)]
pub async fn get_route(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Json<Route>> {
    require_permission(&caller, Permission::ReadLocations)?;
    let route = state
        .fleet
        .catalog
        .get(&id)
        .ok_or(ApiError::NotFound("unknown_route"))?;
    Ok(Json(route.as_ref().clone()))
}

#[utoipa::path(
    get,
    path = "/stops/{id}/arrivals",
    params(
        ("id" = String, Path, description = "Stop id")
    ),
    security(
        ("api_key" = [])
    ),
    responses(
        (status = 200, description = "Vehicles heading to the stop, soonest first", body = StopArrivals),
        (status = 404, description = "Unknown stop", body = ErrorResponse)
    ),
    tag = "routes"
)]
pub async fn stop_arrivals(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> ApiResult<Json<StopArrivals>> {
    require_permission(&caller, Permission::ReadLocations)?;

    let serving = state.fleet.catalog.routes_serving(&id);
    if serving.is_empty() {
        return Err(ApiError::NotFound("unknown_stop"));
    }

    let mut arrivals = Vec::new();
    for (route, stop_index) in serving {
        let vehicles = state
            .fleet
            .store
            .snapshot(&VehicleFilter::Route(route.id.clone()));
        for vehicle in vehicles {
            let Some(eta) = state.fleet.estimator.eta_to_stop(&vehicle, &route, stop_index) else {
                continue;
            };
            arrivals.push(Arrival {
                vehicle_id: vehicle.vehicle_id,
                route_id: route.id.clone(),
                status: vehicle.status,
                occupancy_level: vehicle.occupancy_level,
                eta,
            });
        }
    }
    arrivals.sort_by(|a, b| a.eta.eta_seconds.total_cmp(&b.eta.eta_seconds));

    Ok(Json(StopArrivals {
        stop_id: id,
        arrivals,
    }))
}
