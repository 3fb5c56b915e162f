use std::convert::Infallible;

use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    extract::{Query, State},
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    Json,
};
use futures_util::stream::{self, Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::IntoParams;

use crate::broadcast::{Delivery, VehicleFilter};
use crate::ingest::{Ack, LocationPayload};
use crate::store::VehicleState;
use crate::web::api::error::{ApiError, ApiResult, ErrorResponse};
use crate::web::auth::{require_permission, AppState, Caller};
use crate::web::config::Permission;

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct LocationsQuery {
    #[serde(alias = "busId")]
    pub vehicle_id: Option<String>,
    pub route_id: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct StreamQuery {
    /// `all`, `route:<id>` or `vehicle:<id>`
    pub filter: Option<String>,
}

#[utoipa::path(
    post,
    path = "/locations",
    request_body = LocationPayload,
    security(
        ("api_key" = [])
    ),
    responses(
        (status = 200, description = "Report accepted", body = Ack),
        (status = 400, description = "Invalid report", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    ),
    tag = "locations"
)]
pub async fn post_location(
    State(state): State<AppState>,
    caller: Caller,
    payload: Result<Json<LocationPayload>, JsonRejection>,
) -> ApiResult<Json<Ack>> {
    require_permission(&caller, Permission::ReportLocations)?;

    let Json(payload) = payload.map_err(|e| {
        state.fleet.store.stats().record_invalid();
        log::warn!("Rejected malformed location payload: {}", e.body_text());
        ApiError::from(e)
    })?;

    let ack = state.fleet.gateway.accept(payload)?;
    Ok(Json(ack))
}

#[utoipa::path(
    get,
    path = "/locations",
    params(LocationsQuery),
    security(
        ("api_key" = [])
    ),
    responses(
        (status = 200, description = "One vehicle when vehicleId is given, otherwise all matching vehicles", body = Vec<VehicleState>),
        (status = 404, description = "Unknown vehicle", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    ),
    tag = "locations"
)]
pub async fn get_locations(
    State(state): State<AppState>,
    caller: Caller,
    query: Result<Query<LocationsQuery>, QueryRejection>,
) -> ApiResult<Response> {
    require_permission(&caller, Permission::ReadLocations)?;
    let Query(query) = query?;

    if let Some(vehicle_id) = query.vehicle_id {
        let vehicle = state
            .fleet
            .store
            .get(&vehicle_id)
            .ok_or(ApiError::UnknownVehicle(vehicle_id))?;
        return Ok(Json(vehicle).into_response());
    }

    let filter = match query.route_id {
        Some(route_id) => VehicleFilter::Route(route_id),
        None => VehicleFilter::All,
    };
    Ok(Json(state.fleet.store.snapshot(&filter)).into_response())
}

#[utoipa::path(
    get,
    path = "/locations/stream",
    params(StreamQuery),
    security(
        ("api_key" = [])
    ),
    responses(
        (status = 200, description = "Server-sent events: one `snapshot`, then `update` events; `backpressure_exceeded` before the server closes a lagging stream", content_type = "text/event-stream"),
        (status = 400, description = "Invalid filter", body = ErrorResponse),
        (status = 401, description = "Unauthorized", body = ErrorResponse)
    ),
    tag = "locations"
)]
pub async fn stream_locations(
    State(state): State<AppState>,
    caller: Caller,
    query: Result<Query<StreamQuery>, QueryRejection>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    require_permission(&caller, Permission::ReadLocations)?;
    let Query(query) = query?;
    let filter: VehicleFilter = query.filter.as_deref().unwrap_or("all").parse()?;

    let mut subscription = state.fleet.broadcaster.subscribe(filter).await?;
    log::info!(
        "{} opened stream {} ({})",
        caller.name(),
        subscription.id(),
        subscription.filter()
    );
    let snapshot = encode_event("snapshot", &subscription.take_snapshot());

    let updates = stream::unfold(Some(subscription), |subscription| async move {
        let mut subscription = subscription?;
        match subscription.next().await? {
            Delivery::Update(change) => Some((
                Ok::<_, Infallible>(encode_event("update", &change)),
                Some(subscription),
            )),
            Delivery::Closed(reason) => Some((
                Ok(encode_event(
                    "backpressure_exceeded",
                    &json!({ "reason": reason }),
                )),
                None,
            )),
        }
    });

    let events = stream::once(async move { Ok(snapshot) }).chain(updates);
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

fn encode_event<T: Serialize>(name: &str, data: &T) -> Event {
    Event::default()
        .event(name)
        .json_data(data)
        .unwrap_or_else(|e| {
            log::warn!("Failed to encode {} event: {}", name, e);
            Event::default().comment("encode_failed")
        })
}
