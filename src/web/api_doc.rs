use utoipa::{
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
    Modify, OpenApi,
};

use super::api::error::ErrorResponse;
use super::api::routes::{Arrival, StopArrivals};
use super::api::stats::{StatsResponse, VehicleCounts};

#[derive(OpenApi)]
#[openapi(
    paths(
        super::api::locations::post_location,
        super::api::locations::get_locations,
        super::api::locations::stream_locations,
        super::api::routes::list_routes,
        super::api::routes::get_route,
        super::api::routes::stop_arrivals,
        super::api::stats::stats,
    ),
    components(
        schemas(
            ErrorResponse,
            Arrival,
            StopArrivals,
            StatsResponse,
            VehicleCounts,
            crate::ingest::LocationPayload,
            crate::ingest::VehicleReport,
            crate::ingest::Ack,
            crate::store::VehicleState,
            crate::store::VehicleStatus,
            crate::store::StateChange,
            crate::store::ChangeKind,
            crate::store::StatsSnapshot,
            crate::eta::Route,
            crate::eta::Stop,
            crate::eta::Coordinate,
            crate::eta::EtaEstimate,
            crate::eta::SpeedSource,
            crate::eta::OccupancyLevel,
            crate::broadcast::CloseReason,
        )
    ),
    modifiers(&SecurityAddon),
    info(
        title = "Transit Live API",
        description = "Vehicle location ingestion, ETA estimates and live fleet streams",
        version = "0.1.0"
    ),
    tags(
        (name = "locations", description = "Vehicle reports, state queries and live stream"),
        (name = "routes", description = "Route reference data and stop arrivals"),
        (name = "stats", description = "Service counters")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "api_key",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}
