use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Body of `POST /locations` as sent by a vehicle device.
///
/// Every field is optional at the serde level so that a missing field is
/// reported as an `InvalidReport` instead of a generic deserialization error.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LocationPayload {
    #[serde(default, alias = "busId")]
    pub vehicle_id: Option<String>,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lng: Option<f64>,
    /// km/h
    #[serde(default)]
    pub speed: Option<f64>,
    /// Passenger count on board.
    #[serde(default, alias = "passengers")]
    pub occupancy: Option<i64>,
    /// RFC 3339 string or epoch milliseconds.
    #[serde(default)]
    #[schema(value_type = Option<String>)]
    pub timestamp: Option<RawTimestamp>,
    #[serde(default)]
    pub route_id: Option<String>,
    #[serde(default)]
    pub trip_id: Option<String>,
    #[serde(default)]
    pub heading: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum RawTimestamp {
    Millis(i64),
    Text(String),
}

/// A validated, normalized location sample. Immutable once accepted.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct VehicleReport {
    pub vehicle_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub speed: f64,
    pub occupancy: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trip_id: Option<String>,
    pub source_timestamp: DateTime<Utc>,
    pub received_timestamp: DateTime<Utc>,
}
