use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use utoipa::ToSchema;

use super::error::InvalidReport;
use super::types::{LocationPayload, RawTimestamp, VehicleReport};
use crate::store::{ApplyOutcome, VehicleStore};

/// Acknowledgment returned to the device once a report passed validation.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Ack {
    pub accepted: bool,
    pub vehicle_id: String,
    pub received_timestamp: DateTime<Utc>,
    #[serde(skip)]
    pub outcome: ApplyOutcome,
}

pub struct Gateway {
    store: Arc<VehicleStore>,
    max_clock_skew: Duration,
}

impl Gateway {
    pub fn new(store: Arc<VehicleStore>, max_clock_skew: Duration) -> Self {
        Self {
            store,
            max_clock_skew,
        }
    }

    pub fn accept(&self, payload: LocationPayload) -> Result<Ack, InvalidReport> {
        self.accept_at(payload, Utc::now())
    }

    /// Validate `payload` as received at `received` and hand it to the store.
    /// A rejected payload never reaches the store.
    pub fn accept_at(
        &self,
        payload: LocationPayload,
        received: DateTime<Utc>,
    ) -> Result<Ack, InvalidReport> {
        let report = match normalize(payload, received, self.max_clock_skew) {
            Ok(report) => report,
            Err(e) => {
                self.store.stats().record_invalid();
                log::warn!("Rejected location report: {}", e);
                return Err(e);
            }
        };

        let vehicle_id = report.vehicle_id.clone();
        let outcome = self.store.apply(report);

        Ok(Ack {
            accepted: true,
            vehicle_id,
            received_timestamp: received,
            outcome,
        })
    }
}

/// Turn a raw payload into a `VehicleReport`, or explain why it can't be one.
pub fn normalize(
    payload: LocationPayload,
    received: DateTime<Utc>,
    max_clock_skew: Duration,
) -> Result<VehicleReport, InvalidReport> {
    let vehicle_id = payload
        .vehicle_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or(InvalidReport::MissingVehicleId)?
        .to_string();

    let latitude = payload.lat.ok_or(InvalidReport::MissingField("lat"))?;
    if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
        return Err(InvalidReport::LatitudeOutOfRange(latitude));
    }

    let longitude = payload.lng.ok_or(InvalidReport::MissingField("lng"))?;
    if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
        return Err(InvalidReport::LongitudeOutOfRange(longitude));
    }

    let speed = payload.speed.unwrap_or(0.0);
    if !speed.is_finite() || speed < 0.0 {
        return Err(InvalidReport::NegativeSpeed(speed));
    }

    let occupancy = match payload.occupancy.unwrap_or(0) {
        n if n < 0 => return Err(InvalidReport::NegativeOccupancy(n)),
        n => u32::try_from(n).map_err(|_| InvalidReport::OccupancyOutOfRange(n))?,
    };

    if let Some(heading) = payload.heading {
        if !heading.is_finite() || !(0.0..360.0).contains(&heading) {
            return Err(InvalidReport::HeadingOutOfRange(heading));
        }
    }

    let source_timestamp = match payload.timestamp {
        Some(raw) => parse_timestamp(&raw)?,
        None => received,
    };
    if source_timestamp > received + max_clock_skew {
        return Err(InvalidReport::FutureTimestamp(source_timestamp.to_rfc3339()));
    }

    Ok(VehicleReport {
        vehicle_id,
        latitude,
        longitude,
        speed,
        occupancy,
        heading: payload.heading,
        route_id: non_empty(payload.route_id),
        trip_id: non_empty(payload.trip_id),
        source_timestamp,
        received_timestamp: received,
    })
}

fn parse_timestamp(raw: &RawTimestamp) -> Result<DateTime<Utc>, InvalidReport> {
    match raw {
        RawTimestamp::Millis(ms) => DateTime::from_timestamp_millis(*ms)
            .ok_or_else(|| InvalidReport::BadTimestamp(ms.to_string())),
        RawTimestamp::Text(s) => DateTime::parse_from_rfc3339(s.trim())
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| InvalidReport::BadTimestamp(format!("{}: {}", s, e))),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
