use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use super::state::VehicleState;

/// Which vehicles a query or subscription is interested in.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum VehicleFilter {
    #[default]
    All,
    Route(String),
    Vehicle(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid filter '{0}': expected all, route:<id> or vehicle:<id>")]
pub struct FilterError(pub String);

impl VehicleFilter {
    pub fn matches(&self, state: &VehicleState) -> bool {
        match self {
            VehicleFilter::All => true,
            VehicleFilter::Route(route_id) => state.route_id.as_deref() == Some(route_id.as_str()),
            VehicleFilter::Vehicle(vehicle_id) => state.vehicle_id == *vehicle_id,
        }
    }
}

impl FromStr for VehicleFilter {
    type Err = FilterError;

    /// Accepts `all`, `route:<id>`, `vehicle:<id>`, and the query-style
    /// `routeId=<id>` / `vehicleId=<id>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("all") {
            return Ok(VehicleFilter::All);
        }

        let err = || FilterError(s.to_string());
        let (key, value) = s.split_once([':', '=']).ok_or_else(err)?;
        let value = value.trim();
        if value.is_empty() {
            return Err(err());
        }

        match key.trim() {
            "route" | "routeId" => Ok(VehicleFilter::Route(value.to_string())),
            "vehicle" | "vehicleId" => Ok(VehicleFilter::Vehicle(value.to_string())),
            _ => Err(err()),
        }
    }
}

impl fmt::Display for VehicleFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VehicleFilter::All => write!(f, "all"),
            VehicleFilter::Route(id) => write!(f, "route:{}", id),
            VehicleFilter::Vehicle(id) => write!(f, "vehicle:{}", id),
        }
    }
}
