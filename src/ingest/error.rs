use thiserror::Error;

/// Reason a location payload was refused at the gateway.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidReport {
    #[error("vehicleId must not be empty")]
    MissingVehicleId,
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("latitude {0} outside [-90, 90]")]
    LatitudeOutOfRange(f64),
    #[error("longitude {0} outside [-180, 180]")]
    LongitudeOutOfRange(f64),
    #[error("speed must be >= 0, got {0}")]
    NegativeSpeed(f64),
    #[error("occupancy must be >= 0, got {0}")]
    NegativeOccupancy(i64),
    #[error("occupancy {0} is out of range")]
    OccupancyOutOfRange(i64),
    #[error("heading {0} outside [0, 360)")]
    HeadingOutOfRange(f64),
    #[error("invalid timestamp: {0}")]
    BadTimestamp(String),
    #[error("timestamp {0} is too far in the future")]
    FutureTimestamp(String),
}
