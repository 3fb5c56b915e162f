mod catalog;
mod estimator;
mod geo;
mod occupancy;
mod route;

pub use catalog::{RouteCatalog, RouteError};
pub use estimator::{Estimate, EstimatorSettings, EtaEstimate, Estimator, SpeedSource};
pub use geo::{haversine_m, Coordinate};
pub use occupancy::OccupancyLevel;
pub use route::{Route, Stop};
