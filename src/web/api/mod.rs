pub mod error;
pub mod locations;
pub mod routes;
pub mod stats;
