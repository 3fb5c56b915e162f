//! Live fleet location ingestion, ETA estimation and broadcast.

pub mod broadcast;
pub mod eta;
pub mod fleet;
pub mod ingest;
pub mod store;
pub mod web;

pub use fleet::{Fleet, FleetSettings};
