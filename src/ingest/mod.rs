mod error;
mod gateway;
mod types;

pub use error::InvalidReport;
pub use gateway::{normalize, Ack, Gateway};
pub use types::{LocationPayload, RawTimestamp, VehicleReport};
