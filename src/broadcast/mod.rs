mod hub;

pub use crate::store::VehicleFilter;
pub use hub::{BroadcastError, Broadcaster, CloseReason, Delivery, Subscription};
