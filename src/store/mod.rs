mod filter;
mod state;
mod stats;
mod store;
mod sweep;

pub use filter::{FilterError, VehicleFilter};
pub use state::{ChangeKind, StateChange, VehicleState, VehicleStatus};
pub use stats::{StatsSnapshot, StoreStats};
pub use store::{ApplyOutcome, DropReason, StoreSettings, VehicleStore};
pub use sweep::Sweeper;
