use std::sync::Arc;

use chrono::Duration;
use tokio::sync::mpsc;

use crate::broadcast::Broadcaster;
use crate::eta::{Estimator, EstimatorSettings, RouteCatalog};
use crate::ingest::Gateway;
use crate::store::{StoreSettings, VehicleStore};

#[derive(Debug, Clone, Copy)]
pub struct FleetSettings {
    pub store: StoreSettings,
    pub estimator: EstimatorSettings,
    pub max_clock_skew: Duration,
    pub max_queue_depth: usize,
}

impl Default for FleetSettings {
    fn default() -> Self {
        Self {
            store: StoreSettings::default(),
            estimator: EstimatorSettings::default(),
            max_clock_skew: Duration::seconds(30),
            max_queue_depth: 64,
        }
    }
}

/// The wired-up core: gateway → store (+ estimator) → broadcaster.
#[derive(Clone)]
pub struct Fleet {
    pub catalog: Arc<RouteCatalog>,
    pub estimator: Arc<Estimator>,
    pub store: Arc<VehicleStore>,
    pub gateway: Arc<Gateway>,
    pub broadcaster: Broadcaster,
}

impl Fleet {
    /// Must be called from within a Tokio runtime; spawns the broadcaster.
    pub fn start(catalog: RouteCatalog, settings: FleetSettings) -> Self {
        let catalog = Arc::new(catalog);
        let estimator = Arc::new(Estimator::new(catalog.clone(), settings.estimator));

        let (changes_tx, changes_rx) = mpsc::unbounded_channel();
        let store = Arc::new(VehicleStore::new(
            settings.store,
            estimator.clone(),
            changes_tx,
        ));
        let gateway = Arc::new(Gateway::new(store.clone(), settings.max_clock_skew));
        let broadcaster = Broadcaster::spawn(store.clone(), changes_rx, settings.max_queue_depth);

        Self {
            catalog,
            estimator,
            store,
            gateway,
            broadcaster,
        }
    }
}
