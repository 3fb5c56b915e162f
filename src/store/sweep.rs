use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use super::store::VehicleStore;

#[derive(Debug)]
struct WorkerHandle {
    stop_tx: oneshot::Sender<()>,
    join: JoinHandle<()>,
}

/// Background task that periodically marks silent vehicles offline.
pub struct Sweeper {
    worker: Option<WorkerHandle>,
}

impl Sweeper {
    pub fn start(store: Arc<VehicleStore>, period: Duration) -> Self {
        let (stop_tx, stop_rx) = oneshot::channel();
        let join = tokio::spawn(run_sweep_loop(store, period, stop_rx));
        Self {
            worker: Some(WorkerHandle { stop_tx, join }),
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.join.is_finished())
    }

    pub async fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop_tx.send(());
            let _ = worker.join.await;
        }
    }
}

async fn run_sweep_loop(
    store: Arc<VehicleStore>,
    period: Duration,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    log::info!("Staleness sweep running every {:?}", period);

    loop {
        let should_stop = tokio::select! {
            _ = ticker.tick() => false,
            _ = &mut stop_rx => true,
        };
        if should_stop {
            break;
        }

        let marked = store.sweep_at(Utc::now());
        if marked > 0 {
            log::debug!("Sweep marked {} vehicle(s) offline", marked);
        }
    }

    log::info!("Staleness sweep stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eta::{Estimator, EstimatorSettings, RouteCatalog};
    use crate::ingest::VehicleReport;
    use crate::store::{StoreSettings, VehicleStatus};
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn sweeper_marks_silent_vehicle_offline() {
        let estimator = Arc::new(Estimator::new(
            Arc::new(RouteCatalog::default()),
            EstimatorSettings::default(),
        ));
        let (tx, _rx) = mpsc::unbounded_channel();
        let settings = StoreSettings {
            staleness_window: chrono::Duration::seconds(60),
            idle_speed_kmh: 1.0,
        };
        let store = Arc::new(VehicleStore::new(settings, estimator, tx));

        let long_ago = Utc::now() - chrono::Duration::minutes(10);
        store.apply(VehicleReport {
            vehicle_id: "B1".into(),
            latitude: 0.0,
            longitude: 0.0,
            speed: 12.0,
            occupancy: 0,
            heading: None,
            route_id: None,
            trip_id: None,
            source_timestamp: long_ago,
            received_timestamp: long_ago,
        });

        let mut sweeper = Sweeper::start(store.clone(), Duration::from_millis(10));
        assert!(sweeper.is_running());

        let mut offline = false;
        for _ in 0..50 {
            if store.get("B1").map(|s| s.status) == Some(VehicleStatus::Offline) {
                offline = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        sweeper.stop().await;

        assert!(offline);
        assert!(!sweeper.is_running());
    }
}
