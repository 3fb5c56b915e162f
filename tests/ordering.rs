mod common;

use chrono::Duration;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use common::{epoch, fleet, payload, SyntheticBus};
use transit_live::eta::SpeedSource;
use transit_live::store::{ApplyOutcome, DropReason, VehicleStatus};

#[tokio::test]
async fn out_of_order_report_is_dropped() {
    let fleet = fleet();
    let gateway = &fleet.gateway;

    let ack = gateway.accept_at(payload("B1", 10.0, 20.0, 30.0, 100), epoch() + Duration::seconds(100)).unwrap();
    assert!(ack.accepted);
    assert!(ack.outcome.is_applied());

    let ack = gateway.accept_at(payload("B1", 10.01, 20.01, 32.0, 90), epoch() + Duration::seconds(101)).unwrap();
    assert!(ack.accepted);
    assert_eq!(ack.outcome, ApplyOutcome::Dropped(DropReason::Stale));

    let state = fleet.store.get("B1").unwrap();
    assert_eq!(state.last_report.latitude, 10.0);
    assert_eq!(state.last_report.longitude, 20.0);
    assert_eq!(state.last_report.speed, 30.0);
    assert_eq!(state.last_report.source_timestamp, epoch() + Duration::seconds(100));
}

#[tokio::test]
async fn final_timestamp_is_max_of_any_arrival_order() {
    let fleet = fleet();
    let mut rng = StdRng::seed_from_u64(7);

    for round in 0..20 {
        let id = format!("V{round}");
        let mut stamps: Vec<i64> = (0..30).map(|_| rng.gen_range(0..10_000)).collect();
        stamps.shuffle(&mut rng);

        let received = epoch() + Duration::seconds(20_000);
        let mut last_lat = None;
        for (i, ts) in stamps.iter().enumerate() {
            let lat = (i as f64) * 0.001;
            let before = fleet.store.get(&id);
            let ack = fleet
                .gateway
                .accept_at(payload(&id, lat, 0.0, 15.0, *ts), received)
                .unwrap();

            match ack.outcome {
                ApplyOutcome::Applied(_) => last_lat = Some(lat),
                ApplyOutcome::Dropped(DropReason::Stale) => {
                    // A dropped report never moves the vehicle.
                    let after = fleet.store.get(&id).unwrap();
                    let before = before.unwrap();
                    assert_eq!(after.last_report.latitude, before.last_report.latitude);
                    assert_eq!(after.last_report.longitude, before.last_report.longitude);
                }
            }
        }

        let max = stamps.iter().max().unwrap();
        let state = fleet.store.get(&id).unwrap();
        assert_eq!(state.last_report.source_timestamp, epoch() + Duration::seconds(*max));
        assert_eq!(Some(state.last_report.latitude), last_lat);
    }
}

#[tokio::test]
async fn concurrent_reports_for_one_vehicle_keep_the_newest() {
    let fleet = fleet();
    let mut handles = Vec::new();
    for worker in 0..8i64 {
        let gateway = fleet.gateway.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            for i in 0..50i64 {
                let ts = i * 8 + worker;
                let _ = gateway.accept_at(
                    payload("SHARED", 1.0, 1.0 + ts as f64 * 1e-5, 20.0, ts),
                    epoch() + Duration::seconds(1_000),
                );
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let state = fleet.store.get("SHARED").unwrap();
    assert_eq!(state.last_report.source_timestamp, epoch() + Duration::seconds(399));
    let stats = fleet.store.stats().snapshot();
    assert_eq!(stats.reports_applied + stats.reports_stale, 400);
}

#[tokio::test]
async fn stop_index_never_decreases_over_noisy_trip() {
    let fleet = fleet();
    // Central Station to Airport Terminal with ~100 m of GPS noise.
    let mut bus = SyntheticBus::new("BUS001", (40.7128, -74.0060), (40.6892, -74.1745), 60, 42);

    let mut previous = 0;
    let mut seen_progress = false;
    while let Some(p) = bus.next_payload(15, 0.001) {
        let received = epoch() + Duration::hours(1);
        fleet.gateway.accept_at(p, received).unwrap();

        let state = fleet.store.get("BUS001").unwrap();
        assert_eq!(state.route_id.as_deref(), Some("downtown_airport"));
        let index = state.last_known_stop_index.unwrap();
        assert!(index >= previous, "stop index went from {previous} to {index}");
        seen_progress |= index > previous;
        previous = index;
    }

    assert!(seen_progress);
    assert_eq!(previous, 3);
}

#[tokio::test]
async fn accepted_report_updates_eta_with_position() {
    let fleet = fleet();
    // Between Central Station and Main Street, moving.
    fleet
        .gateway
        .accept_at(payload("BUS002", 40.7100, -74.0300, 30.0, 10), epoch() + Duration::seconds(10))
        .unwrap();

    let state = fleet.store.get("BUS002").unwrap();
    assert_eq!(state.status, VehicleStatus::Active);
    let eta = state.estimated_eta.unwrap();
    assert_eq!(eta.stop_id, "main_st");
    assert!(eta.eta_seconds > 0.0);
    assert!(eta.arrival_at > state.last_report.source_timestamp);
}

#[tokio::test]
async fn silent_vehicle_goes_offline_once_and_loses_eta() {
    let fleet = fleet();
    fleet
        .gateway
        .accept_at(payload("BUS003", 40.7800, -73.9730, 25.0, 0), epoch())
        .unwrap();
    assert!(fleet.store.get("BUS003").unwrap().estimated_eta.is_some());

    // Default staleness window is two minutes.
    assert_eq!(fleet.store.sweep_at(epoch() + Duration::seconds(60)), 0);
    assert_eq!(fleet.store.sweep_at(epoch() + Duration::seconds(121)), 1);
    assert_eq!(fleet.store.sweep_at(epoch() + Duration::seconds(180)), 0);

    let state = fleet.store.get("BUS003").unwrap();
    assert_eq!(state.status, VehicleStatus::Offline);
    assert!(state.estimated_eta.is_none());
}

#[tokio::test]
async fn crawling_vehicle_gets_fallback_eta() {
    let fleet = fleet();
    let ack = fleet
        .gateway
        .accept_at(payload("BUS001", 40.7100, -74.0300, 1e-12, 10), epoch() + Duration::seconds(10))
        .unwrap();
    assert!(ack.outcome.is_applied());

    let state = fleet.store.get("BUS001").unwrap();
    assert_eq!(state.status, VehicleStatus::Idle);
    let eta = state.estimated_eta.unwrap();
    assert_eq!(eta.speed_source, SpeedSource::RouteDefault);
    assert!(eta.arrival_at > state.last_report.source_timestamp);
    assert_eq!(fleet.estimator.historical_speed("downtown_airport", 1), None);
}
