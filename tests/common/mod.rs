#![allow(dead_code)]

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use transit_live::eta::RouteCatalog;
use transit_live::ingest::{LocationPayload, RawTimestamp};
use transit_live::{Fleet, FleetSettings};

pub const ROUTES: &str = r#"
default_speed_kmh: 20
routes:
  - id: downtown_airport
    name: Downtown - Airport
    capacity: 40
    vehicles: [BUS001, BUS002]
    stops:
      - { id: central, name: Central Station, lat: 40.7128, lng: -74.0060 }
      - { id: main_st, name: Main Street, lat: 40.7049, lng: -74.0622 }
      - { id: university_gate, name: University Gate, lat: 40.6971, lng: -74.1183 }
      - { id: airport, name: Airport Terminal, lat: 40.6892, lng: -74.1745 }
  - id: university_mall
    name: University - Mall
    capacity: 35
    vehicles: [BUS003]
    stops:
      - { id: university, name: University, lat: 40.7831, lng: -73.9712 }
      - { id: museum_row, name: Museum Row, lat: 40.7722, lng: -73.9786 }
      - { id: midtown, name: Midtown, lat: 40.7614, lng: -73.9860 }
      - { id: mall, name: Shopping Mall, lat: 40.7505, lng: -73.9934 }
"#;

pub fn catalog() -> RouteCatalog {
    RouteCatalog::from_yaml(ROUTES).expect("test routes are valid")
}

pub fn fleet() -> Fleet {
    fleet_with(FleetSettings::default())
}

pub fn fleet_with(settings: FleetSettings) -> Fleet {
    Fleet::start(catalog(), settings)
}

pub fn epoch() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-03-01T08:00:00Z")
        .expect("valid timestamp")
        .with_timezone(&Utc)
}

/// A payload stamped `secs` seconds after `epoch()`.
pub fn payload(id: &str, lat: f64, lng: f64, speed: f64, secs: i64) -> LocationPayload {
    LocationPayload {
        vehicle_id: Some(id.to_string()),
        lat: Some(lat),
        lng: Some(lng),
        speed: Some(speed),
        occupancy: Some(12),
        timestamp: Some(RawTimestamp::Millis(
            (epoch() + Duration::seconds(secs)).timestamp_millis(),
        )),
        ..Default::default()
    }
}

/// Synthetic device feed: drives a bus along a straight line between two
/// points with random GPS jitter, speed and passenger counts.
pub struct SyntheticBus {
    pub vehicle_id: String,
    start: (f64, f64),
    end: (f64, f64),
    steps: usize,
    step: usize,
    rng: StdRng,
}

impl SyntheticBus {
    pub fn new(vehicle_id: &str, start: (f64, f64), end: (f64, f64), steps: usize, seed: u64) -> Self {
        Self {
            vehicle_id: vehicle_id.to_string(),
            start,
            end,
            steps,
            step: 0,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn is_done(&self) -> bool {
        self.step > self.steps
    }

    /// Next report, `interval_secs` after the previous one, with up to
    /// `jitter_deg` of positional noise.
    pub fn next_payload(&mut self, interval_secs: i64, jitter_deg: f64) -> Option<LocationPayload> {
        if self.is_done() {
            return None;
        }
        let ratio = self.step as f64 / self.steps as f64;
        let lat = self.start.0 + (self.end.0 - self.start.0) * ratio
            + self.rng.gen_range(-jitter_deg..=jitter_deg);
        let lng = self.start.1 + (self.end.1 - self.start.1) * ratio
            + self.rng.gen_range(-jitter_deg..=jitter_deg);
        let speed = self.rng.gen_range(20.0..60.0);
        let passengers = self.rng.gen_range(10..40);
        let secs = self.step as i64 * interval_secs;
        self.step += 1;

        let mut p = payload(&self.vehicle_id, lat, lng, speed, secs);
        p.occupancy = Some(passengers);
        Some(p)
    }
}
