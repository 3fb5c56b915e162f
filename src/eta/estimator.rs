use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::Serialize;
use utoipa::ToSchema;

use super::catalog::RouteCatalog;
use super::geo::{haversine_m, Coordinate};
use super::occupancy::OccupancyLevel;
use super::route::Route;
use crate::ingest::VehicleReport;
use crate::store::{VehicleState, VehicleStatus};

/// Reported speeds below this are treated as "not moving": they neither feed
/// segment history nor drive an ETA.
const MIN_USABLE_SPEED_KMH: f64 = 1.0;

#[derive(Debug, Clone, Copy)]
pub struct EstimatorSettings {
    /// A vehicle this close to a stop counts as being at it.
    pub arrival_radius_m: f64,
}

impl Default for EstimatorSettings {
    fn default() -> Self {
        Self {
            arrival_radius_m: 40.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SpeedSource {
    Reported,
    Historical,
    RouteDefault,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EtaEstimate {
    pub stop_index: usize,
    pub stop_id: String,
    pub stop_name: String,
    pub distance_m: f64,
    pub speed_kmh: f64,
    pub speed_source: SpeedSource,
    pub eta_seconds: f64,
    pub arrival_at: DateTime<Utc>,
}

/// Everything the estimator derives from one accepted report.
#[derive(Debug, Clone, PartialEq)]
pub struct Estimate {
    pub route_id: Option<String>,
    pub trip_id: Option<String>,
    pub stop_index: Option<usize>,
    pub trip_complete: bool,
    pub eta: Option<EtaEstimate>,
    pub occupancy_level: OccupancyLevel,
}

#[derive(Debug, Default, Clone, Copy)]
struct SegmentSpeed {
    mean_kmh: f64,
    samples: u64,
}

impl SegmentSpeed {
    fn record(&mut self, speed_kmh: f64) {
        self.samples += 1;
        self.mean_kmh += (speed_kmh - self.mean_kmh) / self.samples as f64;
    }
}

pub struct Estimator {
    catalog: Arc<RouteCatalog>,
    settings: EstimatorSettings,
    /// Running mean speed per (route, upcoming stop index).
    history: DashMap<(String, usize), SegmentSpeed>,
}

impl Estimator {
    pub fn new(catalog: Arc<RouteCatalog>, settings: EstimatorSettings) -> Self {
        Self {
            catalog,
            settings,
            history: DashMap::new(),
        }
    }

    pub fn catalog(&self) -> &Arc<RouteCatalog> {
        &self.catalog
    }

    /// Derive route progress, ETA and occupancy for `report`, given the
    /// state it is about to replace.
    pub fn estimate(&self, previous: Option<&VehicleState>, report: &VehicleReport) -> Estimate {
        let previous_route = previous.and_then(|s| s.route_id.as_deref());
        let Some(route) = self.resolve_route(report, previous_route) else {
            return Estimate {
                route_id: None,
                trip_id: report
                    .trip_id
                    .clone()
                    .or_else(|| previous.and_then(|s| s.trip_id.clone())),
                stop_index: None,
                trip_complete: false,
                eta: None,
                occupancy_level: OccupancyLevel::Unknown,
            };
        };

        let position = Coordinate::new(report.latitude, report.longitude);
        let occupancy_level = OccupancyLevel::classify(report.occupancy, route.capacity);

        let same_route = previous_route == Some(route.id.as_str());
        let previous_trip = previous.and_then(|s| s.trip_id.as_deref());
        let same_trip = same_route
            && match report.trip_id.as_deref() {
                Some(trip) => previous_trip == Some(trip),
                None => true,
            };

        let trip_id = report
            .trip_id
            .clone()
            .or_else(|| same_route.then(|| previous_trip.map(String::from)).flatten());

        let (mut floor, mut complete) = match previous {
            Some(state) if same_trip => (state.last_known_stop_index.unwrap_or(0), state.trip_complete),
            _ => (0, false),
        };

        // Back at the first stop after finishing: a new run of the route.
        if complete && haversine_m(position, route.stops[0].position()) <= self.settings.arrival_radius_m
        {
            log::debug!("Vehicle {} starting a new trip on {}", report.vehicle_id, route.id);
            floor = 0;
            complete = false;
        }

        if complete {
            return Estimate {
                route_id: Some(route.id.clone()),
                trip_id,
                stop_index: Some(route.last_stop_index()),
                trip_complete: true,
                eta: None,
                occupancy_level,
            };
        }

        let upcoming = match_upcoming_stop(&route, position, floor);
        let at_last_stop = upcoming == route.last_stop_index()
            && haversine_m(position, route.stops[upcoming].position())
                <= self.settings.arrival_radius_m;

        if report.speed >= MIN_USABLE_SPEED_KMH {
            self.history
                .entry((route.id.clone(), upcoming))
                .or_default()
                .record(report.speed);
        }

        let eta = if at_last_stop {
            None
        } else {
            Some(self.eta_for(
                &route,
                upcoming,
                upcoming,
                position,
                report.speed,
                report.source_timestamp,
            ))
        };

        Estimate {
            route_id: Some(route.id.clone()),
            trip_id,
            stop_index: Some(upcoming),
            trip_complete: at_last_stop,
            eta,
            occupancy_level,
        }
    }

    /// ETA of a tracked vehicle to any stop at or after its upcoming one.
    pub fn eta_to_stop(
        &self,
        state: &VehicleState,
        route: &Route,
        stop_index: usize,
    ) -> Option<EtaEstimate> {
        if state.status == VehicleStatus::Offline || state.trip_complete {
            return None;
        }
        if state.route_id.as_deref() != Some(route.id.as_str()) {
            return None;
        }
        let upcoming = state.last_known_stop_index?;
        if stop_index < upcoming || stop_index >= route.stops.len() {
            return None;
        }

        let report = &state.last_report;
        Some(self.eta_for(
            route,
            upcoming,
            stop_index,
            Coordinate::new(report.latitude, report.longitude),
            report.speed,
            report.source_timestamp,
        ))
    }

    /// Average observed speed on the segment ending at `stop_index`.
    pub fn historical_speed(&self, route_id: &str, stop_index: usize) -> Option<f64> {
        self.history
            .get(&(route_id.to_string(), stop_index))
            .filter(|s| s.samples > 0 && s.mean_kmh > 0.0)
            .map(|s| s.mean_kmh)
    }

    fn resolve_route(
        &self,
        report: &VehicleReport,
        previous_route: Option<&str>,
    ) -> Option<Arc<Route>> {
        if let Some(route_id) = report.route_id.as_deref() {
            match self.catalog.get(route_id) {
                Some(route) => return Some(route),
                None => log::debug!(
                    "Vehicle {} reported unknown route {}",
                    report.vehicle_id,
                    route_id
                ),
            }
        }
        previous_route
            .and_then(|id| self.catalog.get(id))
            .or_else(|| self.catalog.route_for_vehicle(&report.vehicle_id))
    }

    fn resolve_speed(&self, route: &Route, segment: usize, reported: f64) -> (f64, SpeedSource) {
        if reported >= MIN_USABLE_SPEED_KMH {
            return (reported, SpeedSource::Reported);
        }
        match self.historical_speed(&route.id, segment) {
            Some(speed) => (speed, SpeedSource::Historical),
            None => (route.default_speed_kmh, SpeedSource::RouteDefault),
        }
    }

    fn eta_for(
        &self,
        route: &Route,
        upcoming: usize,
        target: usize,
        position: Coordinate,
        reported_speed: f64,
        at: DateTime<Utc>,
    ) -> EtaEstimate {
        let stop = &route.stops[target];
        let distance_m = haversine_m(position, route.stops[upcoming].position())
            + (route.offset_m(target) - route.offset_m(upcoming)).max(0.0);
        let (speed_kmh, speed_source) = self.resolve_speed(route, upcoming, reported_speed);
        let eta_seconds = distance_m / (speed_kmh / 3.6);

        EtaEstimate {
            stop_index: target,
            stop_id: stop.id.clone(),
            stop_name: stop.name.clone(),
            distance_m: round1(distance_m),
            speed_kmh: round1(speed_kmh),
            speed_source,
            eta_seconds: round1(eta_seconds),
            arrival_at: arrival_time(at, eta_seconds),
        }
    }
}

/// Index of the next stop the vehicle is heading to, never below `floor`.
///
/// The nearest stop from `floor` onward is the candidate; if the vehicle is
/// closer to the stop after it than the two stops are to each other, the
/// candidate is already behind the vehicle.
pub(crate) fn match_upcoming_stop(route: &Route, position: Coordinate, floor: usize) -> usize {
    let stops = &route.stops;
    let floor = floor.min(route.last_stop_index());

    let (nearest, _) = stops
        .iter()
        .enumerate()
        .skip(floor)
        .map(|(i, stop)| (i, haversine_m(position, stop.position())))
        .fold((floor, f64::INFINITY), |best, candidate| {
            if candidate.1 < best.1 {
                candidate
            } else {
                best
            }
        });

    match stops.get(nearest + 1) {
        Some(next) => {
            let segment = haversine_m(stops[nearest].position(), next.position());
            if haversine_m(position, next.position()) < segment {
                nearest + 1
            } else {
                nearest
            }
        }
        None => nearest,
    }
}

/// `at` plus `eta_seconds`, saturating at the latest representable time.
fn arrival_time(at: DateTime<Utc>, eta_seconds: f64) -> DateTime<Utc> {
    Duration::try_milliseconds((eta_seconds * 1000.0) as i64)
        .and_then(|eta| at.checked_add_signed(eta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eta::Stop;

    fn line_route() -> Route {
        // Four stops roughly 1.1 km apart heading east along the equator.
        let stops = (0..4)
            .map(|i| Stop {
                id: format!("s{i}"),
                name: format!("Stop {i}"),
                lat: 0.0,
                lng: 0.01 * i as f64,
            })
            .collect();
        Route::new("line".into(), "Line".into(), stops, vec![], 18.0, Some(40), vec!["B1".into()])
    }

    fn estimator() -> Estimator {
        let catalog = RouteCatalog::from_yaml(
            r#"
routes:
  - id: line
    default_speed_kmh: 18
    capacity: 40
    vehicles: [B1]
    stops:
      - { id: s0, name: Stop 0, lat: 0.0, lng: 0.0 }
      - { id: s1, name: Stop 1, lat: 0.0, lng: 0.01 }
      - { id: s2, name: Stop 2, lat: 0.0, lng: 0.02 }
      - { id: s3, name: Stop 3, lat: 0.0, lng: 0.03 }
"#,
        )
        .unwrap();
        Estimator::new(Arc::new(catalog), EstimatorSettings::default())
    }

    fn report(lng: f64, speed: f64) -> VehicleReport {
        let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        VehicleReport {
            vehicle_id: "B1".into(),
            latitude: 0.0,
            longitude: lng,
            speed,
            occupancy: 10,
            heading: None,
            route_id: None,
            trip_id: None,
            source_timestamp: at,
            received_timestamp: at,
        }
    }

    fn state_from(report: VehicleReport, estimate: Estimate) -> VehicleState {
        VehicleState {
            vehicle_id: report.vehicle_id.clone(),
            route_id: estimate.route_id,
            trip_id: estimate.trip_id,
            last_known_stop_index: estimate.stop_index,
            trip_complete: estimate.trip_complete,
            estimated_eta: estimate.eta,
            occupancy_level: estimate.occupancy_level,
            status: VehicleStatus::Active,
            version: 1,
            last_report: report,
        }
    }

    #[test]
    fn upcoming_stop_before_and_after_passing() {
        let route = line_route();
        // Approaching s1 from the west.
        assert_eq!(match_upcoming_stop(&route, Coordinate::new(0.0, 0.008), 0), 1);
        // Just past s1.
        assert_eq!(match_upcoming_stop(&route, Coordinate::new(0.0, 0.0105), 0), 2);
        // Exactly at s1.
        assert_eq!(match_upcoming_stop(&route, Coordinate::new(0.0, 0.01), 0), 1);
    }

    #[test]
    fn floor_prevents_backward_match() {
        let route = line_route();
        // GPS noise puts the bus behind s2 while it is already heading to s3.
        assert_eq!(match_upcoming_stop(&route, Coordinate::new(0.0, 0.0195), 3), 3);
    }

    #[test]
    fn eta_uses_reported_speed() {
        let estimator = estimator();
        let estimate = estimator.estimate(None, &report(0.005, 36.0));
        assert_eq!(estimate.route_id.as_deref(), Some("line"));
        assert_eq!(estimate.stop_index, Some(1));
        assert_eq!(estimate.occupancy_level, OccupancyLevel::Low);

        let eta = estimate.eta.unwrap();
        assert_eq!(eta.speed_source, SpeedSource::Reported);
        // ~556 m at 10 m/s.
        assert!((eta.eta_seconds - 55.6).abs() < 1.0, "{}", eta.eta_seconds);
    }

    #[test]
    fn eta_falls_back_to_history_then_default() {
        let estimator = estimator();

        let stopped = estimator.estimate(None, &report(0.005, 0.0));
        assert_eq!(stopped.eta.unwrap().speed_source, SpeedSource::RouteDefault);

        estimator.estimate(None, &report(0.004, 30.0));
        estimator.estimate(None, &report(0.006, 40.0));
        assert_eq!(estimator.historical_speed("line", 1), Some(35.0));

        let stopped = estimator.estimate(None, &report(0.005, 0.0));
        let eta = stopped.eta.unwrap();
        assert_eq!(eta.speed_source, SpeedSource::Historical);
        assert_eq!(eta.speed_kmh, 35.0);
    }

    #[test]
    fn crawling_speed_counts_as_stopped() {
        let estimator = estimator();
        let estimate = estimator.estimate(None, &report(0.005, 1e-12));

        let eta = estimate.eta.unwrap();
        assert_eq!(eta.speed_source, SpeedSource::RouteDefault);
        assert_eq!(eta.speed_kmh, 18.0);
        assert!(eta.eta_seconds < 200.0);
        assert_eq!(estimator.historical_speed("line", 1), None);
    }

    #[test]
    fn arrival_time_saturates_instead_of_overflowing() {
        let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        assert_eq!(arrival_time(at, 1.8e15), DateTime::<Utc>::MAX_UTC);
        assert_eq!(arrival_time(at, f64::INFINITY), DateTime::<Utc>::MAX_UTC);
        assert_eq!(arrival_time(at, 1.5), at + Duration::milliseconds(1500));
    }

    #[test]
    fn segment_history_accepts_concurrent_vehicles() {
        let estimator = estimator();
        std::thread::scope(|scope| {
            for worker in 0..8 {
                let estimator = &estimator;
                scope.spawn(move || {
                    for _ in 0..50 {
                        let mut r = report(0.005, 30.0);
                        r.vehicle_id = format!("V{worker}");
                        r.route_id = Some("line".into());
                        estimator.estimate(None, &r);
                    }
                });
            }
        });

        let segment = estimator.history.get(&("line".to_string(), 1)).unwrap();
        assert_eq!(segment.samples, 400);
        assert_eq!(segment.mean_kmh, 30.0);
    }

    #[test]
    fn index_is_monotonic_within_trip() {
        let estimator = estimator();
        let first = report(0.025, 20.0);
        let estimate = estimator.estimate(None, &first);
        assert_eq!(estimate.stop_index, Some(3));
        let state = state_from(first, estimate);

        // Jumps back near s1: still heading to s3.
        let estimate = estimator.estimate(Some(&state), &report(0.0101, 20.0));
        assert_eq!(estimate.stop_index, Some(3));
    }

    #[test]
    fn new_trip_id_resets_progress() {
        let estimator = estimator();
        let first = report(0.025, 20.0);
        let state = state_from(first.clone(), estimator.estimate(None, &first));

        let mut next = report(0.002, 20.0);
        next.trip_id = Some("T2".into());
        let estimate = estimator.estimate(Some(&state), &next);
        assert_eq!(estimate.stop_index, Some(1));
        assert_eq!(estimate.trip_id.as_deref(), Some("T2"));
    }

    #[test]
    fn completes_trip_and_restarts_at_first_stop() {
        let estimator = estimator();
        let at_end = report(0.03, 5.0);
        let estimate = estimator.estimate(None, &at_end);
        assert!(estimate.trip_complete);
        assert!(estimate.eta.is_none());
        let state = state_from(at_end, estimate);

        // Somewhere mid-route after finishing: stays complete.
        let estimate = estimator.estimate(Some(&state), &report(0.015, 20.0));
        assert!(estimate.trip_complete);
        assert_eq!(estimate.stop_index, Some(3));

        // Back at the first stop: new trip.
        let estimate = estimator.estimate(Some(&state), &report(0.0, 0.0));
        assert!(!estimate.trip_complete);
        assert_eq!(estimate.stop_index, Some(0));
    }

    #[test]
    fn eta_to_later_stop_adds_route_distance() {
        let estimator = estimator();
        let route = estimator.catalog().get("line").unwrap();
        let first = report(0.005, 36.0);
        let state = state_from(first.clone(), estimator.estimate(None, &first));

        let to_s1 = estimator.eta_to_stop(&state, &route, 1).unwrap();
        let to_s3 = estimator.eta_to_stop(&state, &route, 3).unwrap();
        assert!(to_s3.distance_m > to_s1.distance_m + 2000.0);
        assert!(estimator.eta_to_stop(&state, &route, 0).is_none());
    }

    #[test]
    fn unassigned_vehicle_has_no_route() {
        let estimator = estimator();
        let mut r = report(0.005, 20.0);
        r.vehicle_id = "B9".into();
        let estimate = estimator.estimate(None, &r);
        assert_eq!(estimate.route_id, None);
        assert_eq!(estimate.eta, None);
        assert_eq!(estimate.occupancy_level, OccupancyLevel::Unknown);
    }
}
