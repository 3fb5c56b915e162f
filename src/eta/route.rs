use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::geo::{haversine_m, Coordinate};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Stop {
    pub id: String,
    pub name: String,
    pub lat: f64,
    pub lng: f64,
}

impl Stop {
    pub fn position(&self) -> Coordinate {
        Coordinate::new(self.lat, self.lng)
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Route {
    pub id: String,
    pub name: String,
    pub stops: Vec<Stop>,
    pub geometry: Vec<Coordinate>,
    pub default_speed_kmh: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity: Option<u32>,
    pub vehicles: Vec<String>,
    /// Distance along the route from the first stop to each stop, meters.
    #[serde(skip)]
    offsets_m: Vec<f64>,
}

impl Route {
    pub fn new(
        id: String,
        name: String,
        stops: Vec<Stop>,
        geometry: Vec<Coordinate>,
        default_speed_kmh: f64,
        capacity: Option<u32>,
        vehicles: Vec<String>,
    ) -> Self {
        let offsets_m = if geometry.len() >= 2 {
            offsets_along_geometry(&stops, &geometry)
        } else {
            offsets_between_stops(&stops)
        };
        Self {
            id,
            name,
            stops,
            geometry,
            default_speed_kmh,
            capacity,
            vehicles,
            offsets_m,
        }
    }

    pub fn last_stop_index(&self) -> usize {
        self.stops.len().saturating_sub(1)
    }

    pub fn offset_m(&self, stop_index: usize) -> f64 {
        self.offsets_m.get(stop_index).copied().unwrap_or(0.0)
    }

    pub fn length_m(&self) -> f64 {
        self.offsets_m.last().copied().unwrap_or(0.0)
    }
}

fn offsets_between_stops(stops: &[Stop]) -> Vec<f64> {
    let mut offsets = Vec::with_capacity(stops.len());
    let mut total = 0.0;
    for (i, stop) in stops.iter().enumerate() {
        if i > 0 {
            total += haversine_m(stops[i - 1].position(), stop.position());
        }
        offsets.push(total);
    }
    offsets
}

/// Snap every stop to its nearest geometry vertex, never moving backwards
/// along the line, and read the cumulative polyline length at that vertex.
fn offsets_along_geometry(stops: &[Stop], geometry: &[Coordinate]) -> Vec<f64> {
    let mut cumulative = Vec::with_capacity(geometry.len());
    let mut total = 0.0;
    for (i, point) in geometry.iter().enumerate() {
        if i > 0 {
            total += haversine_m(geometry[i - 1], *point);
        }
        cumulative.push(total);
    }

    let mut offsets = Vec::with_capacity(stops.len());
    let mut from = 0;
    for stop in stops {
        let position = stop.position();
        let mut best = from;
        let mut best_distance = f64::INFINITY;
        for (i, point) in geometry.iter().enumerate().skip(from) {
            let d = haversine_m(position, *point);
            if d < best_distance {
                best = i;
                best_distance = d;
            }
        }
        offsets.push(cumulative[best]);
        from = best;
    }
    offsets
}
