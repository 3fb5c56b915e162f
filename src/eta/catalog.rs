use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use super::geo::Coordinate;
use super::route::{Route, Stop};

const DEFAULT_SPEED_KMH: f64 = 20.0;

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("route file read error: {0}")]
    Io(#[from] std::io::Error),
    #[error("route file parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("route {route}: {message}")]
    Invalid { route: String, message: String },
}

#[derive(Debug, Deserialize)]
struct RouteFile {
    #[serde(default)]
    default_speed_kmh: Option<f64>,
    routes: Vec<RouteDefinition>,
}

#[derive(Debug, Deserialize)]
struct RouteDefinition {
    id: String,
    #[serde(default)]
    name: Option<String>,
    stops: Vec<Stop>,
    /// `[lat, lng]` pairs.
    #[serde(default)]
    geometry: Vec<[f64; 2]>,
    #[serde(default)]
    default_speed_kmh: Option<f64>,
    #[serde(default)]
    capacity: Option<u32>,
    #[serde(default)]
    vehicles: Vec<String>,
}

/// Read-only route reference data, loaded once at startup.
#[derive(Debug, Default)]
pub struct RouteCatalog {
    routes: HashMap<String, Arc<Route>>,
    vehicle_routes: HashMap<String, String>,
    stop_routes: HashMap<String, Vec<(String, usize)>>,
}

impl RouteCatalog {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RouteError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, RouteError> {
        let file: RouteFile = serde_yaml::from_str(yaml)?;
        let fallback_speed = file.default_speed_kmh.unwrap_or(DEFAULT_SPEED_KMH);

        let mut catalog = RouteCatalog::default();
        for definition in file.routes {
            let route = build_route(definition, fallback_speed)?;
            catalog.insert(route)?;
        }
        Ok(catalog)
    }

    fn insert(&mut self, route: Route) -> Result<(), RouteError> {
        if self.routes.contains_key(&route.id) {
            return Err(invalid(&route.id, "duplicate route id"));
        }

        for vehicle in &route.vehicles {
            if let Some(other) = self.vehicle_routes.get(vehicle) {
                return Err(invalid(
                    &route.id,
                    &format!("vehicle {} already assigned to route {}", vehicle, other),
                ));
            }
        }
        for vehicle in &route.vehicles {
            self.vehicle_routes
                .insert(vehicle.clone(), route.id.clone());
        }

        for (index, stop) in route.stops.iter().enumerate() {
            self.stop_routes
                .entry(stop.id.clone())
                .or_default()
                .push((route.id.clone(), index));
        }

        self.routes.insert(route.id.clone(), Arc::new(route));
        Ok(())
    }

    pub fn get(&self, route_id: &str) -> Option<Arc<Route>> {
        self.routes.get(route_id).cloned()
    }

    /// The route a vehicle is assigned to by default.
    pub fn route_for_vehicle(&self, vehicle_id: &str) -> Option<Arc<Route>> {
        self.vehicle_routes
            .get(vehicle_id)
            .and_then(|route_id| self.get(route_id))
    }

    /// Every route serving `stop_id`, with the stop's index on that route.
    pub fn routes_serving(&self, stop_id: &str) -> Vec<(Arc<Route>, usize)> {
        self.stop_routes
            .get(stop_id)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|(route_id, index)| self.get(route_id).map(|r| (r, *index)))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn routes(&self) -> Vec<Arc<Route>> {
        let mut routes: Vec<_> = self.routes.values().cloned().collect();
        routes.sort_by(|a, b| a.id.cmp(&b.id));
        routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

fn build_route(definition: RouteDefinition, fallback_speed: f64) -> Result<Route, RouteError> {
    let id = definition.id.trim().to_string();
    if id.is_empty() {
        return Err(invalid("<unnamed>", "route id must not be empty"));
    }
    if definition.stops.len() < 2 {
        return Err(invalid(&id, "a route needs at least two stops"));
    }

    let mut seen = HashSet::new();
    for stop in &definition.stops {
        if !seen.insert(stop.id.as_str()) {
            return Err(invalid(&id, &format!("duplicate stop id {}", stop.id)));
        }
        if !stop.position().is_valid() {
            return Err(invalid(
                &id,
                &format!("stop {} has invalid coordinates", stop.id),
            ));
        }
    }

    let geometry: Vec<Coordinate> = definition
        .geometry
        .iter()
        .map(|[lat, lng]| Coordinate::new(*lat, *lng))
        .collect();
    if geometry.iter().any(|p| !p.is_valid()) {
        return Err(invalid(&id, "geometry contains invalid coordinates"));
    }

    let speed = definition.default_speed_kmh.unwrap_or(fallback_speed);
    if !speed.is_finite() || speed <= 0.0 {
        return Err(invalid(&id, "default_speed_kmh must be positive"));
    }

    let name = definition.name.unwrap_or_else(|| id.clone());
    Ok(Route::new(
        id,
        name,
        definition.stops,
        geometry,
        speed,
        definition.capacity,
        definition.vehicles,
    ))
}

fn invalid(route: &str, message: &str) -> RouteError {
    RouteError::Invalid {
        route: route.to_string(),
        message: message.to_string(),
    }
}
