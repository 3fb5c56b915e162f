use serde::{Deserialize, Deserializer};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::eta::EstimatorSettings;
use crate::fleet::FleetSettings;
use crate::store::StoreSettings;

pub const ENV_BIND: &str = "TRANSIT_LIVE_BIND";
pub const ENV_STALENESS_WINDOW_SECS: &str = "TRANSIT_LIVE_STALENESS_WINDOW_SECS";
pub const ENV_MAX_QUEUE_DEPTH: &str = "TRANSIT_LIVE_MAX_QUEUE_DEPTH";
pub const ENV_ROUTES_PATH: &str = "TRANSIT_LIVE_ROUTES_PATH";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("{var}: {message}")]
    Env { var: &'static str, message: String },
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    pub routes: RoutesConfig,
    #[serde(default)]
    pub api_keys: Vec<ApiKey>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackingConfig {
    #[serde(default = "default_staleness_window", deserialize_with = "deserialize_duration")]
    pub staleness_window: Duration,
    #[serde(default = "default_sweep_interval", deserialize_with = "deserialize_duration")]
    pub sweep_interval: Duration,
    #[serde(default = "default_max_clock_skew", deserialize_with = "deserialize_duration")]
    pub max_clock_skew: Duration,
    #[serde(default = "default_idle_speed")]
    pub idle_speed_kmh: f64,
    #[serde(default = "default_arrival_radius")]
    pub arrival_radius_m: f64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            staleness_window: default_staleness_window(),
            sweep_interval: default_sweep_interval(),
            max_clock_skew: default_max_clock_skew(),
            idle_speed_kmh: default_idle_speed(),
            arrival_radius_m: default_arrival_radius(),
        }
    }
}

fn default_staleness_window() -> Duration {
    Duration::from_secs(120)
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_max_clock_skew() -> Duration {
    Duration::from_secs(30)
}

fn default_idle_speed() -> f64 {
    1.0
}

fn default_arrival_radius() -> f64 {
    40.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    #[serde(default = "default_max_queue_depth")]
    pub max_queue_depth: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_queue_depth: default_max_queue_depth(),
        }
    }
}

fn default_max_queue_depth() -> usize {
    64
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoutesConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiKey {
    pub key: String,
    pub name: String,
    pub permissions: HashSet<Permission>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ReportLocations,
    ReadLocations,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::ReportLocations => "report_locations",
            Permission::ReadLocations => "read_locations",
        }
    }
}

impl Config {
    /// Read the YAML file, then apply environment overrides.
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let mut config = Self::from_file(path)?;
        config.apply_overrides(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(bind) = lookup(ENV_BIND) {
            self.web.bind = bind;
        }
        if let Some(secs) = lookup(ENV_STALENESS_WINDOW_SECS) {
            let secs: u64 = parse_env(ENV_STALENESS_WINDOW_SECS, &secs)?;
            self.tracking.staleness_window = Duration::from_secs(secs);
        }
        if let Some(depth) = lookup(ENV_MAX_QUEUE_DEPTH) {
            self.stream.max_queue_depth = parse_env(ENV_MAX_QUEUE_DEPTH, &depth)?;
        }
        if let Some(path) = lookup(ENV_ROUTES_PATH) {
            self.routes.path = PathBuf::from(path);
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tracking.staleness_window.is_zero() {
            return Err(ConfigError::Invalid("staleness_window must be > 0".into()));
        }
        if self.tracking.sweep_interval.is_zero() {
            return Err(ConfigError::Invalid("sweep_interval must be > 0".into()));
        }
        if self.stream.max_queue_depth == 0 {
            return Err(ConfigError::Invalid("max_queue_depth must be >= 1".into()));
        }
        let radius = self.tracking.arrival_radius_m;
        if !radius.is_finite() || radius <= 0.0 {
            return Err(ConfigError::Invalid("arrival_radius_m must be > 0".into()));
        }
        Ok(())
    }

    pub fn find_api_key(&self, key: &str) -> Option<&ApiKey> {
        self.api_keys.iter().find(|k| k.key == key)
    }

    pub fn auth_enabled(&self) -> bool {
        !self.api_keys.is_empty()
    }

    pub fn fleet_settings(&self) -> FleetSettings {
        FleetSettings {
            store: StoreSettings {
                staleness_window: to_chrono(self.tracking.staleness_window),
                idle_speed_kmh: self.tracking.idle_speed_kmh,
            },
            estimator: EstimatorSettings {
                arrival_radius_m: self.tracking.arrival_radius_m,
            },
            max_clock_skew: to_chrono(self.tracking.max_clock_skew),
            max_queue_depth: self.stream.max_queue_depth,
        }
    }
}

fn parse_env<T: std::str::FromStr>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Env {
        var,
        message: e.to_string(),
    })
}

fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    humantime::parse_duration(s.trim()).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const CONFIG: &str = r#"
web:
  bind: 127.0.0.1:9000
tracking:
  staleness_window: 90s
  sweep_interval: 5s
routes:
  path: routes.yaml
api_keys:
  - key: device-secret
    name: depot devices
    permissions: [report_locations]
"#;

    #[test]
    fn parses_with_defaults() {
        let config: Config = serde_yaml::from_str(CONFIG).unwrap();
        assert_eq!(config.web.bind, "127.0.0.1:9000");
        assert_eq!(config.tracking.staleness_window, Duration::from_secs(90));
        assert_eq!(config.tracking.sweep_interval, Duration::from_secs(5));
        assert_eq!(config.tracking.max_clock_skew, Duration::from_secs(30));
        assert_eq!(config.stream.max_queue_depth, 64);
        assert!(config.auth_enabled());
        assert!(config
            .find_api_key("device-secret")
            .unwrap()
            .permissions
            .contains(&Permission::ReportLocations));
        config.validate().unwrap();
    }

    #[test]
    fn minimal_config_only_needs_routes() {
        let config: Config = serde_yaml::from_str("routes:\n  path: r.yaml\n").unwrap();
        assert_eq!(config.web.bind, "0.0.0.0:8080");
        assert!(!config.auth_enabled());
    }

    #[test]
    fn environment_overrides_file() {
        let mut config: Config = serde_yaml::from_str(CONFIG).unwrap();
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_STALENESS_WINDOW_SECS, "45"),
            (ENV_MAX_QUEUE_DEPTH, "8"),
            (ENV_ROUTES_PATH, "/data/routes.yaml"),
        ]);
        config
            .apply_overrides(|var| env.get(var).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.tracking.staleness_window, Duration::from_secs(45));
        assert_eq!(config.stream.max_queue_depth, 8);
        assert_eq!(config.routes.path, PathBuf::from("/data/routes.yaml"));
        assert_eq!(config.web.bind, "127.0.0.1:9000");

        let settings = config.fleet_settings();
        assert_eq!(settings.store.staleness_window, chrono::Duration::seconds(45));
        assert_eq!(settings.max_queue_depth, 8);
    }

    #[test]
    fn rejects_bad_override_and_zero_depth() {
        let mut config: Config = serde_yaml::from_str(CONFIG).unwrap();
        let err = config
            .apply_overrides(|var| (var == ENV_MAX_QUEUE_DEPTH).then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { var: ENV_MAX_QUEUE_DEPTH, .. }));

        config.stream.max_queue_depth = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_unparseable_duration() {
        let yaml = "tracking:\n  staleness_window: soon\nroutes:\n  path: r.yaml\n";
        assert!(serde_yaml::from_str::<Config>(yaml).is_err());
    }
}
