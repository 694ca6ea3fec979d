use std::env;
use std::time::Duration;

use camera_stream::CameraConfig;
use vehicle_tracking::notifications::DEFAULT_CAPACITY;
use vehicle_tracking::{MonitorConfig, OrderingPolicy, PollerConfig};

const DEFAULT_API_URL: &str = "http://localhost:8080";
const DEFAULT_CAMERA_URL_TEMPLATE: &str = "ws://localhost:8081/camera/{vehicleId}";
const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:3000";

/// Host configuration, read once at start-up.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub access_token: Option<String>,
    pub location_poll_interval: Duration,
    pub trip_poll_interval: Duration,
    pub request_timeout: Option<Duration>,
    pub history_limit: Option<usize>,
    pub ordering: OrderingPolicy,
    pub camera_url_template: String,
    pub listen_addr: String,
    pub notification_capacity: usize,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let millis = |key: &str, default: u64| {
            var(key)
                .and_then(|v| {
                    v.parse::<u64>()
                        .inspect_err(|e| tracing::warn!("invalid {key} `{v}`: {e}, using default"))
                        .ok()
                })
                .unwrap_or(default)
        };

        let ordering = var("OUT_OF_ORDER_POLICY")
            .and_then(|v| {
                v.parse::<OrderingPolicy>()
                    .inspect_err(|e| tracing::warn!("invalid OUT_OF_ORDER_POLICY: {e}, using latest"))
                    .ok()
            })
            .unwrap_or_default();

        // zero means "no limit" for both timeout and history
        let request_timeout =
            Some(millis("REQUEST_TIMEOUT_MS", 10_000)).filter(|ms| *ms > 0).map(Duration::from_millis);
        let history_limit = usize::try_from(millis("HISTORY_LIMIT", 10_000)).ok().filter(|l| *l > 0);

        Self {
            api_url: var("API_URL").unwrap_or_else(|| {
                tracing::trace!("API_URL not set, using default: {DEFAULT_API_URL}");
                DEFAULT_API_URL.to_string()
            }),
            access_token: var("ACCESS_TOKEN"),
            location_poll_interval: Duration::from_millis(millis("LOCATION_POLL_INTERVAL_MS", 5_000)),
            trip_poll_interval: Duration::from_millis(millis("TRIP_POLL_INTERVAL_MS", 10_000)),
            request_timeout,
            history_limit,
            ordering,
            camera_url_template: var("CAMERA_URL_TEMPLATE")
                .unwrap_or_else(|| DEFAULT_CAMERA_URL_TEMPLATE.to_string()),
            listen_addr: var("LISTEN_ADDR").unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string()),
            notification_capacity: usize::try_from(millis(
                "NOTIFICATION_CAPACITY",
                DEFAULT_CAPACITY as u64,
            ))
            .unwrap_or(DEFAULT_CAPACITY),
        }
    }

    pub fn poller(&self) -> PollerConfig {
        PollerConfig {
            interval: self.location_poll_interval,
            request_timeout: self.request_timeout,
            history_limit: self.history_limit,
            ordering: self.ordering,
        }
    }

    pub fn monitor(&self) -> MonitorConfig {
        MonitorConfig { interval: self.trip_poll_interval, request_timeout: self.request_timeout }
    }

    pub fn camera(&self) -> CameraConfig {
        CameraConfig { connect_timeout: self.request_timeout }
    }

    /// Camera socket URL for a vehicle.
    pub fn camera_url(&self, vehicle_id: &str) -> String {
        self.camera_url_template.replace("{vehicleId}", &urlencoding::encode(vehicle_id))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use pretty_assertions::assert_eq;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = config(&[]);

        assert_eq!(config.api_url, "http://localhost:8080");
        assert_eq!(config.access_token, None);
        assert_eq!(config.location_poll_interval, Duration::from_secs(5));
        assert_eq!(config.trip_poll_interval, Duration::from_secs(10));
        assert_eq!(config.request_timeout, Some(Duration::from_secs(10)));
        assert_eq!(config.history_limit, Some(10_000));
        assert_eq!(config.ordering, OrderingPolicy::Latest);
        assert_eq!(config.listen_addr, "127.0.0.1:3000");
        assert_eq!(config.notification_capacity, 100);
    }

    #[test]
    fn overrides() {
        let config = config(&[
            ("API_URL", "https://api.example.com"),
            ("ACCESS_TOKEN", " secret "),
            ("LOCATION_POLL_INTERVAL_MS", "0"),
            ("REQUEST_TIMEOUT_MS", "0"),
            ("HISTORY_LIMIT", "0"),
            ("OUT_OF_ORDER_POLICY", "last-write-wins"),
            ("NOTIFICATION_CAPACITY", "25"),
        ]);

        assert_eq!(config.api_url, "https://api.example.com");
        assert_eq!(config.access_token.as_deref(), Some("secret"));
        assert!(config.poller().interval.is_zero());
        assert_eq!(config.request_timeout, None);
        assert_eq!(config.history_limit, None);
        assert_eq!(config.ordering, OrderingPolicy::LastWriteWins);
        assert_eq!(config.notification_capacity, 25);
    }

    #[test]
    fn invalid_values_fall_back() {
        let config = config(&[("TRIP_POLL_INTERVAL_MS", "soon"), ("OUT_OF_ORDER_POLICY", "newest")]);

        assert_eq!(config.trip_poll_interval, Duration::from_secs(10));
        assert_eq!(config.ordering, OrderingPolicy::Latest);
    }

    #[test]
    fn camera_url() {
        let config = config(&[("CAMERA_URL_TEMPLATE", "wss://cams.example.com/live/{vehicleId}")]);
        assert_eq!(config.camera_url("bus 7"), "wss://cams.example.com/live/bus%207");
    }
}
