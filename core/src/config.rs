// Tracker configuration
//
// Defaults follow the behavior of the tracking backend: a 500ms settle delay
// before the snapshot request, 5 bounded reconnect attempts, a 2 minute
// staleness window swept every 30 seconds.

use std::time::Duration;

/// Configuration for a [`crate::Tracker`] instance.
///
/// `Default` reads environment variables so a bare `TrackerConfig::default()`
/// picks up deployment settings without extra plumbing.
#[derive(Clone, Debug)]
pub struct TrackerConfig {
    /// Websocket endpoint of the location-streaming server (ws:// or wss://)
    pub server_url: String,
    /// Base URL of the REST API serving history queries
    pub api_base_url: String,
    /// Access token for the map tile provider, if any
    pub map_access_token: Option<String>,
    /// Settle delay between connect and the full-snapshot request.
    /// Known workaround for server-side session setup, not a protocol rule.
    pub snapshot_request_delay_ms: u64,
    /// Bounded reconnect budget after a dropped connection
    pub reconnect_attempts: u32,
    /// Fixed delay between reconnect attempts
    pub reconnect_delay_ms: u64,
    /// Recency window beyond which a subject is considered offline
    pub staleness_window_secs: u64,
    /// Interval of the staleness sweep
    pub sweep_interval_secs: u64,
    /// HTTP request timeout for history queries
    pub request_timeout_ms: u64,
    /// How long a status query waits for the server's answer
    pub status_timeout_ms: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            server_url: std::env::var("RASTRO_SERVER_URL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "ws://localhost:3000/tracking".to_string()),
            api_base_url: std::env::var("RASTRO_API_BASE_URL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "http://localhost:3000/api".to_string()),
            map_access_token: std::env::var("RASTRO_MAP_TOKEN").ok().filter(|s| !s.is_empty()),
            snapshot_request_delay_ms: env_u64("RASTRO_SNAPSHOT_DELAY_MS", 500),
            reconnect_attempts: env_u64("RASTRO_RECONNECT_ATTEMPTS", 5) as u32,
            reconnect_delay_ms: env_u64("RASTRO_RECONNECT_DELAY_MS", 3_000),
            staleness_window_secs: env_u64("RASTRO_STALENESS_WINDOW_SECS", 120),
            sweep_interval_secs: env_u64("RASTRO_SWEEP_INTERVAL_SECS", 30),
            request_timeout_ms: env_u64("RASTRO_REQUEST_TIMEOUT_MS", 10_000),
            status_timeout_ms: env_u64("RASTRO_STATUS_TIMEOUT_MS", 5_000),
        }
    }
}

impl TrackerConfig {
    pub fn snapshot_request_delay(&self) -> Duration {
        Duration::from_millis(self.snapshot_request_delay_ms)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn staleness_window(&self) -> Duration {
        Duration::from_secs(self.staleness_window_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn status_timeout(&self) -> Duration {
        Duration::from_millis(self.status_timeout_ms)
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}
