use std::fs;
use std::path::Path;

use rastro_core::TrackerConfig;

/// High-level configuration for the console tracking demo
#[derive(Clone, Debug)]
pub struct ConsoleConfig {
    pub tracker: TrackerConfig,
    /// How often the live summary is printed
    pub print_interval_secs: u64,
    /// Replay this subject's last hour of history at startup, when set
    pub history_subject: Option<i64>,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            tracker: TrackerConfig::default(),
            print_interval_secs: std::env::var("RASTRO_PRINT_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(15),
            history_subject: std::env::var("RASTRO_HISTORY_SUBJECT")
                .ok()
                .and_then(|v| v.parse::<i64>().ok()),
        }
    }
}

impl ConsoleConfig {
    /// Load configuration from a TOML file (path via RASTRO_CONSOLE_CONFIG or
    /// ./console_tracker.toml), overlaying values onto env-driven defaults.
    pub fn load() -> Self {
        let default = Self::default();
        let path = std::env::var("RASTRO_CONSOLE_CONFIG")
            .unwrap_or_else(|_| "console_tracker.toml".into());
        let p = Path::new(&path);
        if !p.exists() {
            tracing::info!(target: "console_tracker", path = %path, "No TOML config found; using defaults/env");
            return default;
        }
        match fs::read_to_string(p) {
            Ok(s) => match toml::from_str::<ConsoleToml>(&s) {
                Ok(t) => t.overlay(default),
                Err(e) => {
                    tracing::warn!(target: "console_tracker", error = %e, "Failed to parse TOML; using defaults");
                    default
                }
            },
            Err(e) => {
                tracing::warn!(target: "console_tracker", error = %e, "Failed to read TOML; using defaults");
                default
            }
        }
    }
}

// =========================
// TOML overlay definitions
// =========================

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct ConsoleToml {
    pub print_interval_secs: Option<u64>,
    pub history_subject: Option<i64>,
    pub tracker: Option<TrackerToml>,
}

impl ConsoleToml {
    fn overlay(self, mut base: ConsoleConfig) -> ConsoleConfig {
        if let Some(v) = self.print_interval_secs {
            base.print_interval_secs = v;
        }
        if let Some(v) = self.history_subject {
            base.history_subject = Some(v);
        }
        if let Some(t) = self.tracker {
            t.apply(&mut base.tracker);
        }
        base
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct TrackerToml {
    pub server_url: Option<String>,
    pub api_base_url: Option<String>,
    pub map_access_token: Option<String>,
    pub snapshot_request_delay_ms: Option<u64>,
    pub reconnect_attempts: Option<u32>,
    pub reconnect_delay_ms: Option<u64>,
    pub staleness_window_secs: Option<u64>,
    pub sweep_interval_secs: Option<u64>,
    pub request_timeout_ms: Option<u64>,
    pub status_timeout_ms: Option<u64>,
}

impl TrackerToml {
    fn apply(self, t: &mut TrackerConfig) {
        if let Some(v) = self.server_url {
            t.server_url = v;
        }
        if let Some(v) = self.api_base_url {
            t.api_base_url = v;
        }
        if let Some(v) = self.map_access_token {
            t.map_access_token = Some(v);
        }
        if let Some(v) = self.snapshot_request_delay_ms {
            t.snapshot_request_delay_ms = v;
        }
        if let Some(v) = self.reconnect_attempts {
            t.reconnect_attempts = v;
        }
        if let Some(v) = self.reconnect_delay_ms {
            t.reconnect_delay_ms = v;
        }
        if let Some(v) = self.staleness_window_secs {
            t.staleness_window_secs = v;
        }
        if let Some(v) = self.sweep_interval_secs {
            t.sweep_interval_secs = v;
        }
        if let Some(v) = self.request_timeout_ms {
            t.request_timeout_ms = v;
        }
        if let Some(v) = self.status_timeout_ms {
            t.status_timeout_ms = v;
        }
    }
}
