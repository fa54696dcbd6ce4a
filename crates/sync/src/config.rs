//! Engine configuration.

use std::time::Duration;

/// Tunable parameters for the synchronization engine.
///
/// All fields have defaults suitable for a local backend; override via
/// environment variables with [`SyncConfig::from_env`].
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Backend root URL (default: `http://127.0.0.1:8000`).
    pub base_url: String,
    /// Interval between scan status fetches (default: 2 s).
    pub scan_poll_interval: Duration,
    /// Interval between monitor status fetches (default: 3 s).
    pub monitor_poll_interval: Duration,
    /// Upper bound on waiting for a superseded session's driver to exit.
    pub dispose_timeout: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            scan_poll_interval: Duration::from_secs(2),
            monitor_poll_interval: Duration::from_secs(3),
            dispose_timeout: Duration::from_secs(5),
        }
    }
}

impl SyncConfig {
    /// A config targeting `base_url` with default intervals.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default                 |
    /// |------------------------------|-------------------------|
    /// | `PIIWATCH_API_URL`           | `http://127.0.0.1:8000` |
    /// | `PIIWATCH_SCAN_POLL_SECS`    | `2`                     |
    /// | `PIIWATCH_MONITOR_POLL_SECS` | `3`                     |
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let base_url =
            std::env::var("PIIWATCH_API_URL").unwrap_or(defaults.base_url);

        let scan_poll_interval = std::env::var("PIIWATCH_SCAN_POLL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.scan_poll_interval);

        let monitor_poll_interval = std::env::var("PIIWATCH_MONITOR_POLL_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.monitor_poll_interval);

        Self {
            base_url,
            scan_poll_interval,
            monitor_poll_interval,
            dispose_timeout: defaults.dispose_timeout,
        }
    }
}
