//! Runtime configuration
//!
//! Environment variables:
//! - `DEADSWITCH_SWEEP_INTERVAL_SECS`: Seconds between timeout sweeps (default: 60)
//! - `DEADSWITCH_STORE_TIMEOUT_MS`: Bound on each storage call (default: 5000)
//! - `DEADSWITCH_NOTIFY_TIMEOUT_MS`: Bound on each alert dispatch (default: 10000)
//! - `DEADSWITCH_MAX_ATTEMPTS`: Write attempts per monitor per sweep (default: 3)
//! - `DEADSWITCH_RETRY_BACKOFF_MS`: First retry delay, doubled per attempt (default: 200)
//! - `DEADSWITCH_EVENT_CAPACITY`: State-change bus capacity (default: 1024)
//! - `DEADSWITCH_DATA_PATH`: JSON snapshot file; in-memory only when unset

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Monitor service configuration
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub sweep_interval: Duration,
    pub store_timeout: Duration,
    pub notify_timeout: Duration,
    pub max_attempts: u32,
    pub retry_backoff: Duration,
    pub event_capacity: usize,
    pub data_path: Option<PathBuf>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(60),
            store_timeout: Duration::from_secs(5),
            notify_timeout: Duration::from_secs(10),
            max_attempts: 3,
            retry_backoff: Duration::from_millis(200),
            event_capacity: 1024,
            data_path: None,
        }
    }
}

impl MonitorConfig {
    /// Read configuration from `DEADSWITCH_*` variables, falling back to defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let parse = |key: &str| lookup(key).and_then(|v| parse_trimmed::<u64>(&v));

        Self {
            sweep_interval: parse("DEADSWITCH_SWEEP_INTERVAL_SECS")
                .filter(|s| *s > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.sweep_interval),
            store_timeout: parse("DEADSWITCH_STORE_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.store_timeout),
            notify_timeout: parse("DEADSWITCH_NOTIFY_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.notify_timeout),
            max_attempts: lookup("DEADSWITCH_MAX_ATTEMPTS")
                .and_then(|v| parse_trimmed::<u32>(&v))
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_attempts),
            retry_backoff: parse("DEADSWITCH_RETRY_BACKOFF_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.retry_backoff),
            event_capacity: lookup("DEADSWITCH_EVENT_CAPACITY")
                .and_then(|v| parse_trimmed::<usize>(&v))
                .filter(|n| *n > 0)
                .unwrap_or(defaults.event_capacity),
            data_path: lookup("DEADSWITCH_DATA_PATH")
                .filter(|p| !p.trim().is_empty())
                .map(PathBuf::from),
        }
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_data_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_path = Some(path.into());
        self
    }

    pub fn with_retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }
}

fn parse_trimmed<T: FromStr>(value: &str) -> Option<T> {
    value.trim().parse().ok()
}
