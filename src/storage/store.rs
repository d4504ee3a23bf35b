//! Persistence contract for monitor records

use async_trait::async_trait;

use crate::monitor::Monitor;

/// Storage backend for monitors
///
/// `save_monitor` is a compare-and-set on [`Monitor::version`]: the write only
/// lands if the stored record is still at the version the caller read. This
/// serializes heartbeat recording and timeout sweeps on the same monitor
/// without a global lock.
#[async_trait]
pub trait MonitorStore: Send + Sync {
    /// Load a single monitor
    async fn load_monitor(&self, id: &str) -> Result<Monitor, StoreError>;

    /// Load every known monitor
    async fn load_all_monitors(&self) -> Result<Vec<Monitor>, StoreError>;

    /// Insert a new monitor; fails if the ID is taken
    async fn insert_monitor(&self, monitor: Monitor) -> Result<Monitor, StoreError>;

    /// Replace a monitor if its stored version still matches
    ///
    /// Returns the saved record with its new version.
    async fn save_monitor(&self, monitor: Monitor) -> Result<Monitor, StoreError>;

    /// Remove a monitor
    async fn delete_monitor(&self, id: &str) -> Result<Monitor, StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Monitor '{0}' not found")]
    NotFound(String),

    #[error("Monitor '{0}' already exists")]
    AlreadyExists(String),

    #[error("Monitor '{0}' was modified concurrently")]
    Conflict(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage operation timed out")]
    Timeout,
}

impl StoreError {
    /// Whether retrying the same operation later might succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Io(_) | StoreError::Timeout)
    }
}
