//! Monitor management: create, edit, delete

use std::sync::Arc;
use std::time::Duration;

use super::model::Monitor;
use super::validate::ValidationError;
use crate::storage::{with_timeout, MonitorStore, StoreError};

const MAX_EDIT_RETRIES: u32 = 8;

/// Fields an edit may change; `None` leaves the field as is
#[derive(Debug, Clone, Default)]
pub struct MonitorEdit {
    pub name: Option<String>,
    pub timeout: Option<Duration>,
}

impl MonitorEdit {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Validated access to the monitor set
pub struct MonitorRegistry {
    store: Arc<dyn MonitorStore>,
    store_timeout: Duration,
}

impl MonitorRegistry {
    pub fn new(store: Arc<dyn MonitorStore>) -> Self {
        Self {
            store,
            store_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Validate and persist a new monitor
    ///
    /// An empty `id` gets a fresh UUID. Liveness fields on the candidate are
    /// ignored: every new monitor starts `Unknown` with no heartbeat.
    pub async fn create(&self, candidate: Monitor) -> Result<Monitor, RegistryError> {
        let normalized = candidate.normalize()?;

        let id = if normalized.id.is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            normalized.id
        };
        let monitor = Monitor::new(id, normalized.name, normalized.service_id, normalized.timeout);

        let saved = with_timeout(self.store_timeout, self.store.insert_monitor(monitor)).await?;
        tracing::info!(
            monitor_id = %saved.id,
            service_id = %saved.service_id,
            timeout_secs = saved.timeout.as_secs(),
            "Heartbeat monitor created"
        );
        Ok(saved)
    }

    pub async fn get(&self, id: &str) -> Result<Monitor, RegistryError> {
        Ok(with_timeout(self.store_timeout, self.store.load_monitor(id)).await?)
    }

    pub async fn list(&self) -> Result<Vec<Monitor>, RegistryError> {
        Ok(with_timeout(self.store_timeout, self.store.load_all_monitors()).await?)
    }

    /// Change name and/or timeout, re-running validation
    ///
    /// State is not re-evaluated here; the next sweep picks up the new
    /// timeout.
    pub async fn edit(&self, id: &str, edit: MonitorEdit) -> Result<Monitor, RegistryError> {
        for _ in 0..MAX_EDIT_RETRIES {
            let mut monitor = with_timeout(self.store_timeout, self.store.load_monitor(id)).await?;

            if let Some(name) = &edit.name {
                monitor.name = name.clone();
            }
            if let Some(timeout) = edit.timeout {
                monitor.timeout = timeout;
            }
            let normalized = monitor.normalize()?;

            match with_timeout(self.store_timeout, self.store.save_monitor(normalized)).await {
                Ok(saved) => {
                    tracing::info!(monitor_id = %saved.id, "Heartbeat monitor updated");
                    return Ok(saved);
                }
                Err(StoreError::Conflict(_)) => tokio::task::yield_now().await,
                Err(e) => return Err(e.into()),
            }
        }

        Err(StoreError::Conflict(id.to_string()).into())
    }

    pub async fn delete(&self, id: &str) -> Result<Monitor, RegistryError> {
        let removed = with_timeout(self.store_timeout, self.store.delete_monitor(id)).await?;
        tracing::info!(monitor_id = %removed.id, "Heartbeat monitor deleted");
        Ok(removed)
    }
}
