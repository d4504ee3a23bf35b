//! In-memory monitor store

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::store::{MonitorStore, StoreError};
use crate::monitor::Monitor;

/// DashMap-backed store; each entry is locked independently
#[derive(Debug, Default)]
pub struct MemoryStore {
    monitors: DashMap<String, Monitor>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from previously persisted records, keeping their versions
    pub fn from_monitors(monitors: impl IntoIterator<Item = Monitor>) -> Self {
        let store = Self::new();
        for monitor in monitors {
            store.restore(monitor);
        }
        store
    }

    pub fn len(&self) -> usize {
        self.monitors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.monitors.is_empty()
    }

    /// Copy of every record, sorted by ID
    pub fn snapshot(&self) -> Vec<Monitor> {
        let mut monitors: Vec<Monitor> = self.monitors.iter().map(|e| e.value().clone()).collect();
        monitors.sort_by(|a, b| a.id.cmp(&b.id));
        monitors
    }

    pub(crate) fn get(&self, id: &str) -> Result<Monitor, StoreError> {
        self.monitors
            .get(id)
            .map(|m| m.value().clone())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    pub(crate) fn insert(&self, mut monitor: Monitor) -> Result<Monitor, StoreError> {
        match self.monitors.entry(monitor.id.clone()) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists(monitor.id)),
            Entry::Vacant(slot) => {
                monitor.set_version(1);
                slot.insert(monitor.clone());
                Ok(monitor)
            }
        }
    }

    pub(crate) fn compare_and_save(&self, mut monitor: Monitor) -> Result<Monitor, StoreError> {
        let mut stored = self
            .monitors
            .get_mut(&monitor.id)
            .ok_or_else(|| StoreError::NotFound(monitor.id.clone()))?;

        if stored.version() != monitor.version() {
            return Err(StoreError::Conflict(monitor.id));
        }

        monitor.set_version(stored.version() + 1);
        *stored = monitor.clone();
        Ok(monitor)
    }

    /// Put a record back exactly as it was, version included
    pub(crate) fn restore(&self, monitor: Monitor) {
        self.monitors.insert(monitor.id.clone(), monitor);
    }

    pub(crate) fn remove(&self, id: &str) -> Result<Monitor, StoreError> {
        self.monitors
            .remove(id)
            .map(|(_, m)| m)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }
}

#[async_trait]
impl MonitorStore for MemoryStore {
    async fn load_monitor(&self, id: &str) -> Result<Monitor, StoreError> {
        self.get(id)
    }

    async fn load_all_monitors(&self) -> Result<Vec<Monitor>, StoreError> {
        Ok(self.snapshot())
    }

    async fn insert_monitor(&self, monitor: Monitor) -> Result<Monitor, StoreError> {
        self.insert(monitor)
    }

    async fn save_monitor(&self, monitor: Monitor) -> Result<Monitor, StoreError> {
        self.compare_and_save(monitor)
    }

    async fn delete_monitor(&self, id: &str) -> Result<Monitor, StoreError> {
        self.remove(id)
    }
}
