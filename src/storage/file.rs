//! JSON snapshot file store
//!
//! Keeps every monitor in memory and rewrites a single JSON snapshot on each
//! mutation. The file is replaced atomically (write to a temp file, then
//! rename), so a crash mid-write leaves the previous snapshot intact. A write
//! that fails rolls the in-memory copy back.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::memory::MemoryStore;
use super::store::{MonitorStore, StoreError};
use crate::monitor::Monitor;

const SCHEMA_VERSION: u32 = 1;

/// On-disk layout
#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    schema_version: u32,
    saved_at: DateTime<Utc>,
    monitors: Vec<Monitor>,
}

/// Write-through store persisted to a JSON file
///
/// Mutations run on their own task: a caller that stops waiting (for
/// example under a timeout) cannot leave the cache and the file out of step.
pub struct FileStore {
    inner: Arc<SnapshotStore>,
}

struct SnapshotStore {
    path: PathBuf,
    cache: MemoryStore,
    /// Held across mutate + persist so snapshots are written in order
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Open the store at `path`, loading the existing snapshot if there is one
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let cache = match tokio::fs::read(&path).await {
            Ok(data) => {
                let snapshot: SnapshotFile = serde_json::from_slice(&data)
                    .map_err(|e| StoreError::Serialization(e.to_string()))?;
                if snapshot.schema_version != SCHEMA_VERSION {
                    return Err(StoreError::Serialization(format!(
                        "unsupported snapshot schema version {}",
                        snapshot.schema_version
                    )));
                }
                tracing::info!(
                    path = %path.display(),
                    monitors = snapshot.monitors.len(),
                    "Restored monitor snapshot"
                );
                MemoryStore::from_monitors(snapshot.monitors)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => MemoryStore::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            inner: Arc::new(SnapshotStore {
                path,
                cache,
                write_lock: Mutex::new(()),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }
}

impl SnapshotStore {
    async fn persist(&self) -> Result<(), StoreError> {
        let snapshot = SnapshotFile {
            schema_version: SCHEMA_VERSION,
            saved_at: Utc::now(),
            monitors: self.cache.snapshot(),
        };
        let data = serde_json::to_vec_pretty(&snapshot)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &data).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        tracing::debug!(
            path = %self.path.display(),
            bytes = data.len(),
            "Monitor snapshot written"
        );
        Ok(())
    }

    async fn insert(&self, monitor: Monitor) -> Result<Monitor, StoreError> {
        let _guard = self.write_lock.lock().await;

        let saved = self.cache.insert(monitor)?;
        if let Err(e) = self.persist().await {
            let _ = self.cache.remove(&saved.id);
            return Err(e);
        }
        Ok(saved)
    }

    async fn save(&self, monitor: Monitor) -> Result<Monitor, StoreError> {
        let _guard = self.write_lock.lock().await;

        let previous = self.cache.get(&monitor.id)?;
        let saved = self.cache.compare_and_save(monitor)?;
        if let Err(e) = self.persist().await {
            // Put the old record back; the lock keeps other writers out.
            self.cache.restore(previous);
            return Err(e);
        }
        Ok(saved)
    }

    async fn delete(&self, id: &str) -> Result<Monitor, StoreError> {
        let _guard = self.write_lock.lock().await;

        let removed = self.cache.remove(id)?;
        if let Err(e) = self.persist().await {
            self.cache.restore(removed);
            return Err(e);
        }
        Ok(removed)
    }
}

/// Drive a mutation to completion on its own task
async fn detached<T, F>(mutation: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(mutation)
        .await
        .map_err(|e| StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
}

#[async_trait]
impl MonitorStore for FileStore {
    async fn load_monitor(&self, id: &str) -> Result<Monitor, StoreError> {
        self.inner.cache.get(id)
    }

    async fn load_all_monitors(&self) -> Result<Vec<Monitor>, StoreError> {
        Ok(self.inner.cache.snapshot())
    }

    async fn insert_monitor(&self, monitor: Monitor) -> Result<Monitor, StoreError> {
        let inner = Arc::clone(&self.inner);
        detached(async move { inner.insert(monitor).await }).await
    }

    async fn save_monitor(&self, monitor: Monitor) -> Result<Monitor, StoreError> {
        let inner = Arc::clone(&self.inner);
        detached(async move { inner.save(monitor).await }).await
    }

    async fn delete_monitor(&self, id: &str) -> Result<Monitor, StoreError> {
        let inner = Arc::clone(&self.inner);
        let id = id.to_string();
        detached(async move { inner.delete(&id).await }).await
    }
}
