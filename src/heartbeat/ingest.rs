//! Transport-agnostic heartbeat ingest
//!
//! Whatever receives pings (HTTP, a queue consumer, ...) pushes
//! [`HeartbeatEvent`]s into an mpsc channel; this task drains it into the
//! recorder. The task ends once every sender has been dropped.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::recorder::HeartbeatRecorder;
use crate::monitor::HeartbeatOutcome;
use crate::storage::StoreError;

/// A heartbeat received for a monitor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatEvent {
    pub monitor_id: String,
    pub observed_at: DateTime<Utc>,
}

impl HeartbeatEvent {
    pub fn new(monitor_id: impl Into<String>, observed_at: DateTime<Utc>) -> Self {
        Self {
            monitor_id: monitor_id.into(),
            observed_at,
        }
    }
}

/// Ingest counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub received: u64,
    pub recorded: u64,
    pub stale: u64,
    pub unknown_monitor: u64,
    pub errors: u64,
}

/// Drains heartbeat events into a [`HeartbeatRecorder`]
pub struct HeartbeatIngest {
    recorder: Arc<HeartbeatRecorder>,
    stats: Arc<RwLock<IngestStats>>,
}

impl HeartbeatIngest {
    pub fn new(recorder: Arc<HeartbeatRecorder>) -> Self {
        Self {
            recorder,
            stats: Arc::new(RwLock::new(IngestStats::default())),
        }
    }

    pub fn stats(&self) -> IngestStats {
        self.stats.read().clone()
    }

    /// Spawn the ingest loop for `rx`
    pub fn start(&self, mut rx: mpsc::Receiver<HeartbeatEvent>) -> tokio::task::JoinHandle<()> {
        let recorder = Arc::clone(&self.recorder);
        let stats = Arc::clone(&self.stats);

        tokio::spawn(async move {
            tracing::info!("Heartbeat ingest started");

            while let Some(event) = rx.recv().await {
                let result = recorder
                    .record_heartbeat(&event.monitor_id, event.observed_at)
                    .await;
                Self::account(&stats, &event, result);
            }

            tracing::info!("Heartbeat ingest stopped");
        })
    }

    fn account(
        stats: &RwLock<IngestStats>,
        event: &HeartbeatEvent,
        result: Result<HeartbeatOutcome, StoreError>,
    ) {
        let mut stats = stats.write();
        stats.received += 1;

        match result {
            Ok(HeartbeatOutcome::Stale) => stats.stale += 1,
            Ok(_) => stats.recorded += 1,
            Err(StoreError::NotFound(_)) => {
                stats.unknown_monitor += 1;
                tracing::warn!(
                    monitor_id = %event.monitor_id,
                    "Heartbeat for unknown monitor"
                );
            }
            Err(e) => {
                stats.errors += 1;
                tracing::error!(
                    monitor_id = %event.monitor_id,
                    error = %e,
                    "Failed to record heartbeat"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::StateEvents;
    use crate::monitor::MonitorState;
    use crate::storage::{MemoryStore, MonitorStore};
    use crate::testing::{at, sample_monitor};

    #[tokio::test]
    async fn test_ingest_drains_channel() {
        let store = Arc::new(MemoryStore::new());
        store.insert_monitor(sample_monitor("a")).await.unwrap();

        let recorder = Arc::new(HeartbeatRecorder::new(store.clone(), StateEvents::default()));
        let ingest = HeartbeatIngest::new(recorder);

        let (tx, rx) = mpsc::channel(8);
        let handle = ingest.start(rx);

        tx.send(HeartbeatEvent::new("a", at(1))).await.unwrap();
        tx.send(HeartbeatEvent::new("a", at(5))).await.unwrap();
        tx.send(HeartbeatEvent::new("a", at(2))).await.unwrap();
        tx.send(HeartbeatEvent::new("ghost", at(5))).await.unwrap();
        drop(tx);

        handle.await.unwrap();

        assert_eq!(
            ingest.stats(),
            IngestStats {
                received: 4,
                recorded: 2,
                stale: 1,
                unknown_monitor: 1,
                errors: 0,
            }
        );

        let m = store.load_monitor("a").await.unwrap();
        assert_eq!(m.last_heartbeat(), Some(at(5)));
        assert_eq!(m.last_state(), MonitorState::Healthy);
    }

    #[test]
    fn test_event_deserialize() {
        let event: HeartbeatEvent = serde_json::from_str(
            r#"{"monitor_id":"a","observed_at":"2024-03-01T12:05:00Z"}"#,
        )
        .unwrap();
        assert_eq!(event, HeartbeatEvent::new("a", at(5)));
    }
}
