//! Heartbeat recording

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::events::{StateChange, StateEvents};
use crate::monitor::HeartbeatOutcome;
use crate::storage::{with_timeout, MonitorStore, StoreError};

/// Reload-and-retry budget when a concurrent writer wins the race
const MAX_CONFLICT_RETRIES: u32 = 8;

/// Folds heartbeats into persisted monitors
pub struct HeartbeatRecorder {
    store: Arc<dyn MonitorStore>,
    events: StateEvents,
    store_timeout: Duration,
}

impl HeartbeatRecorder {
    pub fn new(store: Arc<dyn MonitorStore>, events: StateEvents) -> Self {
        Self {
            store,
            events,
            store_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Record a heartbeat for `monitor_id` observed at `observed_at`
    ///
    /// Replays and out-of-order heartbeats are accepted and leave the record
    /// unchanged. Storage errors are returned to the caller as-is.
    pub async fn record_heartbeat(
        &self,
        monitor_id: &str,
        observed_at: DateTime<Utc>,
    ) -> Result<HeartbeatOutcome, StoreError> {
        for attempt in 1..=MAX_CONFLICT_RETRIES {
            let mut monitor =
                with_timeout(self.store_timeout, self.store.load_monitor(monitor_id)).await?;

            let outcome = monitor.apply_heartbeat(observed_at);
            if !outcome.is_modified() {
                tracing::debug!(
                    monitor_id = %monitor_id,
                    observed_at = %observed_at,
                    "Ignoring stale heartbeat"
                );
                return Ok(outcome);
            }

            match with_timeout(self.store_timeout, self.store.save_monitor(monitor)).await {
                Ok(saved) => {
                    if let Some(transition) = outcome.transition() {
                        tracing::info!(
                            monitor_id = %saved.id,
                            from = %transition.from,
                            to = %transition.to,
                            "Heartbeat monitor state changed"
                        );
                        self.events
                            .publish(StateChange::new(&saved, transition, observed_at));
                    }
                    return Ok(outcome);
                }
                Err(StoreError::Conflict(_)) => {
                    tracing::debug!(
                        monitor_id = %monitor_id,
                        attempt,
                        "Concurrent update while recording heartbeat, retrying"
                    );
                    tokio::task::yield_now().await;
                }
                Err(e) => return Err(e),
            }
        }

        Err(StoreError::Conflict(monitor_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::{MonitorState, TransitionKind};
    use crate::storage::MemoryStore;
    use crate::testing::{at, sample_monitor, t0, unhealthy_monitor};

    async fn setup(monitors: Vec<crate::monitor::Monitor>) -> (Arc<MemoryStore>, HeartbeatRecorder, StateEvents) {
        let store = Arc::new(MemoryStore::new());
        for m in monitors {
            store.insert_monitor(m).await.unwrap();
        }
        let events = StateEvents::new(16);
        let recorder = HeartbeatRecorder::new(store.clone(), events.clone());
        (store, recorder, events)
    }

    #[tokio::test]
    async fn test_unknown_monitor() {
        let (_, recorder, _) = setup(vec![]).await;
        let err = recorder.record_heartbeat("nope", t0()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_first_heartbeat_marks_healthy() {
        let (store, recorder, events) = setup(vec![sample_monitor("a")]).await;
        let mut rx = events.subscribe();

        let outcome = recorder.record_heartbeat("a", t0()).await.unwrap();
        assert_eq!(outcome.transition().unwrap().kind(), TransitionKind::Reporting);

        let m = store.load_monitor("a").await.unwrap();
        assert_eq!(m.last_state(), MonitorState::Healthy);
        assert_eq!(m.last_heartbeat(), Some(t0()));

        let change = rx.recv().await.unwrap();
        assert_eq!(change.kind, TransitionKind::Reporting);
        assert_eq!(change.from, MonitorState::Unknown);
    }

    #[tokio::test]
    async fn test_replay_is_idempotent() {
        let (store, recorder, events) = setup(vec![sample_monitor("a")]).await;
        recorder.record_heartbeat("a", at(10)).await.unwrap();
        let version = store.load_monitor("a").await.unwrap().version();

        let mut rx = events.subscribe();
        let same = recorder.record_heartbeat("a", at(10)).await.unwrap();
        let older = recorder.record_heartbeat("a", at(3)).await.unwrap();
        assert_eq!(same, HeartbeatOutcome::Stale);
        assert_eq!(older, HeartbeatOutcome::Stale);

        let m = store.load_monitor("a").await.unwrap();
        assert_eq!(m.last_heartbeat(), Some(at(10)));
        assert_eq!(m.last_state(), MonitorState::Healthy);
        assert_eq!(m.version(), version);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_heartbeat_recovers_unhealthy() {
        let (store, recorder, events) = setup(vec![unhealthy_monitor("a", 10, t0())]).await;
        let mut rx = events.subscribe();

        let outcome = recorder.record_heartbeat("a", at(30)).await.unwrap();
        assert_eq!(outcome.transition().unwrap().kind(), TransitionKind::Recovered);
        assert_eq!(
            store.load_monitor("a").await.unwrap().last_state(),
            MonitorState::Healthy
        );

        let change = rx.recv().await.unwrap();
        assert_eq!(change.kind, TransitionKind::Recovered);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_advancing_healthy_emits_nothing() {
        let (_, recorder, events) = setup(vec![sample_monitor("a")]).await;
        recorder.record_heartbeat("a", at(0)).await.unwrap();

        let mut rx = events.subscribe();
        let outcome = recorder.record_heartbeat("a", at(1)).await.unwrap();
        assert_eq!(outcome, HeartbeatOutcome::Advanced);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_concurrent_heartbeats_keep_latest() {
        let (store, recorder, _) = setup(vec![sample_monitor("a")]).await;
        let recorder = Arc::new(recorder);

        let tasks: Vec<_> = (0..20)
            .map(|i| {
                let recorder = Arc::clone(&recorder);
                tokio::spawn(async move { recorder.record_heartbeat("a", at(i)).await })
            })
            .collect();

        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let m = store.load_monitor("a").await.unwrap();
        assert_eq!(m.last_heartbeat(), Some(at(19)));
        assert_eq!(m.last_state(), MonitorState::Healthy);
    }
}
