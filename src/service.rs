//! Service wiring
//!
//! Builds the store, recorder, evaluator and sweep worker from a
//! [`MonitorConfig`] and owns their lifecycle.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::alerts::{AlertBridge, EvaluatorSettings, SweepReport, TimeoutEvaluator, TimeoutWorker};
use crate::clock::{Clock, SystemClock};
use crate::config::MonitorConfig;
use crate::events::{StateChange, StateEvents};
use crate::heartbeat::{HeartbeatIngest, HeartbeatRecorder};
use crate::monitor::{HeartbeatOutcome, MonitorRegistry};
use crate::storage::{FileStore, MemoryStore, MonitorStore, StoreError};

/// A running heartbeat monitor
pub struct MonitorService {
    clock: Arc<dyn Clock>,
    events: StateEvents,
    registry: Arc<MonitorRegistry>,
    recorder: Arc<HeartbeatRecorder>,
    evaluator: Arc<TimeoutEvaluator>,
    worker: Arc<TimeoutWorker>,
    worker_handle: Mutex<Option<JoinHandle<()>>>,
}

impl MonitorService {
    /// Open the configured store (file-backed when `data_path` is set) on the
    /// system clock
    pub async fn open(config: MonitorConfig, bridge: Arc<dyn AlertBridge>) -> Result<Self, StoreError> {
        let store: Arc<dyn MonitorStore> = match &config.data_path {
            Some(path) => Arc::new(FileStore::open(path).await?),
            None => {
                tracing::info!("No data path configured, monitors are kept in memory only");
                Arc::new(MemoryStore::new())
            }
        };
        Ok(Self::with_store(config, store, bridge, Arc::new(SystemClock)))
    }

    pub fn with_store(
        config: MonitorConfig,
        store: Arc<dyn MonitorStore>,
        bridge: Arc<dyn AlertBridge>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let events = StateEvents::new(config.event_capacity);

        let registry = Arc::new(
            MonitorRegistry::new(Arc::clone(&store)).with_store_timeout(config.store_timeout),
        );
        let recorder = Arc::new(
            HeartbeatRecorder::new(Arc::clone(&store), events.clone())
                .with_store_timeout(config.store_timeout),
        );
        let evaluator = Arc::new(TimeoutEvaluator::new(
            store,
            bridge,
            events.clone(),
            EvaluatorSettings::from(&config),
        ));
        let worker = Arc::new(TimeoutWorker::new(
            Arc::clone(&evaluator),
            Arc::clone(&clock),
            config.sweep_interval,
        ));

        Self {
            clock,
            events,
            registry,
            recorder,
            evaluator,
            worker,
            worker_handle: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &MonitorRegistry {
        &self.registry
    }

    pub fn recorder(&self) -> Arc<HeartbeatRecorder> {
        Arc::clone(&self.recorder)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.events.subscribe()
    }

    /// New ingest pipeline feeding this service's recorder
    pub fn heartbeat_ingest(&self) -> HeartbeatIngest {
        HeartbeatIngest::new(self.recorder())
    }

    pub async fn record_heartbeat(
        &self,
        monitor_id: &str,
        observed_at: DateTime<Utc>,
    ) -> Result<HeartbeatOutcome, StoreError> {
        self.recorder.record_heartbeat(monitor_id, observed_at).await
    }

    /// Record a heartbeat stamped with the service clock
    pub async fn heartbeat_now(&self, monitor_id: &str) -> Result<HeartbeatOutcome, StoreError> {
        self.record_heartbeat(monitor_id, self.clock.now()).await
    }

    /// Run one sweep immediately at the service clock's "now"
    pub async fn sweep_now(&self) -> Result<SweepReport, StoreError> {
        self.evaluator.sweep(self.clock.now()).await
    }

    /// Start the periodic sweep; no-op if already started
    pub fn start(&self) {
        let mut handle = self.worker_handle.lock();
        if handle.is_none() {
            *handle = Some(Arc::clone(&self.worker).start());
        }
    }

    /// Stop sweeping, letting an in-flight sweep finish
    pub async fn shutdown(&self) {
        self.worker.stop();
        let handle = self.worker_handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Timeout worker terminated abnormally");
            }
        }
        tracing::info!("Heartbeat monitor service stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::monitor::{Monitor, MonitorState, TransitionKind};
    use crate::testing::{at, init_tracing, RecordingBridge, SERVICE_ID};
    use std::time::Duration;

    fn service(clock: Arc<ManualClock>) -> (MonitorService, Arc<RecordingBridge>) {
        let bridge = Arc::new(RecordingBridge::new());
        let config = MonitorConfig::default()
            .with_sweep_interval(Duration::from_millis(10))
            .with_retry_backoff(Duration::from_millis(1));
        let service =
            MonitorService::with_store(config, Arc::new(MemoryStore::new()), bridge.clone(), clock);
        (service, bridge)
    }

    #[tokio::test]
    async fn test_dead_mans_switch_scenario() {
        init_tracing();
        let clock = Arc::new(ManualClock::new(at(0)));
        let (service, bridge) = service(clock.clone());
        let mut events = service.subscribe();

        let monitor = service
            .registry()
            .create(Monitor::new("", "hourly-etl", SERVICE_ID, Duration::from_secs(600)))
            .await
            .unwrap();

        service.heartbeat_now(&monitor.id).await.unwrap();
        assert_eq!(events.recv().await.unwrap().kind, TransitionKind::Reporting);

        clock.set(at(9));
        service.sweep_now().await.unwrap();
        assert_eq!(
            service.registry().get(&monitor.id).await.unwrap().last_state(),
            MonitorState::Healthy
        );

        clock.set(at(11));
        let report = service.sweep_now().await.unwrap();
        assert_eq!(report.timed_out, 1);
        assert_eq!(bridge.call_count(), 1);
        assert_eq!(events.recv().await.unwrap().kind, TransitionKind::TimedOut);

        clock.set(at(20));
        service.sweep_now().await.unwrap();
        assert_eq!(bridge.call_count(), 1);

        clock.set(at(21));
        service.heartbeat_now(&monitor.id).await.unwrap();
        assert_eq!(events.recv().await.unwrap().kind, TransitionKind::Recovered);
        assert_eq!(
            service.registry().get(&monitor.id).await.unwrap().last_state(),
            MonitorState::Healthy
        );
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweeps_and_shutdown() {
        let clock = Arc::new(ManualClock::new(at(0)));
        let (service, bridge) = service(clock.clone());

        let monitor = service
            .registry()
            .create(Monitor::new("", "hourly-etl", SERVICE_ID, Duration::from_secs(300)))
            .await
            .unwrap();
        service.heartbeat_now(&monitor.id).await.unwrap();

        service.start();
        service.start();
        clock.set(at(6));
        tokio::time::sleep(Duration::from_millis(60)).await;
        service.shutdown().await;

        assert_eq!(bridge.call_count(), 1);
    }

    #[tokio::test]
    async fn test_open_with_data_path_persists() {
        let dir = tempfile::tempdir().unwrap();
        let config = MonitorConfig::default().with_data_path(dir.path().join("monitors.json"));

        let id = {
            let service = MonitorService::open(config.clone(), Arc::new(RecordingBridge::new()))
                .await
                .unwrap();
            let monitor = service
                .registry()
                .create(Monitor::new("", "backup", SERVICE_ID, Duration::from_secs(900)))
                .await
                .unwrap();
            service.heartbeat_now(&monitor.id).await.unwrap();
            monitor.id
        };

        let reopened = MonitorService::open(config, Arc::new(RecordingBridge::new()))
            .await
            .unwrap();
        let monitor = reopened.registry().get(&id).await.unwrap();
        assert_eq!(monitor.last_state(), MonitorState::Healthy);
        assert!(monitor.last_heartbeat().is_some());
    }
}
