//! Shared test fixtures

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;

use crate::alerts::{AlertBridge, EvaluatorSettings, NotifyError};
use crate::events::StateChange;
use crate::monitor::Monitor;
use crate::storage::{MemoryStore, MonitorStore, StoreError};

pub const SERVICE_ID: &str = "5c3b4f3e-8f5c-4e4a-9d6c-2b8e0f1a7c11";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "deadswitch=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
}

/// `t0` plus some minutes
pub fn at(minutes: i64) -> DateTime<Utc> {
    t0() + chrono::Duration::minutes(minutes)
}

/// Never-reported monitor with a 10 minute timeout
pub fn sample_monitor(id: &str) -> Monitor {
    Monitor::new(id, format!("job {}", id), SERVICE_ID, Duration::from_secs(600))
}

pub fn healthy_monitor(id: &str, timeout_mins: u64, last_heartbeat: DateTime<Utc>) -> Monitor {
    let mut m = Monitor::new(id, format!("job {}", id), SERVICE_ID, Duration::from_secs(timeout_mins * 60));
    m.apply_heartbeat(last_heartbeat);
    m
}

pub fn unhealthy_monitor(id: &str, timeout_mins: u64, last_heartbeat: DateTime<Utc>) -> Monitor {
    let mut m = healthy_monitor(id, timeout_mins, last_heartbeat);
    let expired_at = last_heartbeat + chrono::Duration::minutes(timeout_mins as i64);
    let transition = m.evaluate(expired_at).expect("monitor should time out");
    m.apply(transition);
    m
}

pub fn timed_out_change(id: &str) -> StateChange {
    let m = unhealthy_monitor(id, 10, t0());
    let previous = healthy_monitor(id, 10, t0());
    let transition = previous.evaluate(at(10)).expect("monitor should time out");
    StateChange::new(&m, transition, at(10))
}

pub fn fast_settings() -> EvaluatorSettings {
    EvaluatorSettings {
        store_timeout: Duration::from_secs(1),
        notify_timeout: Duration::from_millis(50),
        max_attempts: 3,
        retry_backoff: Duration::from_millis(1),
    }
}

/// Bridge that records every call
#[derive(Default)]
pub struct RecordingBridge {
    calls: Mutex<Vec<StateChange>>,
    failing: Mutex<HashSet<String>>,
    delay: Mutex<Option<Duration>>,
}

impl RecordingBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_for(&self, monitor_id: &str) {
        self.failing.lock().insert(monitor_id.to_string());
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn calls(&self) -> Vec<StateChange> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl AlertBridge for RecordingBridge {
    async fn notify(&self, change: &StateChange) -> Result<(), NotifyError> {
        self.calls.lock().push(change.clone());

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.lock().contains(&change.monitor_id) {
            return Err(NotifyError::Webhook("simulated failure".to_string()));
        }
        Ok(())
    }
}

type SaveHook = Box<dyn FnOnce(&MemoryStore) + Send>;

/// Memory store with injectable save failures and races
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    failing_saves: AtomicUsize,
    failing_after_write: AtomicUsize,
    stall_after_write: Mutex<Option<Duration>>,
    always_failing: Mutex<HashSet<String>>,
    before_save: Mutex<Option<SaveHook>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    /// Fail the next `n` saves with an IO error
    pub fn fail_saves(&self, n: usize) {
        self.failing_saves.store(n, Ordering::SeqCst);
    }

    /// Let the next `n` saves land, then report an IO error anyway
    pub fn fail_saves_after_write(&self, n: usize) {
        self.failing_after_write.store(n, Ordering::SeqCst);
    }

    /// Let every save land, then hang for `delay` before answering
    pub fn stall_saves_after_write(&self, delay: Duration) {
        *self.stall_after_write.lock() = Some(delay);
    }

    /// Fail every save of this monitor
    pub fn fail_saves_for(&self, id: &str) {
        self.always_failing.lock().insert(id.to_string());
    }

    /// Run `hook` against the inner store right before the next save
    pub fn before_next_save<F>(&self, hook: F)
    where
        F: FnOnce(&MemoryStore) + Send + 'static,
    {
        *self.before_save.lock() = Some(Box::new(hook));
    }

    fn io_error() -> StoreError {
        StoreError::Io(std::io::Error::new(std::io::ErrorKind::Other, "simulated failure"))
    }
}

#[async_trait]
impl MonitorStore for FlakyStore {
    async fn load_monitor(&self, id: &str) -> Result<Monitor, StoreError> {
        self.inner.load_monitor(id).await
    }

    async fn load_all_monitors(&self) -> Result<Vec<Monitor>, StoreError> {
        self.inner.load_all_monitors().await
    }

    async fn insert_monitor(&self, monitor: Monitor) -> Result<Monitor, StoreError> {
        self.inner.insert_monitor(monitor).await
    }

    async fn save_monitor(&self, monitor: Monitor) -> Result<Monitor, StoreError> {
        let hook = self.before_save.lock().take();
        if let Some(hook) = hook {
            hook(&self.inner);
        }

        if self.always_failing.lock().contains(&monitor.id) {
            return Err(Self::io_error());
        }

        let pending = self.failing_saves.load(Ordering::SeqCst);
        if pending > 0 {
            self.failing_saves.store(pending - 1, Ordering::SeqCst);
            return Err(Self::io_error());
        }

        let saved = self.inner.save_monitor(monitor).await?;

        let stall = *self.stall_after_write.lock();
        if let Some(delay) = stall {
            tokio::time::sleep(delay).await;
        }

        let landed_failures = self.failing_after_write.load(Ordering::SeqCst);
        if landed_failures > 0 {
            self.failing_after_write.store(landed_failures - 1, Ordering::SeqCst);
            return Err(Self::io_error());
        }

        Ok(saved)
    }

    async fn delete_monitor(&self, id: &str) -> Result<Monitor, StoreError> {
        self.inner.delete_monitor(id).await
    }
}
