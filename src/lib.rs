//! Deadswitch: Dead-Man's-Switch Heartbeat Monitoring
//!
//! A monitor expects periodic "I am alive" heartbeats from an external process
//! (a cron job, batch task or service) and raises an alert when none arrives
//! within its configured timeout.
//!
//! # Features
//!
//! - **Validated Monitors**: UUID service IDs, identifier-style names, timeouts
//!   bounded to 5m..=9000m and truncated to whole minutes
//! - **Explicit State Machine**: `Unknown -> Healthy -> Unhealthy -> Healthy`,
//!   never `Unknown -> Unhealthy`
//! - **Idempotent Heartbeats**: replays and out-of-order pings never move the
//!   last-seen timestamp backwards
//! - **Edge-Triggered Alerts**: one notification per `Healthy -> Unhealthy`
//!   transition, however many sweeps observe it
//! - **Per-Monitor Isolation**: compare-and-save writes, bounded retries and
//!   timeouts; one failing monitor never aborts a sweep
//! - **Pluggable Storage and Alerting**: `MonitorStore` and `AlertBridge`
//!   traits, with in-memory, JSON-file, log and webhook implementations
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use deadswitch::{Monitor, MonitorConfig, MonitorService, Notifier};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let service = MonitorService::open(MonitorConfig::from_env(), Arc::new(Notifier::new())).await?;
//!
//! let monitor = service
//!     .registry()
//!     .create(Monitor::new(
//!         "",
//!         "nightly-backup",
//!         "5c3b4f3e-8f5c-4e4a-9d6c-2b8e0f1a7c11",
//!         Duration::from_secs(30 * 60),
//!     ))
//!     .await?;
//!
//! service.start();
//! service.heartbeat_now(&monitor.id).await?;
//! // ...
//! service.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod alerts;
pub mod clock;
pub mod config;
pub mod events;
pub mod heartbeat;
pub mod monitor;
pub mod service;
pub mod storage;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use alerts::{AlertBridge, Notifier, NotifyError, NotifyTarget, SweepReport, TimeoutEvaluator};
pub use config::MonitorConfig;
pub use events::StateChange;
pub use heartbeat::{HeartbeatEvent, HeartbeatRecorder};
pub use monitor::{Monitor, MonitorRegistry, MonitorState, TransitionKind, ValidationError};
pub use service::MonitorService;
pub use storage::{MonitorStore, StoreError};
