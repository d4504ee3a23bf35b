//! Timeout evaluation sweep
//!
//! A sweep loads every monitor, decides each one's transition independently
//! and commits it with a compare-and-save. Only the edge into `Unhealthy`
//! reaches the [`AlertBridge`]; later sweeps over an already-unhealthy monitor
//! decide "no transition" and stay quiet.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::Mutex;

use super::bridge::{AlertBridge, NotifyError};
use crate::config::MonitorConfig;
use crate::events::{StateChange, StateEvents};
use crate::monitor::{Monitor, Transition, TransitionKind};
use crate::storage::{with_timeout, MonitorStore, StoreError};

/// Retry and timeout limits for a sweep
#[derive(Debug, Clone)]
pub struct EvaluatorSettings {
    pub store_timeout: Duration,
    pub notify_timeout: Duration,
    pub max_attempts: u32,
    pub retry_backoff: Duration,
}

impl Default for EvaluatorSettings {
    fn default() -> Self {
        Self::from(&MonitorConfig::default())
    }
}

impl From<&MonitorConfig> for EvaluatorSettings {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            store_timeout: config.store_timeout,
            notify_timeout: config.notify_timeout,
            max_attempts: config.max_attempts.max(1),
            retry_backoff: config.retry_backoff,
        }
    }
}

/// Totals for one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub evaluated: usize,
    pub unchanged: usize,
    pub timed_out: usize,
    /// `Unhealthy -> Healthy`
    pub recovered: usize,
    /// `Unknown -> Healthy` for a monitor that had a heartbeat but no state
    pub reporting: usize,
    pub notified: usize,
    pub notify_failures: usize,
    pub persist_failures: usize,
    /// Deleted between load and commit
    pub skipped: usize,
}

impl SweepReport {
    pub fn transitions(&self) -> usize {
        self.timed_out + self.recovered + self.reporting
    }
}

/// What happened to one monitor during a sweep
#[derive(Debug)]
enum MonitorOutcome {
    Unchanged,
    Transitioned {
        kind: TransitionKind,
        notified: Option<bool>,
    },
    Skipped,
    Failed,
}

/// Periodic timeout detector
pub struct TimeoutEvaluator {
    store: Arc<dyn MonitorStore>,
    bridge: Arc<dyn AlertBridge>,
    events: StateEvents,
    settings: EvaluatorSettings,
    /// Sweeps never overlap
    sweep_lock: Mutex<()>,
}

impl TimeoutEvaluator {
    pub fn new(
        store: Arc<dyn MonitorStore>,
        bridge: Arc<dyn AlertBridge>,
        events: StateEvents,
        settings: EvaluatorSettings,
    ) -> Self {
        Self {
            store,
            bridge,
            events,
            settings,
            sweep_lock: Mutex::new(()),
        }
    }

    /// Evaluate every monitor against `now`
    ///
    /// Fails only when the monitor set itself cannot be loaded. Per-monitor
    /// storage or notification failures are counted in the report.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, StoreError> {
        let _guard = self.sweep_lock.lock().await;

        let monitors = self.load_all().await?;
        let outcomes = join_all(
            monitors
                .into_iter()
                .map(|monitor| self.evaluate_monitor(monitor, now)),
        )
        .await;

        let mut report = SweepReport {
            evaluated: outcomes.len(),
            ..Default::default()
        };

        for outcome in outcomes {
            match outcome {
                MonitorOutcome::Unchanged => report.unchanged += 1,
                MonitorOutcome::Skipped => report.skipped += 1,
                MonitorOutcome::Failed => report.persist_failures += 1,
                MonitorOutcome::Transitioned { kind, notified } => {
                    match kind {
                        TransitionKind::TimedOut => report.timed_out += 1,
                        TransitionKind::Recovered => report.recovered += 1,
                        TransitionKind::Reporting => report.reporting += 1,
                    }
                    match notified {
                        Some(true) => report.notified += 1,
                        Some(false) => report.notify_failures += 1,
                        None => {}
                    }
                }
            }
        }

        if report.transitions() > 0 || report.persist_failures > 0 {
            tracing::info!(
                evaluated = report.evaluated,
                timed_out = report.timed_out,
                recovered = report.recovered,
                reporting = report.reporting,
                notify_failures = report.notify_failures,
                persist_failures = report.persist_failures,
                "Timeout sweep finished"
            );
        } else {
            tracing::debug!(evaluated = report.evaluated, "Timeout sweep finished");
        }

        Ok(report)
    }

    async fn load_all(&self) -> Result<Vec<Monitor>, StoreError> {
        let mut attempt = 1;
        loop {
            match with_timeout(self.settings.store_timeout, self.store.load_all_monitors()).await {
                Ok(monitors) => return Ok(monitors),
                Err(e) if attempt >= self.settings.max_attempts || !e.is_transient() => {
                    tracing::error!(error = %e, "Failed to load monitors for sweep");
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!(error = %e, attempt, "Loading monitors failed, retrying");
                    tokio::time::sleep(self.backoff(attempt)).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Decide and commit one monitor's transition
    async fn evaluate_monitor(&self, mut monitor: Monitor, now: DateTime<Utc>) -> MonitorOutcome {
        // Last write whose outcome is unknown: it failed (timed out, or
        // errored after writing) but may still have landed.
        let mut unconfirmed: Option<(Monitor, Transition)> = None;
        let mut attempt = 1;
        loop {
            let Some(transition) = monitor.evaluate(now) else {
                return MonitorOutcome::Unchanged;
            };

            let mut next = monitor.clone();
            next.apply(transition);
            let mut expected = next.clone();
            expected.set_version(monitor.version() + 1);

            let err = match with_timeout(self.settings.store_timeout, self.store.save_monitor(next)).await {
                Ok(saved) => return self.commit(saved, transition, now).await,
                Err(StoreError::NotFound(_)) => return MonitorOutcome::Skipped,
                Err(e) => e,
            };

            let conflict = matches!(err, StoreError::Conflict(_));
            if !conflict {
                unconfirmed = Some((expected, transition));
            }

            let reloaded =
                with_timeout(self.settings.store_timeout, self.store.load_monitor(&monitor.id)).await;
            let reload_err = match reloaded {
                Ok(fresh) => match unconfirmed.take() {
                    Some((written, transition)) if written == fresh => {
                        tracing::warn!(
                            monitor_id = %fresh.id,
                            error = %err,
                            "Monitor state update landed despite store error"
                        );
                        return self.commit(fresh, transition, now).await;
                    }
                    _ => {
                        // Our write is not there (a heartbeat or edit may have
                        // landed instead); decide again from the stored copy.
                        monitor = fresh;
                        None
                    }
                },
                Err(StoreError::NotFound(_)) => return MonitorOutcome::Skipped,
                Err(e) => Some(e),
            };

            if attempt >= self.settings.max_attempts {
                tracing::error!(
                    monitor_id = %monitor.id,
                    error = %err,
                    attempts = attempt,
                    "Giving up on monitor state update"
                );
                return MonitorOutcome::Failed;
            }

            match reload_err {
                Some(e) => {
                    tracing::warn!(monitor_id = %monitor.id, error = %e, attempt, "Reload failed, retrying");
                    tokio::time::sleep(self.backoff(attempt)).await;
                }
                None if !conflict => {
                    tracing::warn!(monitor_id = %monitor.id, error = %err, attempt, "Saving monitor state failed, retrying");
                    tokio::time::sleep(self.backoff(attempt)).await;
                }
                None => {}
            }

            attempt += 1;
        }
    }

    /// Publish a committed transition and raise the alert on timeout edges
    async fn commit(&self, saved: Monitor, transition: Transition, now: DateTime<Utc>) -> MonitorOutcome {
        let change = StateChange::new(&saved, transition, now);
        let kind = change.kind;
        self.events.publish(change.clone());

        if kind != TransitionKind::TimedOut {
            tracing::info!(
                monitor_id = %saved.id,
                from = %transition.from,
                to = %transition.to,
                "Heartbeat monitor state changed"
            );
            return MonitorOutcome::Transitioned {
                kind,
                notified: None,
            };
        }

        tracing::warn!(
            monitor_id = %saved.id,
            service_id = %saved.service_id,
            timeout_secs = saved.timeout.as_secs(),
            last_heartbeat = ?saved.last_heartbeat(),
            "Heartbeat monitor timed out"
        );

        let result = match tokio::time::timeout(self.settings.notify_timeout, self.bridge.notify(&change)).await {
            Ok(result) => result,
            Err(_) => Err(NotifyError::Timeout),
        };

        if let Err(e) = &result {
            tracing::error!(
                monitor_id = %saved.id,
                error = %e,
                "Failed to send timeout alert"
            );
        }

        MonitorOutcome::Transitioned {
            kind,
            notified: Some(result.is_ok()),
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.settings
            .retry_backoff
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}
