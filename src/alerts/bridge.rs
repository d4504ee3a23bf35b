//! Interface to the alerting subsystem

use async_trait::async_trait;

use crate::events::StateChange;

/// Raises (or resolves) an alert for a monitor
///
/// Called by the evaluator on `Healthy -> Unhealthy` edges. Failures are
/// reported but never roll back the monitor's state.
#[async_trait]
pub trait AlertBridge: Send + Sync {
    async fn notify(&self, change: &StateChange) -> Result<(), NotifyError>;
}

/// Alert dispatch errors
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Webhook error: {0}")]
    Webhook(String),

    #[error("Notification timed out")]
    Timeout,

    #[error("Multiple notification failures: {0:?}")]
    Multiple(Vec<NotifyError>),
}
