//! Notification handlers for monitor alerts

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::bridge::{AlertBridge, NotifyError};
use crate::events::StateChange;

/// Notification target
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum NotifyTarget {
    /// Log to tracing
    Log,
    /// HTTP webhook
    Webhook {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
}

/// [`AlertBridge`] that fans out to a fixed set of targets
pub struct Notifier {
    client: reqwest::Client,
    targets: Vec<NotifyTarget>,
}

impl Notifier {
    /// Create a notifier that only logs
    pub fn new() -> Self {
        Self::with_targets(vec![NotifyTarget::Log])
    }

    pub fn with_targets(targets: Vec<NotifyTarget>) -> Self {
        Self {
            client: reqwest::Client::new(),
            targets,
        }
    }

    /// Bound each webhook request
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Failed to build HTTP client, using defaults");
                reqwest::Client::new()
            });
        self
    }

    pub fn targets(&self) -> &[NotifyTarget] {
        &self.targets
    }

    /// Send notification to a single target
    async fn notify_target(
        &self,
        change: &StateChange,
        target: &NotifyTarget,
    ) -> Result<(), NotifyError> {
        match target {
            NotifyTarget::Log => {
                tracing::warn!(
                    monitor_id = %change.monitor_id,
                    monitor_name = %change.monitor_name,
                    service_id = %change.service_id,
                    kind = %change.kind,
                    "Heartbeat monitor {} -> {}",
                    change.from,
                    change.to
                );
                Ok(())
            }
            NotifyTarget::Webhook { url, headers } => self.send_webhook(change, url, headers).await,
        }
    }

    /// Send webhook notification
    async fn send_webhook(
        &self,
        change: &StateChange,
        url: &str,
        headers: &HashMap<String, String>,
    ) -> Result<(), NotifyError> {
        let payload = serde_json::json!({
            "monitor_id": change.monitor_id,
            "monitor_name": change.monitor_name,
            "service_id": change.service_id,
            "kind": change.kind,
            "from": change.from,
            "to": change.to,
            "last_heartbeat": change.last_heartbeat.map(|t| t.to_rfc3339()),
            "timestamp": change.at.to_rfc3339(),
        });

        let mut request = self.client.post(url).json(&payload);

        for (key, value) in headers {
            request = request.header(key, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| NotifyError::Webhook(format!("Failed to send webhook: {}", e)))?;

        if !response.status().is_success() {
            return Err(NotifyError::Webhook(format!(
                "Webhook returned status {}",
                response.status()
            )));
        }

        tracing::debug!(
            monitor_id = %change.monitor_id,
            url = %url,
            "Webhook notification sent"
        );

        Ok(())
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AlertBridge for Notifier {
    async fn notify(&self, change: &StateChange) -> Result<(), NotifyError> {
        let mut errors = Vec::new();

        for target in &self.targets {
            if let Err(e) = self.notify_target(change, target).await {
                errors.push(e);
            }
        }

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(NotifyError::Multiple(errors)),
        }
    }
}
