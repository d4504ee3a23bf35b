//! State-change events
//!
//! Every transition committed by the recorder or the evaluator is published
//! here. Subscribers that fall behind lose the oldest events (broadcast
//! semantics); the persisted monitor state stays authoritative.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::monitor::{Monitor, MonitorState, Transition, TransitionKind};

/// A committed state transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StateChange {
    pub monitor_id: String,
    pub monitor_name: String,
    pub service_id: String,
    pub from: MonitorState,
    pub to: MonitorState,
    pub kind: TransitionKind,
    /// When the transition was decided
    pub at: DateTime<Utc>,
    pub last_heartbeat: Option<DateTime<Utc>>,
}

impl StateChange {
    pub fn new(monitor: &Monitor, transition: Transition, at: DateTime<Utc>) -> Self {
        Self {
            monitor_id: monitor.id.clone(),
            monitor_name: monitor.name.clone(),
            service_id: monitor.service_id.clone(),
            from: transition.from,
            to: transition.to,
            kind: transition.kind(),
            at,
            last_heartbeat: monitor.last_heartbeat(),
        }
    }
}

/// Broadcast bus for [`StateChange`]s
#[derive(Debug, Clone)]
pub struct StateEvents {
    tx: broadcast::Sender<StateChange>,
}

impl StateEvents {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.tx.subscribe()
    }

    /// Publish to current subscribers; returns how many received it
    pub fn publish(&self, change: StateChange) -> usize {
        // No subscribers is not an error.
        self.tx.send(change).unwrap_or(0)
    }
}

impl Default for StateEvents {
    fn default() -> Self {
        Self::new(1024)
    }
}
