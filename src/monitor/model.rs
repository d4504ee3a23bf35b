//! Monitor entity and its liveness state machine

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::validate::{self, ValidationError};

/// Shortest allowed timeout
pub const MIN_TIMEOUT: Duration = Duration::from_secs(5 * 60);
/// Longest allowed timeout (~6.25 days)
pub const MAX_TIMEOUT: Duration = Duration::from_secs(9000 * 60);

/// Liveness state of a monitor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorState {
    /// No heartbeat has ever been received
    #[default]
    Unknown,
    Healthy,
    Unhealthy,
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MonitorState::Unknown => write!(f, "unknown"),
            MonitorState::Healthy => write!(f, "healthy"),
            MonitorState::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// What a state change means to an observer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionKind {
    /// `Unknown -> Healthy`: first heartbeat
    Reporting,
    /// `Healthy/Unknown -> Unhealthy`: timeout elapsed
    TimedOut,
    /// `Unhealthy -> Healthy`
    Recovered,
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionKind::Reporting => write!(f, "reporting"),
            TransitionKind::TimedOut => write!(f, "timed_out"),
            TransitionKind::Recovered => write!(f, "recovered"),
        }
    }
}

/// A single edge of the state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: MonitorState,
    pub to: MonitorState,
}

impl Transition {
    fn new(from: MonitorState, to: MonitorState) -> Self {
        Self { from, to }
    }

    pub fn kind(&self) -> TransitionKind {
        match (self.from, self.to) {
            (_, MonitorState::Unhealthy) => TransitionKind::TimedOut,
            (MonitorState::Unhealthy, _) => TransitionKind::Recovered,
            _ => TransitionKind::Reporting,
        }
    }
}

/// Result of folding a heartbeat into a monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatOutcome {
    /// Timestamp was not newer than the last heartbeat; nothing changed
    Stale,
    /// Timestamp advanced, state was already healthy
    Advanced,
    /// Timestamp advanced and the state changed
    Transitioned(Transition),
}

impl HeartbeatOutcome {
    /// Whether the record was modified and needs saving
    pub fn is_modified(&self) -> bool {
        !matches!(self, HeartbeatOutcome::Stale)
    }

    pub fn transition(&self) -> Option<Transition> {
        match self {
            HeartbeatOutcome::Transitioned(t) => Some(*t),
            _ => None,
        }
    }
}

/// A dead-man's-switch: alerts when no heartbeat arrives within `timeout`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Monitor {
    /// Unique ID, immutable after creation
    #[serde(default)]
    pub id: String,
    /// Human-readable label
    pub name: String,
    /// Owning service, used to route alerts
    pub service_id: String,
    /// Maximum allowed gap between heartbeats
    #[serde(rename = "timeout_secs", with = "timeout_secs")]
    pub timeout: Duration,

    #[serde(default)]
    last_state: MonitorState,
    #[serde(default)]
    last_heartbeat: Option<DateTime<Utc>>,
    /// Bumped by the store on every successful save
    #[serde(default)]
    version: u64,
}

impl Monitor {
    /// Create a monitor that has never reported
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        service_id: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            service_id: service_id.into(),
            timeout,
            last_state: MonitorState::Unknown,
            last_heartbeat: None,
            version: 0,
        }
    }

    /// Last known state
    pub fn last_state(&self) -> MonitorState {
        self.last_state
    }

    /// Timestamp of the last accepted heartbeat, `None` if never received
    pub fn last_heartbeat(&self) -> Option<DateTime<Utc>> {
        self.last_heartbeat
    }

    /// Store revision this copy was read at
    pub fn version(&self) -> u64 {
        self.version
    }

    pub(crate) fn set_version(&mut self, version: u64) {
        self.version = version;
    }

    /// Validate all fields and return a copy with the timeout truncated to
    /// whole minutes
    pub fn normalize(&self) -> Result<Monitor, ValidationError> {
        validate::many([
            validate::uuid("ServiceID", &self.service_id),
            validate::id_name("Name", &self.name),
            validate::duration("Timeout", self.timeout, MIN_TIMEOUT, MAX_TIMEOUT),
        ])?;

        let mut normalized = self.clone();
        normalized.timeout = truncate_to_minute(self.timeout);
        Ok(normalized)
    }

    /// Fold a heartbeat observed at `observed_at` into the record
    ///
    /// The timestamp never moves backwards. Only a heartbeat that advances it
    /// can move the monitor to `Healthy`.
    pub fn apply_heartbeat(&mut self, observed_at: DateTime<Utc>) -> HeartbeatOutcome {
        let advances = self.last_heartbeat.map_or(true, |last| observed_at > last);
        if !advances {
            return HeartbeatOutcome::Stale;
        }

        self.last_heartbeat = Some(observed_at);

        if self.last_state == MonitorState::Healthy {
            return HeartbeatOutcome::Advanced;
        }

        let transition = Transition::new(self.last_state, MonitorState::Healthy);
        self.last_state = MonitorState::Healthy;
        HeartbeatOutcome::Transitioned(transition)
    }

    /// Decide whether the monitor should change state at `now`
    ///
    /// Pure: the caller applies the returned transition with [`Monitor::apply`].
    pub fn evaluate(&self, now: DateTime<Utc>) -> Option<Transition> {
        // Never reported: stays Unknown however long it has been.
        let last = self.last_heartbeat?;

        // A heartbeat stamped in the future counts as zero elapsed.
        let elapsed = now.signed_duration_since(last).to_std().unwrap_or(Duration::ZERO);
        let expired = elapsed >= self.timeout;

        match (self.last_state, expired) {
            (MonitorState::Unhealthy, true) => None,
            (from, true) => Some(Transition::new(from, MonitorState::Unhealthy)),
            (MonitorState::Healthy, false) => None,
            (from, false) => Some(Transition::new(from, MonitorState::Healthy)),
        }
    }

    /// Apply a transition returned by [`Monitor::evaluate`]
    pub fn apply(&mut self, transition: Transition) {
        self.last_state = transition.to;
    }
}

/// Truncate toward zero to a whole number of minutes
pub fn truncate_to_minute(d: Duration) -> Duration {
    Duration::from_secs(d.as_secs() / 60 * 60)
}

/// Timeouts are persisted as whole seconds
mod timeout_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(Duration::from_secs(u64::deserialize(deserializer)?))
    }
}
