//! Timeout detection and alert dispatch
//!
//! The evaluator sweeps all monitors, flips timed-out ones to `Unhealthy`
//! and hands each new timeout to an [`AlertBridge`] exactly once.

pub mod bridge;
pub mod evaluator;
pub mod notifier;
pub mod worker;

pub use bridge::{AlertBridge, NotifyError};
pub use evaluator::{EvaluatorSettings, SweepReport, TimeoutEvaluator};
pub use notifier::{Notifier, NotifyTarget};
pub use worker::TimeoutWorker;
