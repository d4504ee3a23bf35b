//! Heartbeat ingestion

pub mod ingest;
pub mod recorder;

pub use ingest::{HeartbeatEvent, HeartbeatIngest, IngestStats};
pub use recorder::HeartbeatRecorder;
