//! Monitor entity, validation and management

pub mod model;
pub mod registry;
pub mod validate;

pub use model::{
    truncate_to_minute, HeartbeatOutcome, Monitor, MonitorState, Transition, TransitionKind,
    MAX_TIMEOUT, MIN_TIMEOUT,
};
pub use registry::{MonitorEdit, MonitorRegistry, RegistryError};
pub use validate::{FieldError, ValidationError};
