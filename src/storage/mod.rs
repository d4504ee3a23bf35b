//! Monitor persistence

pub mod file;
pub mod memory;
pub mod store;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use store::{MonitorStore, StoreError};

use std::future::Future;
use std::time::Duration;

/// Bound a storage call so one slow backend cannot stall a caller indefinitely
pub async fn with_timeout<T, F>(timeout: Duration, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| StoreError::Timeout)?
}
