//! Service types for long-running platform clients

use crate::Result;
use async_trait::async_trait;

/// A platform client with background tasks (pollers, dispatchers)
#[async_trait]
pub trait Service: Send + Sync {
    /// Service type name (unique identifier)
    fn service_type(&self) -> &str;

    /// Start background tasks
    async fn start(&mut self) -> Result<()>;

    /// Stop background tasks and wait for them to wind down
    async fn stop(&mut self) -> Result<()>;

    /// Check if service is running
    fn is_running(&self) -> bool;
}
