//! Inbound port. The update loop (adapter) calls into the application.

use crate::domain::DomainError;

/// Input port: pulls transport updates and drives the dialogue engine.
#[async_trait::async_trait]
pub trait InputPort: Send + Sync {
    /// Run the update loop until the process stops.
    async fn run(&self) -> Result<(), DomainError>;
}
