//! Event bus abstraction.

use crate::error::BusError;
use crate::event::BusEntry;
use async_trait::async_trait;
use flowhook_core::Result;

/// Publishes derived events.
///
/// This abstraction allows fan-out to be tested without NATS while still
/// supporting the JetStream implementation in production.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publishes a single entry and waits for the bus to accept it.
    async fn publish(&self, entry: &BusEntry) -> Result<(), BusError>;
}
