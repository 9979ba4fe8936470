pub mod handlers;
pub mod publisher;

use event_bus::{BusError, EnvelopeError};

/// Errors raised while consuming or producing order events.
///
/// Any of these returned from a handler short-circuits to the dispatcher,
/// which dead-letters the message and nacks it.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("decode event: {0}")]
    Envelope(#[from] EnvelopeError),

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("serialize event: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("publish event: {0}")]
    Publish(#[from] BusError),

    #[error("publish timed out")]
    PublishTimeout,
}
