pub mod publisher;

use event_bus::BusError;

/// Errors raised while producing cart events
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("serialize event: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("publish event: {0}")]
    Publish(#[from] BusError),

    #[error("publish timed out")]
    PublishTimeout,
}
