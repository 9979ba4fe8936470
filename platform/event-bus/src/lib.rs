//! # EventBus Abstraction
//!
//! A platform-level abstraction for event-driven messaging across services.
//!
//! ## Why This Lives in Tier 1
//!
//! The EventBus is a **shared runtime capability** that every service depends
//! on. Placing it in `platform/` allows:
//! - Services to depend on platform crates without circular dependencies
//! - Plug-and-play service development (services don't depend on each other)
//! - Config-driven swap between NATS (production) and InMemory (dev/test)
//!
//! ## Implementations
//!
//! - **NatsBus**: Production implementation; queue-group subscriptions give
//!   each service its own `{service}.{routingKey}` subscription
//! - **InMemoryBus**: Test/dev implementation with topic-exchange routing and
//!   ack bookkeeping
//!
//! ## Usage
//!
//! ```rust,no_run
//! use event_bus::{EventBus, InMemoryBus};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let bus: Arc<dyn EventBus> = Arc::new(InMemoryBus::new());
//!
//! // Publish an event
//! let payload = serde_json::to_vec(&serde_json::json!({
//!     "eventName": "OrderCreated",
//!     "orderId": "123"
//! }))?;
//! bus.publish("order.created.v1", payload).await?;
//!
//! // Consume through a service-owned queue
//! let mut stream = bus.consume("order-service.order.created.v1", "order.created.v1").await?;
//! if let Some(delivery) = futures::StreamExt::next(&mut stream).await {
//!     println!("received {} bytes on {}", delivery.message.payload.len(), delivery.message.subject);
//!     delivery.ack().await;
//! }
//! # Ok(())
//! # }
//! ```

mod dispatcher;
mod envelope;
mod inmemory_bus;
mod nats_bus;

pub use dispatcher::{Dispatcher, DispatcherHandle, EventHandler, HandlerError};
pub use envelope::{decode, Decoded, EnvelopeError, EventEnvelope, EventMetadata};
pub use inmemory_bus::{AckOutcome, AckRecord, InMemoryBus};
pub use nats_bus::NatsBus;

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::collections::HashMap;
use std::fmt;

/// A message carried by the event bus
#[derive(Debug, Clone)]
pub struct BusMessage {
    /// The subject/routing key this message was published to
    pub subject: String,
    /// The message payload (raw bytes)
    pub payload: Vec<u8>,
    /// Optional headers (used by the dead-letter path for failure metadata)
    pub headers: Option<HashMap<String, String>>,
}

impl BusMessage {
    /// Create a new bus message
    pub fn new(subject: String, payload: Vec<u8>) -> Self {
        Self {
            subject,
            payload,
            headers: None,
        }
    }

    /// Add headers to the message
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = Some(headers);
        self
    }
}

/// Errors that can occur when using the event bus
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("failed to publish message: {0}")]
    PublishError(String),

    #[error("failed to subscribe to subject: {0}")]
    SubscribeError(String),

    #[error("connection error: {0}")]
    ConnectionError(String),

    #[error("internal error: {0}")]
    InternalError(String),
}

/// Result type for event bus operations
pub type BusResult<T> = Result<T, BusError>;

/// Transport-specific acknowledgement of a single delivery.
///
/// `InMemoryBus` records the outcome so tests can assert the delivery policy.
/// Core NATS delivery state is broker-owned, so its handle is a no-op; the
/// durable dedup checkpoint is what makes processing effectively-once.
#[async_trait]
pub trait AckHandle: Send + Sync {
    async fn ack(&self);
    /// Reject without requeue. The broker must not redeliver.
    async fn nack(&self);
}

/// A single delivery from a queue subscription, acknowledged manually.
pub struct Delivery {
    pub message: BusMessage,
    acker: Box<dyn AckHandle>,
}

impl Delivery {
    pub fn new(message: BusMessage, acker: Box<dyn AckHandle>) -> Self {
        Self { message, acker }
    }

    /// Acknowledge successful processing. Consumes the delivery so each
    /// message gets exactly one outcome.
    pub async fn ack(self) {
        self.acker.ack().await;
    }

    /// Reject without requeue.
    pub async fn nack(self) {
        self.acker.nack().await;
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("subject", &self.message.subject)
            .field("bytes", &self.message.payload.len())
            .finish()
    }
}

/// Core event bus abstraction for topic-routed publish-subscribe messaging.
///
/// Publishers route by subject (`{domain}.{name}.v{version}`); consumers own a
/// durable queue per routing key, named `{serviceName}.{routingKey}`, which
/// isolates per-consumer delivery state.
#[async_trait]
pub trait EventBus: Send + Sync {
    /// Publish a message, headers included, to its subject.
    async fn publish_message(&self, msg: BusMessage) -> BusResult<()>;

    /// Open a queue subscription bound to `subject`.
    ///
    /// Within one subscription deliveries arrive in publish order; across
    /// subscriptions there is no ordering. Deliveries require a manual
    /// [`Delivery::ack`] or [`Delivery::nack`].
    async fn consume(&self, queue: &str, subject: &str) -> BusResult<BoxStream<'static, Delivery>>;

    /// Publish a bare payload to a subject.
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> BusResult<()> {
        self.publish_message(BusMessage::new(subject.to_string(), payload))
            .await
    }
}

impl fmt::Debug for dyn EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventBus")
    }
}
