//! NATS-based implementation of the EventBus trait

use crate::{AckHandle, BusError, BusMessage, BusResult, Delivery, EventBus};
use async_nats::Client;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};

/// EventBus implementation backed by a NATS server
///
/// This is the production implementation. A service queue
/// `{serviceName}.{routingKey}` maps onto a NATS queue group, which gives the
/// per-service durable-subscription semantics: each service receives its own
/// copy of a subject, and competing consumers within one service share the
/// group.
///
/// Delivery state lives in the broker, so the per-delivery ack handle is a
/// no-op here; consumers rely on the durable dedup checkpoint for
/// effectively-once processing.
///
/// # Example
/// ```rust,no_run
/// use event_bus::{EventBus, NatsBus};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let nats_client = async_nats::connect("nats://localhost:4222").await?;
/// let bus = NatsBus::new(nats_client);
///
/// bus.publish("order.created.v1", b"hello".to_vec()).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct NatsBus {
    client: Client,
}

impl NatsBus {
    /// Create a new NatsBus from an existing NATS client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Get a reference to the underlying NATS client
    pub fn client(&self) -> &Client {
        &self.client
    }
}

struct BrokerAck;

#[async_trait]
impl AckHandle for BrokerAck {
    async fn ack(&self) {}
    async fn nack(&self) {}
}

#[async_trait]
impl EventBus for NatsBus {
    async fn publish_message(&self, msg: BusMessage) -> BusResult<()> {
        match msg.headers {
            Some(headers) => {
                let mut header_map = async_nats::HeaderMap::new();
                for (key, value) in &headers {
                    header_map.insert(key.as_str(), value.as_str());
                }
                self.client
                    .publish_with_headers(msg.subject, header_map, msg.payload.into())
                    .await
                    .map_err(|e| BusError::PublishError(e.to_string()))?;
            }
            None => {
                self.client
                    .publish(msg.subject, msg.payload.into())
                    .await
                    .map_err(|e| BusError::PublishError(e.to_string()))?;
            }
        }

        Ok(())
    }

    async fn consume(&self, queue: &str, subject: &str) -> BusResult<BoxStream<'static, Delivery>> {
        let subscriber = self
            .client
            .queue_subscribe(subject.to_string(), queue.to_string())
            .await
            .map_err(|e| BusError::SubscribeError(e.to_string()))?;

        // Convert NATS messages to deliveries
        let stream = subscriber.map(|nats_msg| {
            let mut msg = BusMessage::new(nats_msg.subject.to_string(), nats_msg.payload.to_vec());

            if let Some(nats_headers) = nats_msg.headers {
                let mut headers = std::collections::HashMap::new();
                for (key, values) in nats_headers.iter() {
                    // Take the first value for each header
                    if let Some(value) = values.first() {
                        headers.insert(key.to_string(), value.to_string());
                    }
                }
                if !headers.is_empty() {
                    msg = msg.with_headers(headers);
                }
            }

            Delivery::new(msg, Box::new(BrokerAck))
        });

        Ok(stream.boxed())
    }
}
