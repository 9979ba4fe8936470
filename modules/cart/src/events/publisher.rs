//! CartCheckedOut publisher
//!
//! The cart id is the partition key, so every checkout of the same cart
//! shares one sequence stream. With `PUBLISH_ENVELOPED_EVENTS` off the
//! legacy flat payload goes out instead; consumers accept both during
//! rollout.

use chrono::Utc;
use contracts::{
    CartCheckedOutV1, CartItem, LegacyCartCheckedOut, CART_CHECKED_OUT,
};
use event_bus::{EventBus, EventEnvelope, EventMetadata};
use event_sequencing::sequence;
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

use crate::events::EventError;
use crate::repos::cart_repo::Cart;

const PUBLISH_TIMEOUT: Duration = Duration::from_secs(3);

pub struct CartEventPublisher {
    bus: Arc<dyn EventBus>,
    pool: PgPool,
    producer: String,
    publish_enveloped: bool,
}

impl CartEventPublisher {
    pub fn new(
        bus: Arc<dyn EventBus>,
        pool: PgPool,
        producer: String,
        publish_enveloped: bool,
    ) -> Self {
        Self {
            bus,
            pool,
            producer,
            publish_enveloped,
        }
    }

    pub async fn publish_cart_checked_out(
        &self,
        cart: &Cart,
        meta: EventMetadata,
    ) -> Result<(), EventError> {
        let items: Vec<CartItem> = cart
            .items
            .iter()
            .map(|it| CartItem {
                product_id: it.product_id.clone(),
                quantity: it.quantity,
                price: it.price,
            })
            .collect();

        if !self.publish_enveloped {
            let legacy = LegacyCartCheckedOut {
                event_type: CART_CHECKED_OUT.name.to_string(),
                cart_id: cart.id.clone(),
                user_id: cart.user_id.clone(),
                items,
                total_amount: cart.total_amount(),
                timestamp: Utc::now(),
            };
            return self
                .publish_json(CART_CHECKED_OUT.routing_key, &legacy)
                .await;
        }

        // Fall back to the user id for carts that predate generated ids
        let partition_key = if cart.id.is_empty() {
            cart.user_id.clone()
        } else {
            cart.id.clone()
        };

        let seq = sequence::next_sequence(&self.pool, &partition_key).await?;

        let envelope = EventEnvelope::new(
            CART_CHECKED_OUT.name,
            CART_CHECKED_OUT.version,
            &self.producer,
            &partition_key,
            seq,
            CART_CHECKED_OUT.schema,
            CartCheckedOutV1 {
                cart_id: cart.id.clone(),
                user_id: cart.user_id.clone(),
                items,
                total_amount: cart.total_amount(),
                timestamp: Utc::now(),
            },
            meta,
        );

        self.publish_json(CART_CHECKED_OUT.routing_key, &envelope)
            .await
    }

    async fn publish_json<T: Serialize>(
        &self,
        routing_key: &str,
        event: &T,
    ) -> Result<(), EventError> {
        let body = serde_json::to_vec(event)?;

        tokio::time::timeout(PUBLISH_TIMEOUT, self.bus.publish(routing_key, body))
            .await
            .map_err(|_| EventError::PublishTimeout)??;

        tracing::debug!(routing_key = %routing_key, "event published");
        Ok(())
    }
}
