//! Order event publisher
//!
//! Builds enveloped `OrderCreated`/`OrderCompleted` events, allocating a
//! per-order sequence right before publication. When
//! `PUBLISH_ENVELOPED_EVENTS` is off, emits the pre-envelope flat payload
//! instead (no sequence is allocated); consumers accept both forms during
//! rollout.

use chrono::Utc;
use contracts::{
    CartItem, LegacyOrderCompleted, LegacyOrderCreated, OrderCompletedV1, OrderCreatedV1,
    ORDER_COMPLETED, ORDER_CREATED,
};
use event_bus::{EventBus, EventEnvelope, EventMetadata};
use event_sequencing::sequence;
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

use crate::events::EventError;
use crate::repos::order_repo::Order;

const PUBLISH_TIMEOUT: Duration = Duration::from_secs(3);

pub struct OrderEventPublisher {
    bus: Arc<dyn EventBus>,
    pool: PgPool,
    producer: String,
    publish_enveloped: bool,
}

impl OrderEventPublisher {
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

    pub async fn publish_order_created(
        &self,
        order: &Order,
        meta: EventMetadata,
    ) -> Result<(), EventError> {
        let items: Vec<CartItem> = order
            .items
            .iter()
            .map(|it| CartItem {
                product_id: it.product_id.clone(),
                quantity: it.quantity,
                price: it.price,
            })
            .collect();

        if !self.publish_enveloped {
            let legacy = LegacyOrderCreated {
                event_type: ORDER_CREATED.name.to_string(),
                order_id: order.id.clone(),
                cart_id: order.cart_id.clone(),
                user_id: order.user_id.clone(),
                items,
                total_amount: order.total_amount,
                timestamp: Utc::now(),
            };
            return self
                .publish_json(ORDER_CREATED.routing_key, &legacy)
                .await;
        }

        let seq = sequence::next_sequence(&self.pool, &order.id).await?;

        let envelope = EventEnvelope::new(
            ORDER_CREATED.name,
            ORDER_CREATED.version,
            &self.producer,
            &order.id,
            seq,
            ORDER_CREATED.schema,
            OrderCreatedV1 {
                order_id: order.id.clone(),
                cart_id: order.cart_id.clone(),
                user_id: order.user_id.clone(),
                items,
                total_amount: order.total_amount,
                timestamp: order.created_at,
            },
            meta,
        );

        self.publish_json(ORDER_CREATED.routing_key, &envelope).await
    }

    pub async fn publish_order_completed(
        &self,
        order_id: &str,
        user_id: &str,
        meta: EventMetadata,
    ) -> Result<(), EventError> {
        if !self.publish_enveloped {
            let legacy = LegacyOrderCompleted {
                event_type: ORDER_COMPLETED.name.to_string(),
                order_id: order_id.to_string(),
                user_id: user_id.to_string(),
                timestamp: Utc::now(),
            };
            return self
                .publish_json(ORDER_COMPLETED.routing_key, &legacy)
                .await;
        }

        let seq = sequence::next_sequence(&self.pool, order_id).await?;

        let envelope = EventEnvelope::new(
            ORDER_COMPLETED.name,
            ORDER_COMPLETED.version,
            &self.producer,
            order_id,
            seq,
            ORDER_COMPLETED.schema,
            OrderCompletedV1 {
                order_id: order_id.to_string(),
                user_id: user_id.to_string(),
                timestamp: Utc::now(),
            },
            meta,
        );

        self.publish_json(ORDER_COMPLETED.routing_key, &envelope)
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
