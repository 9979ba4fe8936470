//! Inventory event publisher
//!
//! Emits `StockReserved`/`StockDepleted`, enveloped with a per-order
//! sequence, or as the legacy flat payloads when `PUBLISH_ENVELOPED_EVENTS`
//! is off.

use chrono::Utc;
use contracts::{
    DepletedLine, LegacyStockDepleted, LegacyStockReserved, StockDepletedV1, StockLine,
    StockReservedV1, STOCK_DEPLETED, STOCK_RESERVED,
};
use event_bus::{EventBus, EventEnvelope, EventMetadata};
use event_sequencing::sequence;
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

use crate::events::EventError;

const PUBLISH_TIMEOUT: Duration = Duration::from_secs(3);

pub struct InventoryEventPublisher {
    bus: Arc<dyn EventBus>,
    pool: PgPool,
    producer: String,
    publish_enveloped: bool,
}

impl InventoryEventPublisher {
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

    pub async fn publish_stock_reserved(
        &self,
        order_id: &str,
        user_id: &str,
        reserved: Vec<StockLine>,
        meta: EventMetadata,
    ) -> Result<(), EventError> {
        if !self.publish_enveloped {
            let legacy = LegacyStockReserved {
                event_type: STOCK_RESERVED.name.to_string(),
                order_id: order_id.to_string(),
                user_id: user_id.to_string(),
                items: reserved,
                timestamp: Utc::now(),
            };
            return self.publish_json(STOCK_RESERVED.routing_key, &legacy).await;
        }

        let seq = sequence::next_sequence(&self.pool, order_id).await?;

        let envelope = EventEnvelope::new(
            STOCK_RESERVED.name,
            STOCK_RESERVED.version,
            &self.producer,
            order_id,
            seq,
            STOCK_RESERVED.schema,
            StockReservedV1 {
                order_id: order_id.to_string(),
                user_id: user_id.to_string(),
                items: reserved,
                timestamp: Utc::now(),
            },
            meta,
        );

        self.publish_json(STOCK_RESERVED.routing_key, &envelope).await
    }

    pub async fn publish_stock_depleted(
        &self,
        order_id: &str,
        user_id: &str,
        depleted: Vec<DepletedLine>,
        reserved: Vec<StockLine>,
        meta: EventMetadata,
    ) -> Result<(), EventError> {
        if !self.publish_enveloped {
            let legacy = LegacyStockDepleted {
                event_type: STOCK_DEPLETED.name.to_string(),
                order_id: order_id.to_string(),
                user_id: user_id.to_string(),
                depleted,
                reserved,
                timestamp: Utc::now(),
            };
            return self.publish_json(STOCK_DEPLETED.routing_key, &legacy).await;
        }

        let seq = sequence::next_sequence(&self.pool, order_id).await?;

        let envelope = EventEnvelope::new(
            STOCK_DEPLETED.name,
            STOCK_DEPLETED.version,
            &self.producer,
            order_id,
            seq,
            STOCK_DEPLETED.schema,
            StockDepletedV1 {
                order_id: order_id.to_string(),
                user_id: user_id.to_string(),
                depleted,
                reserved,
                timestamp: Utc::now(),
            },
            meta,
        );

        self.publish_json(STOCK_DEPLETED.routing_key, &envelope).await
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
