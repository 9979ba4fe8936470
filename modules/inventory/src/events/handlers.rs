//! Consumer reserving stock for created orders
//!
//! Reservation, dedup advance and commit happen in one transaction; the
//! resulting `StockReserved` or `StockDepleted` publishes after commit with
//! the incoming correlation id and causation set to the incoming event id.

use async_trait::async_trait;
use contracts::{
    LegacyOrderCreated, OrderCreatedV1, StockLine, ORDER_CREATED,
};
use event_bus::{
    decode, BusMessage, Decoded, EnvelopeError, EventHandler, EventMetadata, HandlerError,
};
use event_sequencing::{dedup, SequenceCheck};
use sqlx::PgPool;
use std::sync::Arc;

use crate::events::publisher::InventoryEventPublisher;
use crate::events::EventError;
use crate::repos::stock_repo;
use crate::reservations::ReservationCache;

const CONSUMER_ORDER_CREATED: &str = "inventory-service.order-created";

/// Reserves stock for a created order and publishes the outcome.
pub struct OrderCreatedHandler {
    pool: PgPool,
    publisher: Arc<InventoryEventPublisher>,
    cache: Arc<ReservationCache>,
    consume_enveloped: bool,
}

impl OrderCreatedHandler {
    pub fn new(
        pool: PgPool,
        publisher: Arc<InventoryEventPublisher>,
        cache: Arc<ReservationCache>,
        consume_enveloped: bool,
    ) -> Self {
        Self {
            pool,
            publisher,
            cache,
            consume_enveloped,
        }
    }

    async fn process(&self, msg: &BusMessage) -> Result<(), EventError> {
        let decoded: Decoded<OrderCreatedV1, LegacyOrderCreated> = if self.consume_enveloped {
            decode(&msg.payload, ORDER_CREATED.name, ORDER_CREATED.version)?
        } else {
            Decoded::Legacy(serde_json::from_slice(&msg.payload).map_err(|e| {
                EventError::Envelope(EnvelopeError::Invalid(format!("legacy parse: {}", e)))
            })?)
        };

        let (payload, meta, gate): (OrderCreatedV1, EventMetadata, Option<(String, i64)>) =
            match decoded {
                Decoded::Enveloped(env) => {
                    let meta = EventMetadata::caused_by(&env);
                    let gate = Some((env.partition_key.clone(), env.sequence));
                    (env.payload, meta, gate)
                }
                Decoded::Legacy(legacy) => (legacy.into(), EventMetadata::root(), None),
            };

        if payload.order_id.is_empty() {
            return Err(EventError::Envelope(EnvelopeError::Invalid(
                "missing orderId".to_string(),
            )));
        }

        if let Some((partition_key, sequence)) = &gate {
            let last = dedup::get_last(&self.pool, CONSUMER_ORDER_CREATED, partition_key).await?;
            match SequenceCheck::classify(*sequence, last) {
                SequenceCheck::Duplicate => {
                    tracing::info!(
                        partition_key = %partition_key,
                        sequence = sequence,
                        "duplicate OrderCreated skipped"
                    );
                    return Ok(());
                }
                SequenceCheck::Gap { expected } => {
                    tracing::warn!(
                        partition_key = %partition_key,
                        sequence = sequence,
                        expected = expected,
                        "sequence gap detected, processing anyway"
                    );
                }
                SequenceCheck::InOrder => {}
            }
        }

        // Skip empty/invalid lines; sort so concurrent orders lock product
        // rows in the same sequence and cannot deadlock each other
        let mut lines: Vec<StockLine> = payload
            .items
            .iter()
            .filter(|it| !it.product_id.is_empty() && it.quantity > 0)
            .map(|it| StockLine {
                product_id: it.product_id.clone(),
                quantity: it.quantity,
            })
            .collect();
        lines.sort_by(|a, b| a.product_id.cmp(&b.product_id));

        let outcome = match self.cache.get(&payload.order_id) {
            Some(prior) => {
                tracing::info!(
                    order_id = %payload.order_id,
                    "reservation already completed in this process, republishing outcome"
                );
                prior
            }
            None => {
                let mut tx = self.pool.begin().await?;
                let outcome = stock_repo::tx_reserve(&mut tx, &lines).await?;
                if let Some((partition_key, sequence)) = &gate {
                    dedup::tx_advance(&mut tx, CONSUMER_ORDER_CREATED, partition_key, *sequence)
                        .await?;
                }
                tx.commit().await?;
                self.cache.remember(&payload.order_id, outcome.clone());
                outcome
            }
        };

        if outcome.is_depleted() {
            tracing::info!(
                order_id = %payload.order_id,
                depleted = outcome.depleted.len(),
                "stock depleted for order"
            );
            self.publisher
                .publish_stock_depleted(
                    &payload.order_id,
                    &payload.user_id,
                    outcome.depleted,
                    outcome.reserved,
                    meta,
                )
                .await?;
        } else {
            tracing::info!(
                order_id = %payload.order_id,
                lines = outcome.reserved.len(),
                "stock reserved for order"
            );
            self.publisher
                .publish_stock_reserved(&payload.order_id, &payload.user_id, outcome.reserved, meta)
                .await?;
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for OrderCreatedHandler {
    async fn handle(&self, msg: BusMessage) -> Result<(), HandlerError> {
        self.process(&msg).await.map_err(Into::into)
    }
}
