//! Consumers driving the order saga
//!
//! Every handler follows the same discipline: decode (envelope or legacy),
//! check the dedup checkpoint, apply the state change and advance the
//! checkpoint in one transaction, commit, then publish consequences.
//! Publishing after commit is safe because downstream consumers dedupe by
//! sequence and by order identity.

use async_trait::async_trait;
use contracts::{
    CartCheckedOutV1, LegacyCartCheckedOut, LegacyPaymentFailed, LegacyPaymentSucceeded,
    LegacyStockReserved, PaymentFailedV1, PaymentSucceededV1, StockReservedV1, CART_CHECKED_OUT,
    PAYMENT_FAILED, PAYMENT_SUCCEEDED, STOCK_RESERVED,
};
use event_bus::{
    decode, BusMessage, Decoded, EnvelopeError, EventHandler, EventMetadata, HandlerError,
};
use event_sequencing::{dedup, SequenceCheck};
use sqlx::{PgPool, Postgres, Transaction};
use std::sync::Arc;
use uuid::Uuid;

use crate::events::publisher::OrderEventPublisher;
use crate::events::EventError;
use crate::repos::order_repo::{self, Order, OrderItem};

const CONSUMER_CART_CHECKED_OUT: &str = "order-service.cart-checkedout";
const CONSUMER_PAYMENT_SUCCEEDED: &str = "order-service.payment-succeeded";
const CONSUMER_PAYMENT_FAILED: &str = "order-service.payment-failed";
const CONSUMER_STOCK_RESERVED: &str = "order-service.stock-reserved";

/// Dedup partition and sequence of an enveloped delivery; legacy frames
/// carry neither and bypass the checkpoint.
type Gate = Option<(String, i64)>;

/// Check the incoming sequence against the checkpoint. Returns `true` when
/// the delivery is a duplicate and must be acked without side effects.
async fn is_duplicate(pool: &PgPool, consumer: &str, gate: &Gate) -> Result<bool, EventError> {
    let Some((partition_key, sequence)) = gate else {
        return Ok(false);
    };

    let last = dedup::get_last(pool, consumer, partition_key).await?;
    match SequenceCheck::classify(*sequence, last) {
        SequenceCheck::Duplicate => {
            tracing::info!(
                consumer = %consumer,
                partition_key = %partition_key,
                sequence = sequence,
                "duplicate delivery skipped"
            );
            Ok(true)
        }
        SequenceCheck::Gap { expected } => {
            tracing::warn!(
                consumer = %consumer,
                partition_key = %partition_key,
                sequence = sequence,
                expected = expected,
                "sequence gap detected, processing anyway"
            );
            Ok(false)
        }
        SequenceCheck::InOrder => Ok(false),
    }
}

async fn tx_advance_gate(
    tx: &mut Transaction<'_, Postgres>,
    consumer: &str,
    gate: &Gate,
) -> Result<(), EventError> {
    if let Some((partition_key, sequence)) = gate {
        dedup::tx_advance(tx, consumer, partition_key, *sequence).await?;
    }
    Ok(())
}

fn legacy_only<L: serde::de::DeserializeOwned>(body: &[u8]) -> Result<L, EventError> {
    serde_json::from_slice(body)
        .map_err(|e| EventError::Envelope(EnvelopeError::Invalid(format!("legacy parse: {}", e))))
}

// ---------------------------------------------------------------------------
// cart.checkedout.v1
// ---------------------------------------------------------------------------

/// Creates the order row from a checked-out cart and publishes
/// `OrderCreated`.
pub struct CartCheckedOutHandler {
    pool: PgPool,
    publisher: Arc<OrderEventPublisher>,
    consume_enveloped: bool,
}

impl CartCheckedOutHandler {
    pub fn new(pool: PgPool, publisher: Arc<OrderEventPublisher>, consume_enveloped: bool) -> Self {
        Self {
            pool,
            publisher,
            consume_enveloped,
        }
    }

    async fn process(&self, msg: &BusMessage) -> Result<(), EventError> {
        let decoded: Decoded<CartCheckedOutV1, LegacyCartCheckedOut> = if self.consume_enveloped {
            decode(&msg.payload, CART_CHECKED_OUT.name, CART_CHECKED_OUT.version)?
        } else {
            Decoded::Legacy(legacy_only(&msg.payload)?)
        };

        let (payload, meta, gate): (CartCheckedOutV1, EventMetadata, Gate) = match decoded {
            Decoded::Enveloped(env) => {
                let meta = EventMetadata::caused_by(&env);
                let gate = Some((env.partition_key.clone(), env.sequence));
                (env.payload, meta, gate)
            }
            Decoded::Legacy(legacy) => (legacy.into(), EventMetadata::root(), None),
        };

        if payload.cart_id.is_empty() || payload.user_id.is_empty() {
            return Err(EventError::Envelope(EnvelopeError::Invalid(
                "missing cartId or userId".to_string(),
            )));
        }

        if is_duplicate(&self.pool, CONSUMER_CART_CHECKED_OUT, &gate).await? {
            return Ok(());
        }

        let order = Order {
            id: Uuid::new_v4().to_string(),
            cart_id: payload.cart_id,
            user_id: payload.user_id,
            total_amount: payload.total_amount,
            status: order_repo::status::PENDING.to_string(),
            payment_ok: false,
            stock_ok: false,
            payment_error: None,
            created_at: payload.timestamp,
            items: payload
                .items
                .into_iter()
                .map(|it| OrderItem {
                    product_id: it.product_id,
                    quantity: it.quantity,
                    price: it.price,
                })
                .collect(),
        };

        let mut tx = self.pool.begin().await?;
        order_repo::tx_create(&mut tx, &order).await?;
        tx_advance_gate(&mut tx, CONSUMER_CART_CHECKED_OUT, &gate).await?;
        tx.commit().await?;

        self.publisher.publish_order_created(&order, meta).await?;

        tracing::info!(
            order_id = %order.id,
            cart_id = %order.cart_id,
            user_id = %order.user_id,
            "order created from checked-out cart"
        );
        Ok(())
    }
}

#[async_trait]
impl EventHandler for CartCheckedOutHandler {
    async fn handle(&self, msg: BusMessage) -> Result<(), HandlerError> {
        self.process(&msg).await.map_err(Into::into)
    }
}

// ---------------------------------------------------------------------------
// payment.succeeded.v1
// ---------------------------------------------------------------------------

/// Raises the payment flag and completes the order when stock is already in.
pub struct PaymentSucceededHandler {
    pool: PgPool,
    publisher: Arc<OrderEventPublisher>,
    consume_enveloped: bool,
}

impl PaymentSucceededHandler {
    pub fn new(pool: PgPool, publisher: Arc<OrderEventPublisher>, consume_enveloped: bool) -> Self {
        Self {
            pool,
            publisher,
            consume_enveloped,
        }
    }

    async fn process(&self, msg: &BusMessage) -> Result<(), EventError> {
        let decoded: Decoded<PaymentSucceededV1, LegacyPaymentSucceeded> = if self.consume_enveloped
        {
            decode(&msg.payload, PAYMENT_SUCCEEDED.name, PAYMENT_SUCCEEDED.version)?
        } else {
            Decoded::Legacy(legacy_only(&msg.payload)?)
        };

        let (order_id, meta, gate): (String, EventMetadata, Gate) = match decoded {
            Decoded::Enveloped(env) => {
                let meta = EventMetadata::caused_by(&env);
                let gate = Some((env.partition_key.clone(), env.sequence));
                (env.payload.order_id, meta, gate)
            }
            Decoded::Legacy(legacy) => (legacy.order_id, EventMetadata::root(), None),
        };

        if is_duplicate(&self.pool, CONSUMER_PAYMENT_SUCCEEDED, &gate).await? {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        let updated = order_repo::tx_set_payment_ok(&mut tx, &order_id).await?;
        tx_advance_gate(&mut tx, CONSUMER_PAYMENT_SUCCEEDED, &gate).await?;
        let completed = order_repo::tx_try_complete(&mut tx, &order_id).await?;
        tx.commit().await?;

        if updated == 0 {
            tracing::warn!(order_id = %order_id, "payment succeeded for unknown order");
        }

        if let Some(user_id) = completed {
            self.publisher
                .publish_order_completed(&order_id, &user_id, meta)
                .await?;
            tracing::info!(order_id = %order_id, "order completed (after payment success)");
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for PaymentSucceededHandler {
    async fn handle(&self, msg: BusMessage) -> Result<(), HandlerError> {
        self.process(&msg).await.map_err(Into::into)
    }
}

// ---------------------------------------------------------------------------
// stock.reserved.v1
// ---------------------------------------------------------------------------

/// Raises the stock flag and completes the order when payment is already in.
pub struct StockReservedHandler {
    pool: PgPool,
    publisher: Arc<OrderEventPublisher>,
    consume_enveloped: bool,
}

impl StockReservedHandler {
    pub fn new(pool: PgPool, publisher: Arc<OrderEventPublisher>, consume_enveloped: bool) -> Self {
        Self {
            pool,
            publisher,
            consume_enveloped,
        }
    }

    async fn process(&self, msg: &BusMessage) -> Result<(), EventError> {
        let decoded: Decoded<StockReservedV1, LegacyStockReserved> = if self.consume_enveloped {
            decode(&msg.payload, STOCK_RESERVED.name, STOCK_RESERVED.version)?
        } else {
            Decoded::Legacy(legacy_only(&msg.payload)?)
        };

        let (order_id, meta, gate): (String, EventMetadata, Gate) = match decoded {
            Decoded::Enveloped(env) => {
                let meta = EventMetadata::caused_by(&env);
                let gate = Some((env.partition_key.clone(), env.sequence));
                (env.payload.order_id, meta, gate)
            }
            Decoded::Legacy(legacy) => (legacy.order_id, EventMetadata::root(), None),
        };

        if is_duplicate(&self.pool, CONSUMER_STOCK_RESERVED, &gate).await? {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        let updated = order_repo::tx_set_stock_ok(&mut tx, &order_id).await?;
        tx_advance_gate(&mut tx, CONSUMER_STOCK_RESERVED, &gate).await?;
        let completed = order_repo::tx_try_complete(&mut tx, &order_id).await?;
        tx.commit().await?;

        if updated == 0 {
            tracing::warn!(order_id = %order_id, "stock reserved for unknown order");
        }

        if let Some(user_id) = completed {
            self.publisher
                .publish_order_completed(&order_id, &user_id, meta)
                .await?;
            tracing::info!(order_id = %order_id, "order completed (after stock reserved)");
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for StockReservedHandler {
    async fn handle(&self, msg: BusMessage) -> Result<(), HandlerError> {
        self.process(&msg).await.map_err(Into::into)
    }
}

// ---------------------------------------------------------------------------
// payment.failed.v1
// ---------------------------------------------------------------------------

/// Moves the order to its terminal `payment_failed` state. Later
/// `PaymentSucceeded`/`StockReserved` deliveries stay flag-only and can no
/// longer complete the order.
pub struct PaymentFailedHandler {
    pool: PgPool,
    consume_enveloped: bool,
}

impl PaymentFailedHandler {
    pub fn new(pool: PgPool, consume_enveloped: bool) -> Self {
        Self {
            pool,
            consume_enveloped,
        }
    }

    async fn process(&self, msg: &BusMessage) -> Result<(), EventError> {
        let decoded: Decoded<PaymentFailedV1, LegacyPaymentFailed> = if self.consume_enveloped {
            decode(&msg.payload, PAYMENT_FAILED.name, PAYMENT_FAILED.version)?
        } else {
            Decoded::Legacy(legacy_only(&msg.payload)?)
        };

        let (order_id, reason, gate): (String, String, Gate) = match decoded {
            Decoded::Enveloped(env) => {
                let gate = Some((env.partition_key.clone(), env.sequence));
                (env.payload.order_id, env.payload.reason, gate)
            }
            Decoded::Legacy(legacy) => (legacy.order_id, legacy.reason, None),
        };

        if is_duplicate(&self.pool, CONSUMER_PAYMENT_FAILED, &gate).await? {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        let updated = order_repo::tx_mark_payment_failed(&mut tx, &order_id, &reason).await?;
        tx_advance_gate(&mut tx, CONSUMER_PAYMENT_FAILED, &gate).await?;
        tx.commit().await?;

        if updated == 0 {
            tracing::warn!(
                order_id = %order_id,
                "payment failed for unknown or already-terminal order"
            );
        } else {
            tracing::info!(order_id = %order_id, reason = %reason, "order payment failed");
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for PaymentFailedHandler {
    async fn handle(&self, msg: BusMessage) -> Result<(), HandlerError> {
        self.process(&msg).await.map_err(Into::into)
    }
}
