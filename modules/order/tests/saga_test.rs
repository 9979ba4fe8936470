//! Order saga integration tests
//!
//! Drives the consumers directly against a live Postgres and an in-memory
//! bus, asserting the saga's dedup, completion and terminal-failure
//! behavior.
//!
//! Run with: `DATABASE_URL=postgres://... cargo test -p order-service -- --ignored`

mod common;

use contracts::{
    CartCheckedOutV1, CartItem, OrderCompletedV1, OrderCreatedV1, PaymentFailedV1,
    PaymentSucceededV1, StockReservedV1, CART_CHECKED_OUT, ORDER_COMPLETED, ORDER_CREATED,
    PAYMENT_FAILED, PAYMENT_SUCCEEDED, STOCK_RESERVED,
};
use event_bus::{
    BusMessage, Delivery, EventBus, EventEnvelope, EventHandler, EventMetadata, InMemoryBus,
};
use futures::stream::BoxStream;
use futures::StreamExt;
use order_service::repos::order_repo::{self, status, Order};
use order_service::{
    CartCheckedOutHandler, OrderEventPublisher, PaymentFailedHandler, PaymentSucceededHandler,
    StockReservedHandler,
};
use serial_test::serial;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

struct SagaFixture {
    pool: PgPool,
    cart_handler: CartCheckedOutHandler,
    payment_handler: PaymentSucceededHandler,
    payment_failed_handler: PaymentFailedHandler,
    stock_handler: StockReservedHandler,
    created_stream: BoxStream<'static, Delivery>,
    completed_stream: BoxStream<'static, Delivery>,
}

async fn setup() -> SagaFixture {
    let pool = common::get_test_pool().await;
    let bus = Arc::new(InMemoryBus::new());

    // Probe queues observe what the saga publishes
    let probe = Uuid::new_v4();
    let created_stream = bus
        .consume(&format!("probe-{}.order.created", probe), ORDER_CREATED.routing_key)
        .await
        .unwrap();
    let completed_stream = bus
        .consume(
            &format!("probe-{}.order.completed", probe),
            ORDER_COMPLETED.routing_key,
        )
        .await
        .unwrap();

    let publisher = Arc::new(OrderEventPublisher::new(
        bus.clone() as Arc<dyn EventBus>,
        pool.clone(),
        "order-service".to_string(),
        true,
    ));

    SagaFixture {
        cart_handler: CartCheckedOutHandler::new(pool.clone(), publisher.clone(), true),
        payment_handler: PaymentSucceededHandler::new(pool.clone(), publisher.clone(), true),
        payment_failed_handler: PaymentFailedHandler::new(pool.clone(), true),
        stock_handler: StockReservedHandler::new(pool.clone(), publisher.clone(), true),
        pool,
        created_stream,
        completed_stream,
    }
}

fn enveloped<T: serde::Serialize>(
    ident: &contracts::EventIdent,
    producer: &str,
    partition_key: &str,
    sequence: i64,
    payload: T,
) -> (BusMessage, EventEnvelope<T>) {
    let envelope = EventEnvelope::new(
        ident.name,
        ident.version,
        producer,
        partition_key,
        sequence,
        ident.schema,
        payload,
        EventMetadata::root(),
    );
    let body = envelope.encode().unwrap();
    (BusMessage::new(ident.routing_key.to_string(), body), envelope)
}

fn cart_checked_out(cart_id: &str, user_id: &str, seq: i64) -> (BusMessage, EventEnvelope<CartCheckedOutV1>) {
    enveloped(
        &CART_CHECKED_OUT,
        "cart-service",
        cart_id,
        seq,
        CartCheckedOutV1 {
            cart_id: cart_id.to_string(),
            user_id: user_id.to_string(),
            items: vec![
                CartItem {
                    product_id: "A".to_string(),
                    quantity: 2,
                    price: 10.0,
                },
                CartItem {
                    product_id: "B".to_string(),
                    quantity: 1,
                    price: 20.0,
                },
            ],
            total_amount: 40.0,
            timestamp: chrono::Utc::now(),
        },
    )
}

fn payment_succeeded(order_id: &str, seq: i64) -> (BusMessage, EventEnvelope<PaymentSucceededV1>) {
    enveloped(
        &PAYMENT_SUCCEEDED,
        "payment-service",
        order_id,
        seq,
        PaymentSucceededV1 {
            order_id: order_id.to_string(),
            user_id: String::new(),
            timestamp: chrono::Utc::now(),
        },
    )
}

fn payment_failed(order_id: &str, reason: &str, seq: i64) -> (BusMessage, EventEnvelope<PaymentFailedV1>) {
    enveloped(
        &PAYMENT_FAILED,
        "payment-service",
        order_id,
        seq,
        PaymentFailedV1 {
            order_id: order_id.to_string(),
            user_id: String::new(),
            reason: reason.to_string(),
            timestamp: chrono::Utc::now(),
        },
    )
}

fn stock_reserved(order_id: &str, seq: i64) -> (BusMessage, EventEnvelope<StockReservedV1>) {
    enveloped(
        &STOCK_RESERVED,
        "inventory-service",
        order_id,
        seq,
        StockReservedV1 {
            order_id: order_id.to_string(),
            user_id: String::new(),
            items: vec![contracts::StockLine {
                product_id: "A".to_string(),
                quantity: 2,
            }],
            timestamp: chrono::Utc::now(),
        },
    )
}

async fn next_event<T: serde::de::DeserializeOwned>(
    stream: &mut BoxStream<'static, Delivery>,
) -> EventEnvelope<T> {
    let delivery = tokio::time::timeout(Duration::from_secs(2), stream.next())
        .await
        .expect("timeout waiting for published event")
        .expect("stream ended");
    let envelope = serde_json::from_slice(&delivery.message.payload).expect("enveloped event");
    delivery.ack().await;
    envelope
}

async fn assert_no_event(stream: &mut BoxStream<'static, Delivery>) {
    let result = tokio::time::timeout(Duration::from_millis(200), stream.next()).await;
    assert!(result.is_err(), "unexpected event published");
}

async fn order_by_cart(pool: &PgPool, cart_id: &str) -> Order {
    let order_id = sqlx::query_scalar::<_, String>("SELECT id FROM orders WHERE cart_id = $1")
        .bind(cart_id)
        .fetch_one(pool)
        .await
        .expect("order row exists");
    order_repo::get(pool, &order_id).await.unwrap().unwrap()
}

#[tokio::test]
#[serial]
#[ignore] // Requires Postgres
async fn cart_checkout_creates_pending_order_and_publishes_order_created() {
    let mut fx = setup().await;
    let cart_id = format!("cart-{}", Uuid::new_v4());

    let (msg, trigger) = cart_checked_out(&cart_id, "u1", 1);
    fx.cart_handler.handle(msg).await.unwrap();

    let order = order_by_cart(&fx.pool, &cart_id).await;
    assert_eq!(order.status, status::PENDING);
    assert!(!order.payment_ok);
    assert!(!order.stock_ok);
    assert_eq!(order.items.len(), 2);
    assert_eq!(order.total_amount, 40.0);

    let created: EventEnvelope<OrderCreatedV1> = next_event(&mut fx.created_stream).await;
    assert_eq!(created.payload.order_id, order.id);
    assert_eq!(created.partition_key, order.id);
    assert_eq!(created.sequence, 1);
    // Correlation propagates, causation points at the trigger
    assert_eq!(created.correlation_id, trigger.correlation_id);
    assert_eq!(created.causation_id, Some(trigger.event_id));
}

#[tokio::test]
#[serial]
#[ignore] // Requires Postgres
async fn duplicate_cart_checkout_creates_a_single_order() {
    let mut fx = setup().await;
    let cart_id = format!("cart-{}", Uuid::new_v4());

    let (msg, _) = cart_checked_out(&cart_id, "u1", 1);
    fx.cart_handler.handle(msg.clone()).await.unwrap();
    fx.cart_handler.handle(msg).await.unwrap();

    let count =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM orders WHERE cart_id = $1")
            .bind(&cart_id)
            .fetch_one(&fx.pool)
            .await
            .unwrap();
    assert_eq!(count, 1);

    let _first: EventEnvelope<OrderCreatedV1> = next_event(&mut fx.created_stream).await;
    assert_no_event(&mut fx.created_stream).await;
}

#[tokio::test]
#[serial]
#[ignore] // Requires Postgres
async fn payment_then_stock_completes_exactly_once() {
    let mut fx = setup().await;
    let cart_id = format!("cart-{}", Uuid::new_v4());

    let (msg, _) = cart_checked_out(&cart_id, "u5", 1);
    fx.cart_handler.handle(msg).await.unwrap();
    let order = order_by_cart(&fx.pool, &cart_id).await;

    // Payment arrives first: flag only, no completion yet
    let (msg, _) = payment_succeeded(&order.id, 1);
    fx.payment_handler.handle(msg).await.unwrap();

    let mid = order_repo::get(&fx.pool, &order.id).await.unwrap().unwrap();
    assert!(mid.payment_ok);
    assert_eq!(mid.status, status::PENDING);
    assert_no_event(&mut fx.completed_stream).await;

    // Stock arrives second: order completes
    let (msg, trigger) = stock_reserved(&order.id, 1);
    fx.stock_handler.handle(msg).await.unwrap();

    let done = order_repo::get(&fx.pool, &order.id).await.unwrap().unwrap();
    assert_eq!(done.status, status::COMPLETED);

    let completed: EventEnvelope<OrderCompletedV1> = next_event(&mut fx.completed_stream).await;
    assert_eq!(completed.payload.order_id, order.id);
    assert_eq!(completed.payload.user_id, "u5");
    assert_eq!(completed.correlation_id, trigger.correlation_id);
    assert_eq!(completed.causation_id, Some(trigger.event_id));

    assert_no_event(&mut fx.completed_stream).await;
}

#[tokio::test]
#[serial]
#[ignore] // Requires Postgres
async fn stock_then_payment_completes_exactly_once() {
    let mut fx = setup().await;
    let cart_id = format!("cart-{}", Uuid::new_v4());

    let (msg, _) = cart_checked_out(&cart_id, "u6", 1);
    fx.cart_handler.handle(msg).await.unwrap();
    let order = order_by_cart(&fx.pool, &cart_id).await;

    let (msg, _) = stock_reserved(&order.id, 1);
    fx.stock_handler.handle(msg).await.unwrap();
    assert_no_event(&mut fx.completed_stream).await;

    let (msg, _) = payment_succeeded(&order.id, 1);
    fx.payment_handler.handle(msg).await.unwrap();

    let done = order_repo::get(&fx.pool, &order.id).await.unwrap().unwrap();
    assert_eq!(done.status, status::COMPLETED);

    let _completed: EventEnvelope<OrderCompletedV1> = next_event(&mut fx.completed_stream).await;
    assert_no_event(&mut fx.completed_stream).await;
}

#[tokio::test]
#[serial]
#[ignore] // Requires Postgres
async fn replayed_completion_signals_do_not_complete_twice() {
    let mut fx = setup().await;
    let cart_id = format!("cart-{}", Uuid::new_v4());

    let (msg, _) = cart_checked_out(&cart_id, "u7", 1);
    fx.cart_handler.handle(msg).await.unwrap();
    let order = order_by_cart(&fx.pool, &cart_id).await;

    let (msg, _) = payment_succeeded(&order.id, 1);
    fx.payment_handler.handle(msg).await.unwrap();
    let (msg, _) = stock_reserved(&order.id, 1);
    fx.stock_handler.handle(msg).await.unwrap();

    let _completed: EventEnvelope<OrderCompletedV1> = next_event(&mut fx.completed_stream).await;

    // A fresh stock signal with a later sequence still cannot re-complete
    let (msg, _) = stock_reserved(&order.id, 2);
    fx.stock_handler.handle(msg).await.unwrap();

    let done = order_repo::get(&fx.pool, &order.id).await.unwrap().unwrap();
    assert_eq!(done.status, status::COMPLETED);
    assert_no_event(&mut fx.completed_stream).await;
}

#[tokio::test]
#[serial]
#[ignore] // Requires Postgres
async fn sequence_gap_is_processed_and_late_fill_is_skipped() {
    let mut fx = setup().await;
    let cart_id = format!("cart-{}", Uuid::new_v4());

    let (msg, _) = cart_checked_out(&cart_id, "u4", 1);
    fx.cart_handler.handle(msg).await.unwrap();
    let order = order_by_cart(&fx.pool, &cart_id).await;

    // Sequences 1 then 3 (2 missing): both process, checkpoint lands on 3
    let (msg, _) = stock_reserved(&order.id, 1);
    fx.stock_handler.handle(msg).await.unwrap();
    let (msg, _) = stock_reserved(&order.id, 3);
    fx.stock_handler.handle(msg).await.unwrap();

    let last = event_sequencing::dedup::get_last(
        &fx.pool,
        "order-service.stock-reserved",
        &order.id,
    )
    .await
    .unwrap();
    assert_eq!(last, Some(3));

    // The hole finally fills: a no-op
    let (msg, _) = stock_reserved(&order.id, 2);
    fx.stock_handler.handle(msg).await.unwrap();

    let after = order_repo::get(&fx.pool, &order.id).await.unwrap().unwrap();
    assert!(after.stock_ok);
    assert_eq!(after.status, status::PENDING);
}

#[tokio::test]
#[serial]
#[ignore] // Requires Postgres
async fn payment_failure_is_terminal() {
    let mut fx = setup().await;
    let cart_id = format!("cart-{}", Uuid::new_v4());

    let (msg, _) = cart_checked_out(&cart_id, "u8", 1);
    fx.cart_handler.handle(msg).await.unwrap();
    let order = order_by_cart(&fx.pool, &cart_id).await;

    let (msg, _) = payment_failed(&order.id, "declined", 1);
    fx.payment_failed_handler.handle(msg).await.unwrap();

    let failed = order_repo::get(&fx.pool, &order.id).await.unwrap().unwrap();
    assert_eq!(failed.status, status::PAYMENT_FAILED);
    assert_eq!(failed.payment_error.as_deref(), Some("declined"));

    // Stock arriving afterwards stays flag-only and must not complete
    let (msg, _) = stock_reserved(&order.id, 1);
    fx.stock_handler.handle(msg).await.unwrap();

    let after = order_repo::get(&fx.pool, &order.id).await.unwrap().unwrap();
    assert_eq!(after.status, status::PAYMENT_FAILED);
    assert!(after.stock_ok);
    assert_no_event(&mut fx.completed_stream).await;

    // Even a late PaymentSucceeded cannot resurrect the order
    let (msg, _) = payment_succeeded(&order.id, 2);
    fx.payment_handler.handle(msg).await.unwrap();

    let still = order_repo::get(&fx.pool, &order.id).await.unwrap().unwrap();
    assert_eq!(still.status, status::PAYMENT_FAILED);
    assert_no_event(&mut fx.completed_stream).await;
}

#[tokio::test]
#[serial]
#[ignore] // Requires Postgres
async fn duplicate_completion_signal_is_skipped_by_checkpoint() {
    let mut fx = setup().await;
    let cart_id = format!("cart-{}", Uuid::new_v4());

    let (msg, _) = cart_checked_out(&cart_id, "u9", 1);
    fx.cart_handler.handle(msg).await.unwrap();
    let order = order_by_cart(&fx.pool, &cart_id).await;

    let (msg, _) = payment_succeeded(&order.id, 1);
    fx.payment_handler.handle(msg.clone()).await.unwrap();
    // Redelivery of the same sequence is acked without side effects
    fx.payment_handler.handle(msg).await.unwrap();

    let (msg, _) = stock_reserved(&order.id, 1);
    fx.stock_handler.handle(msg).await.unwrap();

    let _completed: EventEnvelope<OrderCompletedV1> = next_event(&mut fx.completed_stream).await;
    assert_no_event(&mut fx.completed_stream).await;
}
