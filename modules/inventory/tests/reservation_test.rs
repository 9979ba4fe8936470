//! Inventory reservation integration tests
//!
//! Exercises the row-locked all-or-nothing reservation and the
//! `order.created.v1` consumer against a live Postgres and an in-memory bus.
//!
//! Run with: `DATABASE_URL=postgres://... cargo test -p inventory-service -- --ignored`

mod common;

use contracts::{
    CartItem, OrderCreatedV1, StockDepletedV1, StockLine, StockReservedV1, ORDER_CREATED,
    STOCK_DEPLETED, STOCK_RESERVED,
};
use event_bus::{
    BusMessage, Delivery, EventBus, EventEnvelope, EventHandler, EventMetadata, InMemoryBus,
};
use futures::stream::BoxStream;
use futures::StreamExt;
use inventory_service::repos::stock_repo;
use inventory_service::{InventoryEventPublisher, OrderCreatedHandler, ReservationCache};
use serial_test::serial;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

struct InventoryFixture {
    pool: PgPool,
    handler: OrderCreatedHandler,
    reserved_stream: BoxStream<'static, Delivery>,
    depleted_stream: BoxStream<'static, Delivery>,
}

async fn setup() -> InventoryFixture {
    let pool = common::get_test_pool().await;
    let bus = Arc::new(InMemoryBus::new());

    let probe = Uuid::new_v4();
    let reserved_stream = bus
        .consume(&format!("probe-{}.stock.reserved", probe), STOCK_RESERVED.routing_key)
        .await
        .unwrap();
    let depleted_stream = bus
        .consume(&format!("probe-{}.stock.depleted", probe), STOCK_DEPLETED.routing_key)
        .await
        .unwrap();

    let publisher = Arc::new(InventoryEventPublisher::new(
        bus.clone() as Arc<dyn EventBus>,
        pool.clone(),
        "inventory-service".to_string(),
        true,
    ));

    InventoryFixture {
        handler: OrderCreatedHandler::new(
            pool.clone(),
            publisher,
            Arc::new(ReservationCache::new()),
            true,
        ),
        pool,
        reserved_stream,
        depleted_stream,
    }
}

fn order_created(
    order_id: &str,
    items: Vec<(&str, i32)>,
    seq: i64,
) -> (BusMessage, EventEnvelope<OrderCreatedV1>) {
    let envelope = EventEnvelope::new(
        ORDER_CREATED.name,
        ORDER_CREATED.version,
        "order-service",
        order_id,
        seq,
        ORDER_CREATED.schema,
        OrderCreatedV1 {
            order_id: order_id.to_string(),
            cart_id: format!("cart-{}", order_id),
            user_id: "u1".to_string(),
            items: items
                .into_iter()
                .map(|(product_id, quantity)| CartItem {
                    product_id: product_id.to_string(),
                    quantity,
                    price: 10.0,
                })
                .collect(),
            total_amount: 40.0,
            timestamp: chrono::Utc::now(),
        },
        EventMetadata::root(),
    );
    let body = envelope.encode().unwrap();
    (
        BusMessage::new(ORDER_CREATED.routing_key.to_string(), body),
        envelope,
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

fn unique_product(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4())
}

#[tokio::test]
#[serial]
#[ignore] // Requires Postgres
async fn reserves_all_lines_and_publishes_stock_reserved() {
    let mut fx = setup().await;
    let product_a = unique_product("A");
    let product_b = unique_product("B");
    common::seed_stock(&fx.pool, &product_a, 5).await;
    common::seed_stock(&fx.pool, &product_b, 3).await;

    let order_id = format!("order-{}", Uuid::new_v4());
    let (msg, trigger) = order_created(&order_id, vec![(&product_a, 2), (&product_b, 1)], 1);
    fx.handler.handle(msg).await.unwrap();

    assert_eq!(common::stock_level(&fx.pool, &product_a).await, 3);
    assert_eq!(common::stock_level(&fx.pool, &product_b).await, 2);

    let reserved: EventEnvelope<StockReservedV1> = next_event(&mut fx.reserved_stream).await;
    assert_eq!(reserved.payload.order_id, order_id);
    assert_eq!(reserved.partition_key, order_id);
    assert_eq!(reserved.payload.items.len(), 2);
    // Correlation propagates, causation points at the trigger
    assert_eq!(reserved.correlation_id, trigger.correlation_id);
    assert_eq!(reserved.causation_id, Some(trigger.event_id));

    assert_no_event(&mut fx.depleted_stream).await;
}

#[tokio::test]
#[serial]
#[ignore] // Requires Postgres
async fn depletion_rolls_back_and_reports_every_shortage() {
    let mut fx = setup().await;
    let product_a = unique_product("A");
    common::seed_stock(&fx.pool, &product_a, 1).await;

    let order_id = format!("order-{}", Uuid::new_v4());
    let (msg, _) = order_created(&order_id, vec![(&product_a, 2)], 1);
    fx.handler.handle(msg).await.unwrap();

    // No stock mutation
    assert_eq!(common::stock_level(&fx.pool, &product_a).await, 1);

    let depleted: EventEnvelope<StockDepletedV1> = next_event(&mut fx.depleted_stream).await;
    assert_eq!(depleted.payload.depleted.len(), 1);
    assert_eq!(depleted.payload.depleted[0].product_id, product_a);
    assert_eq!(depleted.payload.depleted[0].requested, 2);
    assert_eq!(depleted.payload.depleted[0].available, 1);
    assert!(depleted.payload.reserved.is_empty());

    assert_no_event(&mut fx.reserved_stream).await;
}

#[tokio::test]
#[serial]
#[ignore] // Requires Postgres
async fn one_short_line_blocks_the_whole_reservation() {
    let mut fx = setup().await;
    let product_a = unique_product("A");
    let product_b = unique_product("B");
    common::seed_stock(&fx.pool, &product_a, 5).await;
    common::seed_stock(&fx.pool, &product_b, 0).await;

    let order_id = format!("order-{}", Uuid::new_v4());
    let (msg, _) = order_created(&order_id, vec![(&product_a, 2), (&product_b, 1)], 1);
    fx.handler.handle(msg).await.unwrap();

    // Neither line was decremented, including the satisfiable one
    assert_eq!(common::stock_level(&fx.pool, &product_a).await, 5);
    assert_eq!(common::stock_level(&fx.pool, &product_b).await, 0);

    let depleted: EventEnvelope<StockDepletedV1> = next_event(&mut fx.depleted_stream).await;
    assert_eq!(depleted.payload.depleted.len(), 1);
    assert_eq!(depleted.payload.depleted[0].product_id, product_b);
}

#[tokio::test]
#[serial]
#[ignore] // Requires Postgres
async fn missing_product_counts_as_zero_availability() {
    let mut fx = setup().await;
    let product = unique_product("ghost");

    let order_id = format!("order-{}", Uuid::new_v4());
    let (msg, _) = order_created(&order_id, vec![(&product, 1)], 1);
    fx.handler.handle(msg).await.unwrap();

    let depleted: EventEnvelope<StockDepletedV1> = next_event(&mut fx.depleted_stream).await;
    assert_eq!(depleted.payload.depleted[0].available, 0);
}

#[tokio::test]
#[serial]
#[ignore] // Requires Postgres
async fn concurrent_reservations_never_oversell() {
    let pool = common::get_test_pool().await;
    let product = unique_product("hot");
    common::seed_stock(&pool, &product, 5).await;

    let mut tasks = Vec::new();
    for _ in 0..2 {
        let pool = pool.clone();
        let product = product.clone();
        tasks.push(tokio::spawn(async move {
            let lines = vec![StockLine {
                product_id: product,
                quantity: 3,
            }];
            let mut tx = pool.begin().await.unwrap();
            let outcome = stock_repo::tx_reserve(&mut tx, &lines).await.unwrap();
            tx.commit().await.unwrap();
            outcome
        }));
    }

    let mut reserved_count = 0;
    let mut depleted_count = 0;
    for task in tasks {
        let outcome = task.await.unwrap();
        if outcome.is_depleted() {
            depleted_count += 1;
            // The loser saw the post-decrement availability
            assert_eq!(outcome.depleted[0].available, 2);
        } else {
            reserved_count += 1;
        }
    }

    // Row locks serialize the contenders: exactly one wins
    assert_eq!(reserved_count, 1);
    assert_eq!(depleted_count, 1);
    assert_eq!(common::stock_level(&pool, &product).await, 2);
}

#[tokio::test]
#[serial]
#[ignore] // Requires Postgres
async fn redelivery_after_restart_is_caught_by_the_durable_checkpoint() {
    let mut fx = setup().await;
    let product = unique_product("A");
    common::seed_stock(&fx.pool, &product, 5).await;

    let order_id = format!("order-{}", Uuid::new_v4());
    let (msg, _) = order_created(&order_id, vec![(&product, 2)], 1);
    fx.handler.handle(msg.clone()).await.unwrap();
    assert_eq!(common::stock_level(&fx.pool, &product).await, 3);
    let _reserved: EventEnvelope<StockReservedV1> = next_event(&mut fx.reserved_stream).await;

    // Same delivery processed by a fresh handler (fresh in-memory cache,
    // as after a process restart): the durable checkpoint skips it
    let bus = Arc::new(InMemoryBus::new());
    let publisher = Arc::new(InventoryEventPublisher::new(
        bus.clone() as Arc<dyn EventBus>,
        fx.pool.clone(),
        "inventory-service".to_string(),
        true,
    ));
    let restarted = OrderCreatedHandler::new(
        fx.pool.clone(),
        publisher,
        Arc::new(ReservationCache::new()),
        true,
    );
    restarted.handle(msg).await.unwrap();

    // Stock applied at most once
    assert_eq!(common::stock_level(&fx.pool, &product).await, 3);
}
