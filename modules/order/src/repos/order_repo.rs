//! Repository for order rows and the saga's state transitions
//!
//! The order row is the saga state: `payment_ok`/`stock_ok` flags plus the
//! `status` column. All writes that decide the terminal state run inside the
//! caller's transaction so the completion check and the terminal write are
//! atomic.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool, Postgres, Transaction};

/// Order lifecycle states. `cancelled` is representable but currently has no
/// trigger; the completion guard treats it as terminal like the others.
pub mod status {
    pub const PENDING: &str = "pending";
    pub const COMPLETED: &str = "completed";
    pub const PAYMENT_FAILED: &str = "payment_failed";
    pub const CANCELLED: &str = "cancelled";
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub cart_id: String,
    pub user_id: String,
    pub total_amount: f64,
    pub status: String,
    pub payment_ok: bool,
    pub stock_ok: bool,
    pub payment_error: Option<String>,
    pub created_at: DateTime<Utc>,
    #[sqlx(skip)]
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: String,
    pub quantity: i32,
    pub price: f64,
}

/// Insert a new order and its items within the caller's transaction.
/// The row enters the saga in `pending` with both flags down.
pub async fn tx_create(
    tx: &mut Transaction<'_, Postgres>,
    order: &Order,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO orders (id, cart_id, user_id, total_amount, status, payment_ok, stock_ok, created_at)
        VALUES ($1, $2, $3, $4, $5, FALSE, FALSE, $6)
        "#,
    )
    .bind(&order.id)
    .bind(&order.cart_id)
    .bind(&order.user_id)
    .bind(order.total_amount)
    .bind(status::PENDING)
    .bind(order.created_at)
    .execute(&mut **tx)
    .await?;

    for item in &order.items {
        sqlx::query(
            r#"
            INSERT INTO order_items (id, order_id, product_id, quantity, price)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(&order.id)
        .bind(&item.product_id)
        .bind(item.quantity)
        .bind(item.price)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

pub async fn get(pool: &PgPool, order_id: &str) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as::<_, Order>(
        r#"
        SELECT id, cart_id, user_id, total_amount, status, payment_ok, stock_ok, payment_error, created_at
        FROM orders WHERE id = $1
        "#,
    )
    .bind(order_id)
    .fetch_optional(pool)
    .await?;

    let Some(mut order) = order else {
        return Ok(None);
    };

    order.items = sqlx::query_as::<_, OrderItem>(
        r#"
        SELECT product_id, quantity, price
        FROM order_items WHERE order_id = $1
        "#,
    )
    .bind(order_id)
    .fetch_all(pool)
    .await?;

    Ok(Some(order))
}

pub async fn list_by_user(pool: &PgPool, user_id: &str) -> Result<Vec<Order>, sqlx::Error> {
    let mut orders = sqlx::query_as::<_, Order>(
        r#"
        SELECT id, cart_id, user_id, total_amount, status, payment_ok, stock_ok, payment_error, created_at
        FROM orders
        WHERE user_id = $1
        ORDER BY created_at DESC, id
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    if orders.is_empty() {
        return Ok(orders);
    }

    let order_ids: Vec<String> = orders.iter().map(|o| o.id.clone()).collect();

    #[derive(FromRow)]
    struct ItemRow {
        order_id: String,
        product_id: String,
        quantity: i32,
        price: f64,
    }

    let items = sqlx::query_as::<_, ItemRow>(
        r#"
        SELECT order_id, product_id, quantity, price
        FROM order_items WHERE order_id = ANY($1)
        "#,
    )
    .bind(&order_ids)
    .fetch_all(pool)
    .await?;

    for item in items {
        if let Some(order) = orders.iter_mut().find(|o| o.id == item.order_id) {
            order.items.push(OrderItem {
                product_id: item.product_id,
                quantity: item.quantity,
                price: item.price,
            });
        }
    }

    Ok(orders)
}

/// Raise the payment flag. Setting an already-set flag is a no-op.
pub async fn tx_set_payment_ok(
    tx: &mut Transaction<'_, Postgres>,
    order_id: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("UPDATE orders SET payment_ok = TRUE WHERE id = $1")
        .bind(order_id)
        .execute(&mut **tx)
        .await?;
    Ok(result.rows_affected())
}

/// Raise the stock flag. Setting an already-set flag is a no-op.
pub async fn tx_set_stock_ok(
    tx: &mut Transaction<'_, Postgres>,
    order_id: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("UPDATE orders SET stock_ok = TRUE WHERE id = $1")
        .bind(order_id)
        .execute(&mut **tx)
        .await?;
    Ok(result.rows_affected())
}

/// Move a pending order to `payment_failed`, recording the reason.
/// Terminal states are left untouched.
pub async fn tx_mark_payment_failed(
    tx: &mut Transaction<'_, Postgres>,
    order_id: &str,
    reason: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE orders
        SET status = $2, payment_ok = FALSE, payment_error = $3
        WHERE id = $1 AND status = $4
        "#,
    )
    .bind(order_id)
    .bind(status::PAYMENT_FAILED)
    .bind(reason)
    .bind(status::PENDING)
    .execute(&mut **tx)
    .await?;
    Ok(result.rows_affected())
}

/// Complete the order iff it is still pending with both flags up.
///
/// The guarded single-statement update makes the completion race safe: the
/// first transaction to commit with both flags observed wins and gets the
/// user id back; any later attempt sees `status != 'pending'` and returns
/// `None`, so `OrderCompleted` is published at most once.
pub async fn tx_try_complete(
    tx: &mut Transaction<'_, Postgres>,
    order_id: &str,
) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        r#"
        UPDATE orders
        SET status = $2
        WHERE id = $1 AND status = $3 AND payment_ok AND stock_ok
        RETURNING user_id
        "#,
    )
    .bind(order_id)
    .bind(status::COMPLETED)
    .bind(status::PENDING)
    .fetch_optional(&mut **tx)
    .await
}
