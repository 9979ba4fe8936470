//! Repository for carts and cart items
//!
//! One open cart per user; checkout closes it. Adding the same product
//! again accumulates the quantity.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use uuid::Uuid;

pub mod status {
    pub const OPEN: &str = "open";
    pub const CHECKED_OUT: &str = "checked_out";
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub id: String,
    pub user_id: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    #[sqlx(skip)]
    pub items: Vec<CartItem>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product_id: String,
    pub quantity: i32,
    pub price: f64,
}

impl Cart {
    pub fn total_amount(&self) -> f64 {
        self.items
            .iter()
            .map(|it| f64::from(it.quantity) * it.price)
            .sum()
    }
}

/// The user's open cart, created on first use.
pub async fn get_or_create_open(pool: &PgPool, user_id: &str) -> Result<Cart, sqlx::Error> {
    if let Some(cart) = get_open(pool, user_id).await? {
        return Ok(cart);
    }

    let cart = Cart {
        id: Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        status: status::OPEN.to_string(),
        created_at: Utc::now(),
        items: Vec::new(),
    };

    sqlx::query(
        r#"
        INSERT INTO carts (id, user_id, status, created_at)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(&cart.id)
    .bind(&cart.user_id)
    .bind(&cart.status)
    .bind(cart.created_at)
    .execute(pool)
    .await?;

    Ok(cart)
}

/// The user's open cart with its items, if any.
pub async fn get_open(pool: &PgPool, user_id: &str) -> Result<Option<Cart>, sqlx::Error> {
    let cart = sqlx::query_as::<_, Cart>(
        r#"
        SELECT id, user_id, status, created_at
        FROM carts
        WHERE user_id = $1 AND status = $2
        ORDER BY created_at DESC
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .bind(status::OPEN)
    .fetch_optional(pool)
    .await?;

    let Some(mut cart) = cart else {
        return Ok(None);
    };

    cart.items = sqlx::query_as::<_, CartItem>(
        r#"
        SELECT product_id, quantity, price
        FROM cart_items WHERE cart_id = $1
        ORDER BY product_id
        "#,
    )
    .bind(&cart.id)
    .fetch_all(pool)
    .await?;

    Ok(Some(cart))
}

/// Add a line to the cart, accumulating quantity for repeated products.
pub async fn add_item(
    pool: &PgPool,
    cart_id: &str,
    product_id: &str,
    quantity: i32,
    price: f64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO cart_items (id, cart_id, product_id, quantity, price)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (cart_id, product_id)
        DO UPDATE SET quantity = cart_items.quantity + EXCLUDED.quantity, price = EXCLUDED.price
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(cart_id)
    .bind(product_id)
    .bind(quantity)
    .bind(price)
    .execute(pool)
    .await?;

    Ok(())
}

/// Close an open cart. Returns the number of rows moved, so a concurrent
/// double-checkout observes 0 and does not publish twice.
pub async fn tx_mark_checked_out(
    tx: &mut Transaction<'_, Postgres>,
    cart_id: &str,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE carts SET status = $2 WHERE id = $1 AND status = $3
        "#,
    )
    .bind(cart_id)
    .bind(status::CHECKED_OUT)
    .bind(status::OPEN)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected())
}
