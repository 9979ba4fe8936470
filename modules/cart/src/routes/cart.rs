//! Cart item and checkout API

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use event_bus::EventMetadata;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::repos::cart_repo::{self, Cart};
use crate::routes::{correlation_id, ApiError, AppState};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItemRequest {
    pub product_id: String,
    pub quantity: i32,
    pub price: f64,
}

/// Handler for POST /api/cart/{user_id}/items
pub async fn add_item(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
    Json(req): Json<AddItemRequest>,
) -> Result<Json<Cart>, ApiError> {
    let cid = correlation_id(&headers);

    if req.product_id.is_empty() || req.quantity <= 0 || req.price < 0.0 {
        return Err(ApiError::bad_request("invalid item", cid));
    }

    let result: Result<Cart, sqlx::Error> = async {
        let cart = cart_repo::get_or_create_open(&state.pool, &user_id).await?;
        cart_repo::add_item(&state.pool, &cart.id, &req.product_id, req.quantity, req.price)
            .await?;
        Ok(cart_repo::get_open(&state.pool, &user_id).await?.expect("cart just written"))
    }
    .await;

    match result {
        Ok(cart) => Ok(Json(cart)),
        Err(e) => {
            tracing::error!(user_id = %user_id, error = %e, "failed to add cart item");
            Err(ApiError::internal(cid))
        }
    }
}

/// Handler for POST /api/cart/{user_id}/checkout
///
/// Closes the open cart, commits, then publishes `CartCheckedOut`. A
/// concurrent double-checkout loses the guarded status update and gets a
/// 404 instead of a second event.
pub async fn checkout(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, ApiError> {
    let cid = correlation_id(&headers);

    let cart = match cart_repo::get_open(&state.pool, &user_id).await {
        Ok(Some(cart)) => cart,
        Ok(None) => return Err(ApiError::not_found("no open cart", cid)),
        Err(e) => {
            tracing::error!(user_id = %user_id, error = %e, "failed to load cart");
            return Err(ApiError::internal(cid));
        }
    };

    if cart.items.is_empty() {
        return Err(ApiError::bad_request("cart is empty", cid));
    }

    let closed: Result<u64, sqlx::Error> = async {
        let mut tx = state.pool.begin().await?;
        let rows = cart_repo::tx_mark_checked_out(&mut tx, &cart.id).await?;
        tx.commit().await?;
        Ok(rows)
    }
    .await;

    match closed {
        Ok(0) => return Err(ApiError::not_found("no open cart", cid)),
        Ok(_) => {}
        Err(e) => {
            tracing::error!(cart_id = %cart.id, error = %e, "failed to close cart");
            return Err(ApiError::internal(cid));
        }
    }

    let meta = EventMetadata {
        correlation_id: Some(Uuid::parse_str(&cid).unwrap_or_else(|_| Uuid::new_v4())),
        causation_id: None,
    };

    if let Err(e) = state.publisher.publish_cart_checked_out(&cart, meta).await {
        // The cart is already closed; the publish failure surfaces so the
        // caller (or an operator) retries the emission
        tracing::error!(cart_id = %cart.id, error = %e, "failed to publish CartCheckedOut");
        return Err(ApiError::bad_gateway("failed to publish checkout event", cid));
    }

    tracing::info!(
        cart_id = %cart.id,
        user_id = %user_id,
        total = cart.total_amount(),
        "cart checked out"
    );

    Ok(Json(json!({
        "cartId": cart.id,
        "userId": user_id,
        "totalAmount": cart.total_amount(),
        "status": cart_repo::status::CHECKED_OUT,
    })))
}
