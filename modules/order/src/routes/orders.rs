//! Order read API

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;

use crate::repos::order_repo::{self, Order};
use crate::routes::{correlation_id, ApiError, AppState};

/// Handler for GET /api/orders/{order_id}
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Order>, ApiError> {
    let cid = correlation_id(&headers);

    match order_repo::get(&state.pool, &order_id).await {
        Ok(Some(order)) => Ok(Json(order)),
        Ok(None) => Err(ApiError::not_found("order not found", cid)),
        Err(e) => {
            tracing::error!(order_id = %order_id, error = %e, "failed to fetch order");
            Err(ApiError::internal(cid))
        }
    }
}

/// Handler for GET /api/users/{user_id}/orders
pub async fn list_user_orders(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Vec<Order>>, ApiError> {
    let cid = correlation_id(&headers);

    match order_repo::list_by_user(&state.pool, &user_id).await {
        Ok(orders) => Ok(Json(orders)),
        Err(e) => {
            tracing::error!(user_id = %user_id, error = %e, "failed to list orders");
            Err(ApiError::internal(cid))
        }
    }
}
