//! Stock query and adjustment API

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::repos::stock_repo::{self, StockItem};
use crate::routes::{correlation_id, ApiError, AppState};

/// `available` arrives as an integer or a numeric string depending on the
/// caller; both normalize to the same quantity, anything else is rejected.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AvailableQty {
    Number(i64),
    NumericString(String),
}

impl AvailableQty {
    pub fn normalize(&self) -> Result<i32, String> {
        let value = match self {
            AvailableQty::Number(n) => *n,
            AvailableQty::NumericString(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| format!("available is not an integer: {:?}", s))?,
        };

        if value < 0 {
            return Err(format!("available must be >= 0, got {}", value));
        }
        i32::try_from(value).map_err(|_| format!("available out of range: {}", value))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdjustRequest {
    pub product_id: String,
    pub available: AvailableQty,
}

/// Handler for GET /api/inventory/{product_id}
pub async fn get_stock(
    State(state): State<AppState>,
    Path(product_id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<StockItem>, ApiError> {
    let cid = correlation_id(&headers);

    match stock_repo::get(&state.pool, &product_id).await {
        Ok(Some(item)) => Ok(Json(item)),
        Ok(None) => Err(ApiError::not_found("product not found", cid)),
        Err(e) => {
            tracing::error!(product_id = %product_id, error = %e, "failed to fetch stock");
            Err(ApiError::internal(cid))
        }
    }
}

/// Handler for POST /api/inventory/adjust
pub async fn adjust_stock(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<AdjustRequest>,
) -> Result<Json<Value>, ApiError> {
    let cid = correlation_id(&headers);

    if req.product_id.is_empty() {
        return Err(ApiError::bad_request("productId is required", cid));
    }

    let available = match req.available.normalize() {
        Ok(v) => v,
        Err(msg) => return Err(ApiError::bad_request(&msg, cid)),
    };

    if let Err(e) = stock_repo::set_available(&state.pool, &req.product_id, available).await {
        tracing::error!(product_id = %req.product_id, error = %e, "failed to adjust stock");
        return Err(ApiError::internal(cid));
    }

    tracing::info!(
        product_id = %req.product_id,
        available = available,
        "stock availability adjusted"
    );
    Ok(Json(json!({ "ok": true })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_integer_available() {
        let req: AdjustRequest =
            serde_json::from_str(r#"{"productId": "A", "available": 5}"#).unwrap();
        assert_eq!(req.available.normalize(), Ok(5));
    }

    #[test]
    fn accepts_numeric_string_available() {
        let req: AdjustRequest =
            serde_json::from_str(r#"{"productId": "A", "available": "12"}"#).unwrap();
        assert_eq!(req.available.normalize(), Ok(12));
    }

    #[test]
    fn rejects_non_integer_string() {
        let req: AdjustRequest =
            serde_json::from_str(r#"{"productId": "A", "available": "lots"}"#).unwrap();
        assert!(req.available.normalize().is_err());
    }

    #[test]
    fn rejects_negative_available() {
        let req: AdjustRequest =
            serde_json::from_str(r#"{"productId": "A", "available": -1}"#).unwrap();
        assert!(req.available.normalize().is_err());
    }
}
