//! HTTP surface of the order service

pub mod orders;

use axum::http::header::HeaderMap;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use sqlx::PgPool;
use std::any::Any;
use std::time::Duration;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use uuid::Uuid;

use crate::health::health;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/orders/{order_id}", get(orders::get_order))
        .route("/api/users/{user_id}/orders", get(orders::list_user_orders))
        .layer(TimeoutLayer::new(Duration::from_secs(5)))
        .layer(CatchPanicLayer::custom(recover_panic))
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .with_state(state)
}

/// Recover a panicking handler into the standard JSON error shape
fn recover_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| err.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    tracing::error!(panic = %detail, "recovered panic in HTTP handler");

    ApiError::internal(Uuid::new_v4().to_string()).into_response()
}

/// Correlation id echoed on every response: the `X-Correlation-Id` request
/// header when present, a fresh UUID otherwise.
pub fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get("X-Correlation-Id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// JSON error response: `{error, correlationId}` with an appropriate status
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
    pub correlation_id: String,
}

impl ApiError {
    pub fn not_found(message: &str, correlation_id: String) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.to_string(),
            correlation_id,
        }
    }

    pub fn internal(correlation_id: String) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "internal server error".to_string(),
            correlation_id,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "error": self.message,
            "correlationId": self.correlation_id,
        }));
        (self.status, body).into_response()
    }
}
