//! CartCheckedOut contract types

use crate::EventIdent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const CART_CHECKED_OUT: EventIdent = EventIdent {
    name: "CartCheckedOut",
    version: 1,
    schema: "contracts/events/cart/CartCheckedOut.v1.payload.schema.json",
    routing_key: "cart.checkedout.v1",
};

/// A single cart/order line. Reused across the cart and order contracts so
/// events stay consistent between services.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product_id: String,
    pub quantity: i32,
    pub price: f64,
}

/// Payload for the enveloped CartCheckedOut event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CartCheckedOutV1 {
    pub cart_id: String,
    pub user_id: String,
    pub items: Vec<CartItem>,
    pub total_amount: f64,
    pub timestamp: DateTime<Utc>,
}

/// Pre-envelope CartCheckedOut frame, accepted during producer rollout
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LegacyCartCheckedOut {
    pub event_type: String,
    pub cart_id: String,
    pub user_id: String,
    #[serde(default)]
    pub items: Vec<CartItem>,
    pub total_amount: f64,
    pub timestamp: DateTime<Utc>,
}

impl From<LegacyCartCheckedOut> for CartCheckedOutV1 {
    fn from(legacy: LegacyCartCheckedOut) -> Self {
        Self {
            cart_id: legacy.cart_id,
            user_id: legacy.user_id,
            items: legacy.items,
            total_amount: legacy.total_amount,
            timestamp: legacy.timestamp,
        }
    }
}
