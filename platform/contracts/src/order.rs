//! OrderCreated / OrderCompleted contract types

use crate::cart::CartItem;
use crate::EventIdent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const ORDER_CREATED: EventIdent = EventIdent {
    name: "OrderCreated",
    version: 1,
    schema: "contracts/events/order/OrderCreated.v1.payload.schema.json",
    routing_key: "order.created.v1",
};

pub const ORDER_COMPLETED: EventIdent = EventIdent {
    name: "OrderCompleted",
    version: 1,
    schema: "contracts/events/order/OrderCompleted.v1.payload.schema.json",
    routing_key: "order.completed.v1",
};

/// Payload for the enveloped OrderCreated event.
/// Inventory consumes this and attempts to reserve stock.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreatedV1 {
    pub order_id: String,
    pub cart_id: String,
    pub user_id: String,
    pub items: Vec<CartItem>,
    pub total_amount: f64,
    pub timestamp: DateTime<Utc>,
}

/// Payload for the enveloped OrderCompleted event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderCompletedV1 {
    pub order_id: String,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Pre-envelope OrderCreated frame
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LegacyOrderCreated {
    pub event_type: String,
    pub order_id: String,
    #[serde(default)]
    pub cart_id: String,
    pub user_id: String,
    #[serde(default)]
    pub items: Vec<CartItem>,
    #[serde(default)]
    pub total_amount: f64,
    pub timestamp: DateTime<Utc>,
}

/// Pre-envelope OrderCompleted frame
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LegacyOrderCompleted {
    pub event_type: String,
    pub order_id: String,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
}

impl From<LegacyOrderCreated> for OrderCreatedV1 {
    fn from(legacy: LegacyOrderCreated) -> Self {
        Self {
            order_id: legacy.order_id,
            cart_id: legacy.cart_id,
            user_id: legacy.user_id,
            items: legacy.items,
            total_amount: legacy.total_amount,
            timestamp: legacy.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_created_round_trips() {
        let payload = OrderCreatedV1 {
            order_id: "o1".to_string(),
            cart_id: "c1".to_string(),
            user_id: "u1".to_string(),
            items: vec![CartItem {
                product_id: "A".to_string(),
                quantity: 2,
                price: 10.0,
            }],
            total_amount: 20.0,
            timestamp: "2024-02-11T10:00:00Z".parse().unwrap(),
        };

        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"orderId\""));
        assert!(json.contains("\"totalAmount\""));

        let back: OrderCreatedV1 = serde_json::from_str(&json).unwrap();
        assert_eq!(back, payload);
    }
}
