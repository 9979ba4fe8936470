//! StockReserved / StockDepleted contract types

use crate::EventIdent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const STOCK_RESERVED: EventIdent = EventIdent {
    name: "StockReserved",
    version: 1,
    schema: "contracts/events/inventory/StockReserved.v1.payload.schema.json",
    routing_key: "stock.reserved.v1",
};

pub const STOCK_DEPLETED: EventIdent = EventIdent {
    name: "StockDepleted",
    version: 1,
    schema: "contracts/events/inventory/StockDepleted.v1.payload.schema.json",
    routing_key: "stock.depleted.v1",
};

/// A reserved product line
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StockLine {
    pub product_id: String,
    pub quantity: i32,
}

/// A line that could not be reserved, with what was asked and what was there
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DepletedLine {
    pub product_id: String,
    pub requested: i32,
    pub available: i32,
}

/// Payload for the enveloped StockReserved event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StockReservedV1 {
    pub order_id: String,
    pub user_id: String,
    pub items: Vec<StockLine>,
    pub timestamp: DateTime<Utc>,
}

/// Payload for the enveloped StockDepleted event.
///
/// Carries both the shortage lines and what would have been reserved, so the
/// consumer can see the whole requested set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StockDepletedV1 {
    pub order_id: String,
    pub user_id: String,
    pub depleted: Vec<DepletedLine>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reserved: Vec<StockLine>,
    pub timestamp: DateTime<Utc>,
}

/// Pre-envelope StockReserved frame
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LegacyStockReserved {
    pub event_type: String,
    pub order_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub items: Vec<StockLine>,
    pub timestamp: DateTime<Utc>,
}

/// Pre-envelope StockDepleted frame
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LegacyStockDepleted {
    pub event_type: String,
    pub order_id: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub depleted: Vec<DepletedLine>,
    #[serde(default)]
    pub reserved: Vec<StockLine>,
    pub timestamp: DateTime<Utc>,
}
