//! PaymentSucceeded / PaymentFailed contract types
//!
//! Published by the payment service (an external collaborator); the order
//! saga consumes both to decide an order's terminal state.

use crate::EventIdent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const PAYMENT_SUCCEEDED: EventIdent = EventIdent {
    name: "PaymentSucceeded",
    version: 1,
    schema: "contracts/events/payment/PaymentSucceeded.v1.payload.schema.json",
    routing_key: "payment.succeeded.v1",
};

pub const PAYMENT_FAILED: EventIdent = EventIdent {
    name: "PaymentFailed",
    version: 1,
    schema: "contracts/events/payment/PaymentFailed.v1.payload.schema.json",
    routing_key: "payment.failed.v1",
};

/// Payload for the enveloped PaymentSucceeded event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentSucceededV1 {
    pub order_id: String,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Payload for the enveloped PaymentFailed event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentFailedV1 {
    pub order_id: String,
    pub user_id: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}

/// Pre-envelope PaymentSucceeded frame
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LegacyPaymentSucceeded {
    pub event_type: String,
    pub order_id: String,
    #[serde(default)]
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
}

/// Pre-envelope PaymentFailed frame
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LegacyPaymentFailed {
    pub event_type: String,
    pub order_id: String,
    #[serde(default)]
    pub user_id: String,
    pub reason: String,
    pub timestamp: DateTime<Utc>,
}
