//! # Event Contracts
//!
//! The shared schema package for inter-service events. Producers and
//! consumers couple only through the envelope (see `event-bus`) and the
//! payload shapes defined here.
//!
//! Each event module carries:
//! - the current enveloped payload type (`...V1`)
//! - the pre-envelope legacy payload accepted during producer rollout
//! - an [`EventIdent`] with name, version, advisory schema path and routing
//!   key
//!
//! New `eventVersion` values coexist with old until consumers are migrated.
//!
//! IMPORTANT: wire field names are camelCase and must match the JSON schema
//! files EXACTLY (case-sensitive).

pub mod cart;
pub mod order;
pub mod payment;
pub mod stock;

pub use cart::{CartCheckedOutV1, CartItem, LegacyCartCheckedOut, CART_CHECKED_OUT};
pub use order::{
    LegacyOrderCompleted, LegacyOrderCreated, OrderCompletedV1, OrderCreatedV1, ORDER_COMPLETED,
    ORDER_CREATED,
};
pub use payment::{
    LegacyPaymentFailed, LegacyPaymentSucceeded, PaymentFailedV1, PaymentSucceededV1,
    PAYMENT_FAILED, PAYMENT_SUCCEEDED,
};
pub use stock::{
    DepletedLine, LegacyStockDepleted, LegacyStockReserved, StockDepletedV1, StockLine,
    StockReservedV1, STOCK_DEPLETED, STOCK_RESERVED,
};

/// The single topic exchange all events route through
pub const EVENTS_EXCHANGE: &str = "ecommerce.events";

/// Identity of one event kind on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventIdent {
    /// Logical event type carried in `eventName`
    pub name: &'static str,
    /// Current schema version
    pub version: i32,
    /// Advisory path of the payload schema
    pub schema: &'static str,
    /// Routing key, `{domain}.{name}.v{version}`
    pub routing_key: &'static str,
}

/// Queue owned by `service` for `routing_key`
pub fn service_queue(service: &str, routing_key: &str) -> String {
    format!("{}.{}", service, routing_key)
}

/// Dead-letter queue owned by `service`
pub fn dlq_queue(service: &str) -> String {
    format!("{}.dlq", service)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_keys_are_bit_exact() {
        assert_eq!(CART_CHECKED_OUT.routing_key, "cart.checkedout.v1");
        assert_eq!(ORDER_CREATED.routing_key, "order.created.v1");
        assert_eq!(ORDER_COMPLETED.routing_key, "order.completed.v1");
        assert_eq!(PAYMENT_SUCCEEDED.routing_key, "payment.succeeded.v1");
        assert_eq!(PAYMENT_FAILED.routing_key, "payment.failed.v1");
        assert_eq!(STOCK_RESERVED.routing_key, "stock.reserved.v1");
        assert_eq!(STOCK_DEPLETED.routing_key, "stock.depleted.v1");
    }

    #[test]
    fn queue_names_are_service_scoped() {
        assert_eq!(
            service_queue("order-service", CART_CHECKED_OUT.routing_key),
            "order-service.cart.checkedout.v1"
        );
        assert_eq!(dlq_queue("order-service"), "order-service.dlq");
    }
}
