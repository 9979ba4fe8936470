pub mod config;
pub mod db;
pub mod events;
pub mod health;
pub mod repos;
pub mod routes;

/// Stable service identity used for queue and consumer naming
pub const SERVICE_NAME: &str = "order-service";

pub use events::handlers::{
    CartCheckedOutHandler, PaymentFailedHandler, PaymentSucceededHandler, StockReservedHandler,
};
pub use events::publisher::OrderEventPublisher;
