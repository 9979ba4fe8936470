pub mod config;
pub mod db;
pub mod events;
pub mod health;
pub mod repos;
pub mod reservations;
pub mod routes;

/// Stable service identity used for queue and consumer naming
pub const SERVICE_NAME: &str = "inventory-service";

pub use events::handlers::OrderCreatedHandler;
pub use events::publisher::InventoryEventPublisher;
pub use reservations::ReservationCache;
