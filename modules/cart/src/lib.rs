pub mod config;
pub mod db;
pub mod events;
pub mod health;
pub mod repos;
pub mod routes;

/// Stable service identity used for queue naming and producer identity
pub const SERVICE_NAME: &str = "cart-service";

pub use events::publisher::CartEventPublisher;
