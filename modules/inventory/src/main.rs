use contracts::ORDER_CREATED;
use event_bus::{Dispatcher, EventBus, InMemoryBus, NatsBus};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use inventory_service::config::Config;
use inventory_service::routes::{self, AppState};
use inventory_service::{
    db, InventoryEventPublisher, OrderCreatedHandler, ReservationCache, SERVICE_NAME,
};

#[tokio::main]
async fn main() {
    // Load environment variables from .env file (if present)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    tracing::info!("Starting inventory service...");

    let config = Config::from_env().expect("Failed to load configuration from environment");

    tracing::info!(
        "Configuration loaded: host={}, port={}, bus_type={}",
        config.host,
        config.port,
        config.bus_type
    );

    tracing::info!("Connecting to database...");
    let pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Running migrations...");
    sqlx::migrate!("./db/migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    let bus: Arc<dyn EventBus> = match config.bus_type.to_lowercase().as_str() {
        "inmemory" => {
            tracing::info!("Using InMemory event bus");
            Arc::new(InMemoryBus::new())
        }
        "nats" => {
            tracing::info!("Connecting to NATS at {}", config.nats_url);
            let client = async_nats::connect(&config.nats_url)
                .await
                .expect("Failed to connect to NATS");
            Arc::new(NatsBus::new(client))
        }
        _ => panic!(
            "Invalid BUS_TYPE: {}. Must be 'inmemory' or 'nats'",
            config.bus_type
        ),
    };

    let publisher = Arc::new(InventoryEventPublisher::new(
        bus.clone(),
        pool.clone(),
        config.producer_name.clone(),
        config.publish_enveloped,
    ));

    let mut dispatcher = Dispatcher::new(bus.clone(), SERVICE_NAME);
    dispatcher.register(
        ORDER_CREATED.routing_key,
        Arc::new(OrderCreatedHandler::new(
            pool.clone(),
            publisher,
            Arc::new(ReservationCache::new()),
            config.consume_enveloped,
        )),
    );

    let shutdown = CancellationToken::new();
    let consumers = dispatcher
        .start(shutdown.clone())
        .await
        .expect("Failed to start consumers");

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to listen for shutdown signal");
            tracing::info!("shutdown signal received");
            shutdown.cancel();
        });
    }

    let app = routes::router(AppState { pool });

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("Inventory service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind address");

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
        .await
        .expect("Server failed");

    consumers.join().await;
    tracing::info!("Inventory service stopped");
}
