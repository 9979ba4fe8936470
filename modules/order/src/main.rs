use contracts::{CART_CHECKED_OUT, PAYMENT_FAILED, PAYMENT_SUCCEEDED, STOCK_RESERVED};
use event_bus::{Dispatcher, EventBus, InMemoryBus, NatsBus};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use order_service::config::Config;
use order_service::routes::{self, AppState};
use order_service::{
    db, CartCheckedOutHandler, OrderEventPublisher, PaymentFailedHandler, PaymentSucceededHandler,
    StockReservedHandler, SERVICE_NAME,
};

#[tokio::main]
async fn main() {
    // Load environment variables from .env file (if present)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    tracing::info!("Starting order service...");

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

    let publisher = Arc::new(OrderEventPublisher::new(
        bus.clone(),
        pool.clone(),
        config.producer_name.clone(),
        config.publish_enveloped,
    ));

    let mut dispatcher = Dispatcher::new(bus.clone(), SERVICE_NAME);
    dispatcher.register(
        CART_CHECKED_OUT.routing_key,
        Arc::new(CartCheckedOutHandler::new(
            pool.clone(),
            publisher.clone(),
            config.consume_enveloped,
        )),
    );
    dispatcher.register(
        PAYMENT_SUCCEEDED.routing_key,
        Arc::new(PaymentSucceededHandler::new(
            pool.clone(),
            publisher.clone(),
            config.consume_enveloped,
        )),
    );
    dispatcher.register(
        PAYMENT_FAILED.routing_key,
        Arc::new(PaymentFailedHandler::new(
            pool.clone(),
            config.consume_enveloped,
        )),
    );
    dispatcher.register(
        STOCK_RESERVED.routing_key,
        Arc::new(StockReservedHandler::new(
            pool.clone(),
            publisher.clone(),
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
    tracing::info!("Order service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind address");

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { server_shutdown.cancelled().await })
        .await
        .expect("Server failed");

    // In-flight handlers finish before the consumer loops return
    consumers.join().await;
    tracing::info!("Order service stopped");
}
