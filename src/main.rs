//! order_service - Order ingestion backend
//!
//! Consumes order messages from Kafka, persists each order atomically in
//! PostgreSQL and serves lookups over HTTP from a warm in-memory cache.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::{oneshot, watch};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use order_service::api::{self, AppState};
use order_service::consumer::{KafkaSource, OrderConsumer};
use order_service::ingest::{IngestPipeline, OrderDecoder};
use order_service::repository::PgOrderRepository;
use order_service::service::OrderService;
use order_service::{db, Config, OrderValidator, ProcessingContext};

/// Initialize tracing/logging
fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "order_service=debug,tower_http=debug".into());

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    // Initialize tracing
    init_tracing(config.is_production());

    let addr: SocketAddr = config.bind_addr().parse()?;

    tracing::info!("Starting order_service");
    tracing::info!("Connecting to database...");

    // Create database pool
    let pool = db::connect(&config).await?;
    db::verify_connection(&pool).await?;

    // Verify database schema
    if !db::check_schema(&pool).await? {
        tracing::error!("Database schema is not complete. Please run migrations.");
        return Err(anyhow::anyhow!("Database schema incomplete"));
    }

    tracing::info!("Database connected successfully");

    // Warm the cache before accepting traffic
    let warmup = ProcessingContext::new().with_timeout(config.warmup_timeout);
    let orders = Arc::new(OrderService::new(PgOrderRepository::new(pool.clone()), &warmup).await);
    tracing::info!(cached = orders.cached_len().await, "Order cache ready");

    // Start the consumer
    let decoder = OrderDecoder::new(Arc::new(OrderValidator::new()));
    let pipeline = IngestPipeline::new(decoder, Arc::clone(&orders));
    let source = KafkaSource::connect(&config.kafka_settings())?;

    let (stop_tx, stop_rx) = watch::channel(false);
    let consumer = OrderConsumer::new(source, pipeline, config.consumer_settings());
    let consumer_task = tokio::spawn(consumer.run(stop_rx));

    // Start the HTTP server
    let app = api::create_router(AppState::new(Arc::clone(&orders), config.request_timeout));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", addr);

    let (http_stop_tx, http_stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                http_stop_rx.await.ok();
            })
            .await
    });

    shutdown_signal().await;

    // Consumer first: its in-flight message finishes and commits
    stop_tx.send(true).ok();
    match consumer_task.await {
        Ok(stats) => tracing::info!(
            acknowledged = stats.acknowledged(),
            rewinds = stats.rewinds,
            "Consumer finished"
        ),
        Err(e) => tracing::error!(error = %e, "Consumer task failed"),
    }

    // Then drain HTTP within the shutdown bound
    http_stop_tx.send(()).ok();
    match tokio::time::timeout(config.shutdown_timeout, server).await {
        Ok(Ok(Ok(()))) => tracing::info!("HTTP server stopped"),
        Ok(Ok(Err(e))) => tracing::error!(error = %e, "HTTP server failed"),
        Ok(Err(e)) => tracing::error!(error = %e, "HTTP server task failed"),
        Err(_) => tracing::warn!(
            timeout_secs = config.shutdown_timeout.as_secs(),
            "HTTP server did not drain in time"
        ),
    }

    // Cleanup
    pool.close().await;
    tracing::info!("Database connections closed. Goodbye!");

    Ok(())
}

/// Shutdown signal handler for graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}
