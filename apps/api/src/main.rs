use std::net::SocketAddr;
use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wattline_api::config::{Config, StoreBackend};
use wattline_api::repositories::{DeviceStore, InMemoryDeviceStore, PgDeviceStore};
use wattline_api::services::Authenticator;
use wattline_api::{app_router, AppServices, LivenessBroadcaster, RegistryConfig, SessionManager};

/// Open the configured device store, running migrations for PostgreSQL
async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn DeviceStore>> {
    match config.store_backend {
        StoreBackend::Postgres => {
            let database = config.database();
            tracing::info!("Connecting to database...");

            let pool = PgPoolOptions::new()
                .max_connections(database.max_connections)
                .min_connections(database.min_connections)
                .acquire_timeout(std::time::Duration::from_secs(
                    database.connect_timeout_secs,
                ))
                .idle_timeout(std::time::Duration::from_secs(database.idle_timeout_secs))
                .connect(&database.url)
                .await?;

            tracing::info!("Database connection established");

            tracing::info!("Running database migrations...");
            sqlx::migrate!("./migrations").run(&pool).await?;
            tracing::info!("Migrations completed successfully");

            Ok(Arc::new(PgDeviceStore::new(pool)))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory device store; records are lost on restart");
            Ok(Arc::new(InMemoryDeviceStore::new()))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "wattline_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Config::from_env()?;

    tracing::info!(
        port = config.port,
        backend = %config.store_backend,
        environment = ?config.environment(),
        "Starting Wattline API server"
    );

    let store = open_store(&config).await?;

    // Session registry and its dispatch task
    let manager = SessionManager::start(
        store.clone(),
        RegistryConfig {
            store_timeout: config.store_timeout,
            ..Default::default()
        },
    );
    tracing::info!("Session registry started");

    let broadcaster = LivenessBroadcaster::new(manager.clone(), config.broadcast_interval)?;
    let broadcaster_handle = broadcaster.spawn();

    let authenticator =
        Authenticator::new(store.clone()).with_store_timeout(config.store_timeout);
    let services = AppServices::new(manager.clone(), store).with_authenticator(authenticator);

    let app = app_router(services);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;

    tracing::info!("Listening on {}", addr);

    let shutdown_manager = manager.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                return;
            }
            tracing::info!("Shutdown signal received, closing device sessions");
            // Closing the sessions ends every open stream so the server can drain
            shutdown_manager.shutdown();
        })
        .await?;

    manager.shutdown();
    broadcaster_handle.abort();

    tracing::info!("Server stopped");
    Ok(())
}
