//! Inventory worker
//!
//! Connects to PostgreSQL, applies migrations in development and runs the
//! background reorder sweep until interrupted.

use std::{sync::Arc, time::Duration};

use inventory_backend::{
    services::AlertSweeper,
    store::{InventoryStore, PgInventoryStore},
    AppState, Config,
};
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "inventory_worker=debug,inventory_backend=debug,sqlx=warn".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::load()?;

    tracing::info!("Starting inventory worker");
    tracing::info!("Environment: {}", config.environment);

    // Create database connection pool
    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&config.database.url)
        .await?;

    tracing::info!("Database connection established");

    // Run migrations in development
    if config.environment == "development" {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("./migrations").run(&db_pool).await?;
        tracing::info!("Migrations completed");
    }

    let store: Arc<dyn InventoryStore> = Arc::new(PgInventoryStore::new(db_pool));
    let state = AppState::new(store, &config.inventory);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sweeper = AlertSweeper::new(state.alerts.clone(), config.inventory.sweep_interval())
        .spawn(shutdown_rx);

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");

    shutdown_tx.send(true)?;
    sweeper.await?;

    Ok(())
}
