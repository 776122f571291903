//! Facility Wallet Service - HTTP API for facility wallets and top-ups.
//!
//! This is the main entry point for the facility-wallet service.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use facility_wallet_service::{create_router, AppState, ServiceConfig};
use facility_wallet_store::{PgStore, RocksStore, Store};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,facility_wallet=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Facility Wallet Service");

    let config = ServiceConfig::from_env();
    config.validate()?;
    let backend = if config.database_url.is_some() {
        "postgres"
    } else {
        "rocksdb"
    };

    tracing::info!(
        listen_addr = %config.listen_addr,
        backend = %backend,
        currency = %config.currency,
        topup_min = %config.topup_min_amount,
        topup_max = %config.topup_max_amount,
        paystack_configured = %config.paystack_secret_key.is_some(),
        "Service configuration loaded"
    );

    let store: Arc<dyn Store> = if let Some(url) = &config.database_url {
        tracing::info!("Connecting to PostgreSQL");
        let store = PgStore::connect(url, config.lock_timeout_ms).await?;
        store.migrate().await?;
        Arc::new(store)
    } else {
        tracing::info!(path = %config.data_dir, "Opening RocksDB store");
        Arc::new(RocksStore::open_with_lock_timeout(
            &config.data_dir,
            i64::try_from(config.lock_timeout_ms).unwrap_or(i64::MAX),
        )?)
    };

    let state = AppState::new(store, config.clone());

    let app = create_router(state);
    tracing::info!("Router configured with all API endpoints");

    tracing::info!(listen_addr = %config.listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
