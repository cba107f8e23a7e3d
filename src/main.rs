use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use lodging_reservations::store::memory::InMemoryStore;
use lodging_reservations::{
    AvailabilityEngine, CacheFacade, ListingService, LodgingConfig, RequestQueue,
    ReservationManager, RetryPolicy, Scheduler, StoreGateway, UnitCatalog,
};

const DEFAULT_CONFIG_PATH: &str = "lodging.toml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config_path = std::env::var("LODGING_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));
    let config = LodgingConfig::load(Some(&config_path)).context("loading configuration")?;

    let cache = Arc::new(CacheFacade::from_config(&config.cache).context("building cache")?);

    // In-process store; a hosted record store plugs in behind the same trait
    let store = Arc::new(InMemoryStore::new());
    let queue = Arc::new(RequestQueue::new(config.queue.min_interval()));
    let gateway = StoreGateway::new(
        store,
        queue.clone(),
        RetryPolicy::new(config.retry.clone()),
        config.reservations.query_page_size,
    );

    let catalog = UnitCatalog::new(gateway.clone(), cache.clone());
    let engine = AvailabilityEngine::new(gateway.clone(), cache.clone(), catalog);
    let manager = Arc::new(ReservationManager::new(
        gateway,
        cache.clone(),
        engine.clone(),
        config.reservations.clone(),
    ));
    let listings = ListingService::new(cache.clone(), engine);

    let scheduler = Scheduler::new(manager, cache.clone(), &config.reservations);
    scheduler.start();

    let units = listings.list_units().await.map(|l| l.len()).unwrap_or(0);
    info!(
        units,
        cache = %cache.ping().await,
        "Reservation service ready, press ctrl-c to stop"
    );

    tokio::signal::ctrl_c()
        .await
        .context("waiting for ctrl-c")?;

    info!("Shutting down");
    scheduler.shutdown().await;
    cache.shutdown().await;
    queue.shutdown();
    Ok(())
}
