use std::sync::Arc;

use tracing::{info, warn};

use tablebook::clock::SystemClock;
use tablebook::config::Config;
use tablebook::engine::Engine;
use tablebook::registry::Seed;
use tablebook::store::WalStore;
use tablebook::{compactor, console};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env()?;
    tablebook::observability::init(config.metrics_port);

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;

    let seed = match &config.seed_path {
        Some(path) => Seed::load(path)?,
        None => {
            warn!("TABLEBOOK_SEED not set, starting with no tables or customers");
            Seed::default()
        }
    };
    let (tables, customers) = seed.into_collaborators();

    let wal_path = config.wal_path();
    let store = Arc::new(WalStore::open(&wal_path, config.engine.buffer)?);
    let compactor_store = store.clone();
    let threshold = config.compact_threshold;
    tokio::spawn(async move {
        compactor::run_compactor(compactor_store, threshold).await;
    });

    info!("tablebook ready");
    info!("  wal: {}", wal_path.display());
    info!("  tables: {}", tables.len());
    info!(
        "  hours: {}-{}, buffer {}m",
        config.engine.opening,
        config.engine.closing,
        config.engine.buffer / 60
    );
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    let engine = Engine::new(
        Arc::new(tables),
        Arc::new(customers),
        store,
        Arc::new(SystemClock),
        config.engine,
    );

    tokio::select! {
        result = console::serve(&engine, tokio::io::stdin(), tokio::io::stdout()) => {
            result?;
            info!("input closed");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
    }

    info!("tablebook stopped");
    Ok(())
}
