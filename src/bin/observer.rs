//! Observer runtime
//!
//! Follows heavy storage pulse by pulse and keeps the SQLite projection
//! current until CTRL+C.
//!
//! Usage:
//!   cargo run --release --bin observer
//!
//! Environment variables: see `ObserverConfig::from_env`.

use dotenv::dotenv;
use log::{error, info};
use observer::collecting::RecordCache;
use observer::pipeline::{Observer, ObserverConfig};
use observer::sources::ExportClient;
use observer::storage::{SqliteRecordStore, SqliteStorage};
use std::error::Error;
use std::process;
use std::sync::Arc;
use tokio::sync::watch;

#[tokio::main]
async fn main() {
    dotenv().ok();

    let config = match ObserverConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Invalid configuration: {}", e);
            process::exit(1);
        }
    };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.rust_log.as_str()))
        .target(env_logger::Target::Stderr)
        .init();

    if let Err(e) = run(config).await {
        error!("❌ Observer failed: {}", e);
        let mut source = e.source();
        while let Some(cause) = source {
            error!("   └─ caused by: {}", cause);
            source = cause.source();
        }
        process::exit(1);
    }
}

async fn run(config: ObserverConfig) -> Result<(), Box<dyn Error>> {
    info!("🚀 Observer");
    info!("   ├─ Export service: {}", config.export_url);
    info!("   ├─ Database: {}", config.db_path);
    info!("   ├─ Record cache: {} entries", config.cache_size);
    info!("   ├─ Interval: {}ms (fast-forward {}ms)",
        config.interval.as_millis(),
        config.fast_forward_interval.as_millis()
    );
    info!("   └─ Retries: {} every {}ms", config.attempts, config.attempt_interval.as_millis());

    let storage = SqliteStorage::open(&config.db_path)?;
    let records = Arc::new(SqliteRecordStore::open(&config.db_path)?);
    let cache = Arc::new(RecordCache::new(records, config.cache_size));
    let client = ExportClient::new(&config.export_url, config.request_timeout)?;
    info!("✅ Database initialized");

    let mut observer = Observer::new(config, client.clone(), client, storage, cache).await?;

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("⚠️  Received CTRL+C, shutting down...");
                let _ = stop_tx.send(true);
            }
            Err(err) => {
                // Dropping the sender would stop the observer
                error!("❌ Failed to listen for CTRL+C: {}", err);
                std::future::pending::<()>().await;
            }
        }
    });

    info!("🔄 Press CTRL+C to shutdown gracefully");
    observer.run(stop_rx).await?;

    info!("✅ Observer stopped");
    Ok(())
}
