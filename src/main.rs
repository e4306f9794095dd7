use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use toolbook::config::Config;
use toolbook::model::BookingStatus;
use toolbook::store::WalStore;

/// Opens the booking log, reports what it holds, compacts it, then keeps it
/// compacted until shut down.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env();
    toolbook::observability::init(config.metrics_port)?;

    std::fs::create_dir_all(&config.data_dir)?;
    let store = Arc::new(WalStore::open(&config.wal_path())?);

    let counts = store.memory().status_counts();
    info!("toolbook data_dir: {}", config.data_dir.display());
    for status in BookingStatus::ALL {
        info!("  {status}: {}", counts.get(&status).copied().unwrap_or(0));
    }
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    store.compact().await?;
    info!("booking log compacted; compaction threshold {}", config.compact_threshold);

    let compactor = tokio::spawn(toolbook::compactor::run_compactor(
        store.clone(),
        config.compact_threshold,
    ));

    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();
        #[cfg(unix)]
        {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => {}
                        _ = sigterm.recv() => {}
                    }
                }
                Err(e) => {
                    tracing::warn!("SIGTERM handler unavailable: {e}");
                    ctrl_c.await.ok();
                }
            }
        }
        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
        }
    };
    shutdown.await;

    info!("shutdown signal received");
    compactor.abort();
    toolbook::compactor::compact_if_due(&store, 1).await;
    info!("toolbook stopped");
    Ok(())
}
