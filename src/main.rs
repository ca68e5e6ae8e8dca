use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use clap::Parser;
use tokio::signal;
use tracing::info;

use authr::api::routes::{create_router, AppState};
use authr::config::Config;
use authr::observability::{init_tracing, MetricsRegistry};
use authr::policy::{RuleSetLoader, RuleSetWatcher};
use authr::service::ValidationService;
use authr::storage::{MemoryStore, RuleSetStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse configuration
    let config = Config::parse();

    // Initialize tracing
    init_tracing(&config.log_level);

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting authr rule-set engine"
    );

    // Create store and metrics
    let store: Arc<dyn RuleSetStore> = Arc::new(MemoryStore::new());
    let metrics = Arc::new(MetricsRegistry::new());

    // Seed and watch a rule-set definition file (optional)
    let watcher_handle = if let Some(ref path) = config.rule_set_path {
        let loader = RuleSetLoader::new(path.to_string_lossy());
        let watcher = RuleSetWatcher::new(
            loader,
            store.clone(),
            metrics.clone(),
            config.reload_interval(),
        );
        Some(watcher.start().await)
    } else {
        info!("No rule set file configured; rule sets arrive via ingestion only");
        None
    };

    // Periodically reclaim stale staging buffers
    let gc_handle = {
        let store = store.clone();
        let metrics = metrics.clone();
        let ttl = config.buffer_ttl();
        let mut ticker = tokio::time::interval(config.buffer_gc_interval());
        tokio::spawn(async move {
            loop {
                ticker.tick().await;
                let reclaimed = store.reclaim_stale(ttl).await;
                if reclaimed > 0 {
                    metrics.record_reclaimed(reclaimed);
                    info!(reclaimed, "Reclaimed stale buffers");
                }
            }
        })
    };

    // Create validation service and application state
    let service = ValidationService::new(store.clone(), config.eval_limits(), metrics.clone());
    let state = Arc::new(AppState {
        store,
        service,
        metrics,
        start_time: Instant::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    });

    // Create router
    let app = create_router(state);

    // Parse listen address
    let addr: SocketAddr = config.listen_addr.parse()?;

    info!(addr = %addr, "Starting HTTP server");

    // Create TCP listener
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Run server with graceful shutdown
    if config.graceful_shutdown {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
    } else {
        axum::serve(listener, app).await?;
    }

    // Cleanup
    info!("Shutting down...");
    if let Some(handle) = watcher_handle {
        handle.abort();
    }
    gc_handle.abort();

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Received shutdown signal");
}
