//! Daemon wiring: job store, dispatcher, publish trigger, reconciler, and
//! the scheduling API server, all sharing one shutdown signal.

use std::path::PathBuf;
use std::sync::Arc;

use miette::Result;
use tokio::sync::watch;
use tracing::{error, info};

use sundial_publish::{PublishTrigger, Reconciler, RecordsClient, RetryTracker, WebhookClient};
use sundial_scheduler::{Dispatcher, JobStore, ScheduleService};
use sundial_web::create_router;

/// Configuration for the daemon.
pub struct DaemonConfig {
    pub api_url: String,
    pub webhook_url: String,
    pub store_path: PathBuf,
    pub port: u16,
    pub workers: usize,
    pub catchup_interval: u64,
}

/// Run the daemon until ctrl-c.
pub async fn run(config: DaemonConfig) -> Result<()> {
    let store = Arc::new(
        JobStore::open(config.store_path.clone())
            .await
            .map_err(|e| miette::miette!("failed to open job store: {}", e))?,
    );
    info!(
        pending = store.pending_count().await,
        path = %config.store_path.display(),
        "job store opened"
    );

    let records = Arc::new(RecordsClient::new(&config.api_url));
    let webhook = Arc::new(WebhookClient::new(&config.webhook_url));
    let retries = Arc::new(RetryTracker::new());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let trigger = Arc::new(PublishTrigger::new(
        Arc::clone(&store),
        Arc::clone(&records),
        Arc::clone(&webhook),
        Arc::clone(&retries),
    ));

    // Dispatcher loop + worker pool
    let dispatcher_handle = {
        let store = Arc::clone(&store);
        let shutdown_rx = shutdown_rx.clone();
        let executor = Arc::clone(&trigger).into_executor();
        let workers = config.workers;
        tokio::spawn(async move {
            Dispatcher::new(store)
                .with_worker_count(workers)
                .run(shutdown_rx, executor)
                .await;
        })
    };

    // Startup + periodic catch-up
    let reconciler_handle = {
        let reconciler = Reconciler::new(Arc::clone(&store), Arc::clone(&records));
        let shutdown_rx = shutdown_rx.clone();
        let interval = config.catchup_interval;
        tokio::spawn(async move {
            reconciler.run(shutdown_rx, interval).await;
        })
    };

    // Scheduling API
    let service = ScheduleService::new(Arc::clone(&store), shutdown_rx.clone());
    let router = create_router(service);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .map_err(|e| miette::miette!("failed to bind port {}: {}", config.port, e))?;
    info!(port = config.port, "scheduling API listening");

    let server_handle = {
        let mut shutdown_rx = shutdown_rx.clone();
        tokio::spawn(async move {
            let shutdown = async move {
                let _ = shutdown_rx.changed().await;
            };
            if let Err(e) = axum::serve(listener, router)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!(error = %e, "API server error");
            }
        })
    };

    // Wait for ctrl-c, then fan the shutdown signal out
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| miette::miette!("failed to listen for shutdown signal: {}", e))?;
    info!("shutdown requested");
    let _ = shutdown_tx.send(true);

    let _ = dispatcher_handle.await;
    let _ = reconciler_handle.await;
    let _ = server_handle.await;

    info!("sundial shut down");
    Ok(())
}
