//! Scan dispatch service: runs the queue supervisor tick loop and exposes a
//! minimal read-only admin surface over its state.

mod config;
mod error;
mod routes;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use scan_core::handler::{
    ForkingHandlerLauncher, HandlerRuntimeConfig, InMemoryTaskRepository, ProcessProbe, UnixProcessProbe,
};
use scan_core::queue::InMemoryQueueStore;
use scan_core::scanner::OspScannerClient;
use scan_core::semaphore::LocalSemaphoreGate;
use scan_core::supervisor::{self, SupervisorConfig};
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use config::ConfigLoader;
use routes::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scan_server=info,scan_core=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ConfigLoader::new().load()?;
    info!(port = config.server_port, "scan-server configuration loaded");

    let queue: Arc<dyn scan_core::queue::QueueStore> = Arc::new(InMemoryQueueStore::new());
    let repo: Arc<dyn scan_core::handler::TaskRepository> =
        Arc::new(InMemoryTaskRepository::new(scan_model::ScannerConnectionData::default()));
    let probe: Arc<dyn ProcessProbe> = Arc::new(UnixProcessProbe);
    let scanner: Arc<dyn scan_core::scanner::ScannerClient> = Arc::new(OspScannerClient::new(None));
    let gate: Arc<dyn scan_core::semaphore::SemaphoreGate> =
        Arc::new(LocalSemaphoreGate::new(config.max_concurrent_scan_updates));
    let handler_config = HandlerRuntimeConfig {
        scan_handler_active_time: Duration::from_secs(config.scan_handler_active_time_secs),
        scanner_connection_retry_ceiling: config.scanner_connection_retry,
        max_active_scan_handlers: config.max_active_scan_handlers,
        ..HandlerRuntimeConfig::default()
    };
    let launcher = Arc::new(ForkingHandlerLauncher::new(
        scanner,
        repo.clone(),
        gate,
        queue.clone(),
        handler_config,
    ));
    let supervisor_ticked = Arc::new(AtomicBool::new(false));

    let state = AppState {
        queue: queue.clone(),
        repo: repo.clone(),
        supervisor_ticked: supervisor_ticked.clone(),
    };

    let supervisor_config = SupervisorConfig {
        use_scan_queue: config.use_scan_queue,
        max_active_scan_handlers: config.max_active_scan_handlers,
    };

    let supervisor_tick_interval_secs = config.supervisor_tick_interval_secs;
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(supervisor_tick_interval_secs));
        loop {
            interval.tick().await;
            match supervisor::tick(queue.as_ref(), probe.as_ref(), launcher.as_ref(), supervisor_config).await {
                Ok(active) => {
                    supervisor_ticked.store(true, Ordering::Relaxed);
                    info!(active, "supervisor tick complete");
                }
                Err(e) => warn!(error = %e, "supervisor tick failed"),
            }
        }
    });

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "scan-server listening");
    axum::serve(listener, routes::router(state)).await?;

    Ok(())
}
