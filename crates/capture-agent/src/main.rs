//! # capture-agent
//!
//! Local service that owns the offline capture queue for the HACCP app.
//!
//! The UI posts captured photos to it over a loopback HTTP API. The agent
//! compresses and queues them, watches reachability, and drains the queue
//! into object storage and the document store whenever the device is
//! online.

mod api;
mod config;
mod error;

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use capture_net::{HttpFieldUpdater, HttpProbe, HttpUploadClient, ReachabilityMonitor};
use capture_shared::constants::CAPTURE_DIR_NAME;
use capture_store::{ImageStore, QueueStore};
use capture_sync::QueueCoordinator;

use crate::api::AppState;
use crate::config::AgentConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // -----------------------------------------------------------------------
    // 1. Tracing (RUST_LOG)
    // -----------------------------------------------------------------------
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("info,capture_agent=debug,capture_sync=debug")
            }),
        )
        .init();

    info!("Starting capture agent v{}", env!("CARGO_PKG_VERSION"));

    // -----------------------------------------------------------------------
    // 2. Configuration
    // -----------------------------------------------------------------------
    let config = AgentConfig::from_env();
    info!(
        http_addr = %config.http_addr,
        storage_url = %config.storage_url,
        documents_url = %config.documents_url,
        auth = config.auth_token.is_some(),
        allowed_origins = ?config.allowed_origins,
        "Loaded configuration"
    );

    // -----------------------------------------------------------------------
    // 3. Local storage
    // -----------------------------------------------------------------------
    let store = match &config.queue_path {
        Some(path) => QueueStore::open_at(path.clone()),
        None => QueueStore::open_default()?,
    };
    let capture_dir = match &config.capture_dir {
        Some(dir) => dir.clone(),
        None => capture_store::default_data_dir()?.join(CAPTURE_DIR_NAME),
    };
    let images = ImageStore::new(capture_dir, config.image_config()).await?;

    // -----------------------------------------------------------------------
    // 4. Remote collaborators and reachability
    // -----------------------------------------------------------------------
    let uploader = HttpUploadClient::new(config.storage_url.clone(), config.auth_token.clone())
        .with_timeout(config.call_timeout);
    let updater = HttpFieldUpdater::new(config.documents_url.clone(), config.auth_token.clone())
        .with_timeout(config.call_timeout);
    let reachability = ReachabilityMonitor::new(Arc::new(HttpProbe::new(config.probe_config())));

    let coordinator = QueueCoordinator::open(
        store,
        Some(images.clone()),
        Arc::new(uploader),
        Arc::new(updater),
        reachability.clone(),
        config.sync_config(),
    )
    .await;

    // -----------------------------------------------------------------------
    // 5. Startup drain, then react to reconnects
    // -----------------------------------------------------------------------
    let online = reachability.check_now().await;
    let _reconnects = coordinator.attach();

    if online && coordinator.pending_count().await > 0 {
        let startup = coordinator.clone();
        tokio::spawn(async move {
            startup.drain_queue().await;
        });
    }

    let poller = reachability.spawn_polling(config.poll_interval);

    // -----------------------------------------------------------------------
    // 6. Local API (runs until shutdown)
    // -----------------------------------------------------------------------
    let state = AppState {
        coordinator,
        images,
        reachability,
    };

    tokio::select! {
        result = api::serve(state, config.http_addr, &config.allowed_origins) => {
            if let Err(e) = result {
                error!(error = %e, "HTTP server failed");
                poller.abort();
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    poller.abort();
    Ok(())
}
