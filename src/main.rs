// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Dogtracks engine server
//!
//! Records GPS tracks offline-first, reconciles them with the central store,
//! and serves the local control and status API.

use dogtracks::{
    config::Config,
    db::LocalStore,
    error::AppError,
    models::Sample,
    services::{
        regions::RegionError, ConnectivityMonitor, HttpRemoteStore, RegionService, RemoteStore,
        TrackRecorder,
    },
    AppState,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging();

    let config = Config::from_env()?;
    tracing::info!(
        port = config.port,
        remote = %config.remote_base_url,
        db = %config.db_path,
        "Starting dogtracks engine"
    );

    let mut store = LocalStore::open(&config.db_path)?;
    let regions = load_regions(&config, &mut store)?;
    tracing::info!(count = regions.regions().len(), "Regions loaded");

    let remote: Arc<dyn RemoteStore> = Arc::new(HttpRemoteStore::new(
        &config.remote_base_url,
        config.request_timeout,
    )?);
    let recorder = Arc::new(TrackRecorder::new(
        store,
        Arc::clone(&remote),
        regions,
        config.recorder_settings(),
    ));

    if let Some(track_id) = recorder.recover()? {
        tracing::info!(track_id = %track_id, "Resumed interrupted session");
    }

    let dispatcher = recorder.spawn_dispatcher(config.sync_interval);
    let monitor = ConnectivityMonitor::new(
        remote,
        Arc::clone(&recorder),
        config.ping_interval,
        config.ping_failures_to_offline,
    )
    .spawn();
    let feeder = config
        .samples_from_stdin
        .then(|| tokio::spawn(feed_samples(Arc::clone(&recorder))));

    let state = Arc::new(AppState {
        config: config.clone(),
        recorder: Arc::clone(&recorder),
    });
    let app = dogtracks::routes::create_router(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    monitor.abort();
    dispatcher.abort();
    if let Some(feeder) = feeder {
        feeder.abort();
    }

    // The session marker is left in place so the next start resumes capture
    match recorder.flush_now().await {
        Ok(Some(report)) => tracing::info!(?report, "Final drain"),
        Ok(None) => {}
        Err(err) => tracing::warn!(error = %err, "Final drain failed"),
    }
    tracing::info!("Shutdown complete");
    Ok(())
}

/// Regions from the configured file, or the last cached set if it is missing.
fn load_regions(config: &Config, store: &mut LocalStore) -> Result<RegionService, AppError> {
    match RegionService::load_from_file(&config.regions_path) {
        Ok(service) => {
            store.log().cache_regions(service.regions())?;
            Ok(service)
        }
        Err(RegionError::IoError(err)) => {
            tracing::warn!(path = %config.regions_path, error = %err, "Region file unavailable, using cached regions");
            let cached = store.log().cached_regions()?.unwrap_or_default();
            Ok(RegionService::from_regions(cached)?)
        }
        Err(err) => Err(err.into()),
    }
}

/// Feed newline-delimited JSON samples from stdin into the recorder.
async fn feed_samples(recorder: Arc<TrackRecorder>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => continue,
            Ok(Some(line)) => match serde_json::from_str::<Sample>(&line) {
                Ok(sample) => {
                    if let Err(err) = recorder.record(sample) {
                        tracing::warn!(error = %err, "Sample not recorded");
                    }
                }
                Err(err) => tracing::warn!(error = %err, "Skipping malformed sample"),
            },
            Ok(None) => {
                tracing::info!("Sample stream closed");
                break;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to read sample stream");
                break;
            }
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("dogtracks=debug,info")),
        )
        .with(format)
        .init();
}
