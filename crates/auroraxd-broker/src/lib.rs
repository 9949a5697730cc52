// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! auroraxd: per-workspace development observability bus. Fans out structured
//! events from bridges to filtered consumers and brokers control requests
//! between them.

pub mod config;
pub mod control;
pub mod error;
pub mod filter;
pub mod http_bridge;
pub mod lock;
pub mod metrics;
pub mod state;
pub mod transport;

use std::sync::Arc;

use auroraxd_protocol::DiscoveryMetadata;
use chrono::Utc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::BrokerConfig;
use crate::state::BrokerState;
use crate::transport::build_router;

/// Run the broker until shutdown, releasing the workspace lock on exit.
pub async fn run(config: BrokerConfig) -> anyhow::Result<()> {
    let lock_path = config.lock_path();
    let discovery_path = config.discovery_path();

    crate::lock::acquire(&lock_path, &discovery_path, config.session_staleness())?;
    let _guard = crate::lock::LockGuard::new(lock_path.clone(), discovery_path.clone());

    let port = crate::lock::pick_port(&config.host, config.port, 32)?;
    let secret = crate::lock::choose_secret(config.fixed_secret(), &discovery_path, config.session_staleness());

    let meta = DiscoveryMetadata {
        url: format!("ws://{}:{port}", config.host),
        port,
        secret: secret.clone(),
        workspace_path: config.workspace.clone(),
        started_at: Utc::now(),
        pid: std::process::id(),
        heartbeat_at: Utc::now(),
    };
    crate::lock::publish(&discovery_path, &meta)?;

    let shutdown = CancellationToken::new();
    let state = Arc::new(BrokerState::new(config.clone(), secret, shutdown.clone()));

    spawn_signal_handler(shutdown.clone(), config.shutdown_timeout());
    spawn_discovery_heartbeat(
        state.clone(),
        discovery_path.clone(),
        auroraxd_protocol::constants::discovery_heartbeat_interval(),
        meta,
    );
    tokio::spawn(crate::http_bridge::spawn_staleness_sweep(state.clone(), config.session_staleness()));

    let router = build_router(state.clone());
    let listener = TcpListener::bind((config.host.as_str(), port)).await?;
    info!(host = %config.host, port, "auroraxd listening");

    let serve = axum::serve(listener, router).with_graceful_shutdown(shutdown.clone().cancelled_owned());
    tokio::select! {
        result = serve => result?,
        _ = shutdown.cancelled() => {}
    }

    Ok(())
}

/// Periodically rewrite the discovery file's `heartbeatAt`, per §5's 5s timer.
fn spawn_discovery_heartbeat(
    state: Arc<BrokerState>,
    discovery_path: std::path::PathBuf,
    interval: std::time::Duration,
    mut meta: DiscoveryMetadata,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = state.shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    crate::lock::heartbeat(&discovery_path, &mut meta);
                }
            }
        }
    });
}

/// Begin an orderly shutdown on SIGINT/SIGTERM: stop accepting, cancel
/// timers and sessions, and fall back to a forced exit after the configured
/// watchdog (or an immediate second signal) if graceful shutdown does not
/// finish in time.
fn spawn_signal_handler(shutdown: CancellationToken, watchdog: std::time::Duration) {
    tokio::spawn(async move {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
        let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).ok();

        tokio::select! {
            _ = async { if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await } } => {
                info!("received SIGTERM");
            }
            _ = async { if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await } } => {
                info!("received SIGINT");
            }
        }
        shutdown.cancel();

        tokio::select! {
            _ = async { if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await } } => {
                tracing::warn!("received second signal, forcing exit");
            }
            _ = async { if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await } } => {
                tracing::warn!("received second signal, forcing exit");
            }
            _ = tokio::time::sleep(watchdog) => {
                tracing::warn!("graceful shutdown watchdog expired, forcing exit");
            }
        }
        std::process::exit(0);
    });
}
