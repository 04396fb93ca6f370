// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use didcomm_relay::{
    api::router,
    config::{LogFormat, RelayConfig, DEFAULT_LOG_FILTER},
    mediation::GrantAllPolicy,
    relay::{EventBridge, MessageRelay, PlaintextPacker},
    state::AppState,
};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let config = match RelayConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(1);
        }
    };

    init_tracing(config.log_format);

    let relay = MessageRelay::new(config.relay_settings(), Arc::new(PlaintextPacker));
    let (events, _) = broadcast::channel(config.event_bus_capacity);

    let shutdown = CancellationToken::new();
    let bridge = tokio::spawn(
        EventBridge::new(relay.clone()).run(events.subscribe(), shutdown.clone()),
    );

    let state = AppState::new(
        relay,
        events,
        Arc::new(GrantAllPolicy),
        config.heartbeat_interval,
    );
    let app = router(state);

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind listen address");

    tracing::info!(
        address = %addr,
        relay_did = %config.relay_did,
        batch_threshold = config.batch_threshold,
        flush_window_ms = config.flush_window.as_millis() as u64,
        "DIDComm relay listening (docs at /docs)"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await
        .expect("HTTP server failed");

    shutdown.cancel();
    if let Err(e) = bridge.await {
        tracing::warn!(error = %e, "Event bridge task failed");
    }
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

/// Resolves on Ctrl-C or SIGTERM, cancelling `shutdown` for background tasks.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
    shutdown.cancel();
}
