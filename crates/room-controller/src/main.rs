//! Room Controller
//!
//! Stateful WebSocket signaling and attendance server for real-time
//! meeting coordination.
//!
//! # Servers
//!
//! The Room Controller runs two servers:
//! - WebSocket gateway for client signaling (default: 0.0.0.0:8000)
//! - HTTP server for health endpoints and metrics (default: 0.0.0.0:8081)
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize Prometheus metrics recorder
//! 3. Initialize the actor system (`RoomDirectoryHandle`)
//! 4. Start the health HTTP server (liveness, readiness, metrics)
//! 5. Start the WebSocket gateway
//! 6. Wait for shutdown signal, then drain the actor hierarchy

#![warn(clippy::pedantic)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use metrics_exporter_prometheus::PrometheusBuilder;
use room_controller::actors::{ActorMetrics, RoomDirectoryHandle};
use room_controller::config::Config;
use room_controller::gateway::{gateway_router, GatewayState};
use room_controller::observability::{health_router, HealthState};
use room_controller::persistence::{MemorySink, PersistenceSink};
use room_controller::registry::ConnectionRegistry;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "room_controller=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Room Controller");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;

    info!(
        ws_bind_address = %config.ws_bind_address,
        health_bind_address = %config.health_bind_address,
        sample_interval_seconds = config.sample_interval_seconds,
        "Configuration loaded successfully"
    );

    // Initialize Prometheus metrics recorder before any metrics are recorded
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus metrics recorder")?;

    // Initialize health state
    let health_state = Arc::new(HealthState::new());

    // Initialize actor system
    info!("Initializing actor system...");
    let actor_metrics = ActorMetrics::new();
    let registry = ConnectionRegistry::new();
    // Durable descriptor/report storage is an external collaborator; the
    // in-process sink keeps the core fully functional without one.
    let sink: Arc<dyn PersistenceSink> = MemorySink::new();

    let directory = RoomDirectoryHandle::new(
        registry.clone(),
        sink,
        Arc::clone(&actor_metrics),
        config.sample_interval_seconds,
    );
    info!("Actor system initialized");

    // All servers stop when the directory's token tree is cancelled.
    let shutdown_token = directory.child_token();

    // Start health HTTP server (liveness, readiness, metrics)
    let health_addr: SocketAddr = config
        .health_bind_address
        .parse()
        .context("Invalid health bind address")?;

    let metrics_router = Router::new().route(
        "/metrics",
        axum::routing::get(move || {
            let handle = prometheus_handle.clone();
            async move { handle.render() }
        }),
    );
    let health_app = health_router(Arc::clone(&health_state)).merge(metrics_router);

    // Bind before spawning to fail fast on bind errors
    let health_listener = tokio::net::TcpListener::bind(health_addr)
        .await
        .with_context(|| format!("Failed to bind health server to {health_addr}"))?;
    info!(addr = %health_addr, "Health server bound successfully");

    let health_shutdown_token = shutdown_token.child_token();
    tokio::spawn(async move {
        let server = axum::serve(health_listener, health_app).with_graceful_shutdown(async move {
            health_shutdown_token.cancelled().await;
            info!("Health server shutting down");
        });
        if let Err(e) = server.await {
            error!(error = %e, "Health server failed");
        }
    });
    info!(addr = %health_addr, "Health server started");

    // Start WebSocket gateway
    let ws_addr: SocketAddr = config
        .ws_bind_address
        .parse()
        .context("Invalid gateway bind address")?;

    let gateway_state = GatewayState {
        directory: directory.clone(),
        registry,
        metrics: actor_metrics,
        connections_token: shutdown_token.child_token(),
    };
    let gateway_app = gateway_router(gateway_state);

    let gateway_listener = tokio::net::TcpListener::bind(ws_addr)
        .await
        .with_context(|| format!("Failed to bind gateway to {ws_addr}"))?;

    let gateway_shutdown_token = shutdown_token.child_token();
    tokio::spawn(async move {
        info!(addr = %ws_addr, "Gateway starting");
        let server =
            axum::serve(gateway_listener, gateway_app).with_graceful_shutdown(async move {
                gateway_shutdown_token.cancelled().await;
                info!("Gateway shutting down");
            });
        if let Err(e) = server.await {
            error!(error = %e, "Gateway failed");
        }
    });
    info!(addr = %ws_addr, "Gateway started");

    health_state.set_ready();

    // Wait for shutdown signal
    info!("Room Controller running - press Ctrl+C to shutdown");
    shutdown_signal().await;

    info!("Shutdown signal received, initiating graceful shutdown...");

    // Mark as not ready immediately so orchestrators stop sending traffic
    health_state.set_not_ready();

    // Cancel the actor hierarchy; the token tree takes the servers down too
    directory.cancel();

    // Give tasks time to drain
    tokio::time::sleep(Duration::from_secs(2)).await;

    if !directory.is_cancelled() {
        warn!("Directory still running after shutdown window");
    }

    info!("Room Controller shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed. This is acceptable because
/// without signal handlers, we cannot gracefully shut down the service.
async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
