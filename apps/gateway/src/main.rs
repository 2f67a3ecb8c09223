mod config;
mod envelope;
mod health;
mod proxy;
mod registry;
mod routes;
mod state;
mod status;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::health::HealthMonitor;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting gateway v{}", env!("CARGO_PKG_VERSION"));

    let state = AppState::new(config.clone());
    for service in state.registry.all() {
        info!("Registered service '{}' at {}", service.name, service.base_url);
    }

    // Bind first: a port conflict must fail fast, before any probe
    // traffic or background work starts.
    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(
                "Cannot bind port {}: {e}. Is another gateway instance already running?",
                config.port
            );
            std::process::exit(1);
        }
    };

    // Cold-start sweep so /api/health answers from real data the
    // moment we accept connections.
    let monitor = Arc::new(HealthMonitor::new(
        state.http.clone(),
        (*state.registry).clone(),
        state.status.clone(),
        Duration::from_secs(config.probe_timeout_secs),
        Duration::from_secs(config.health_interval_secs),
    ));
    info!("Running startup health sweep...");
    monitor.probe_all().await;
    info!(
        "Startup sweep complete: {} of {} services available",
        state
            .status
            .snapshot()
            .values()
            .filter(|s| s.available)
            .count(),
        state.registry.all().len()
    );

    tokio::spawn({
        let monitor = Arc::clone(&monitor);
        async move { monitor.run().await }
    });

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // the SPA dev server sits on another origin

    info!("Listening on {addr}");
    axum::serve(listener, app).await?;

    Ok(())
}
