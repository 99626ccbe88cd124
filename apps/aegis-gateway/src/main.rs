//! # Aegis Gateway
//!
//! Authenticated, rate-limited HTTP front door for AI model backends.

use std::sync::Arc;

use actix_web::{App, HttpServer, dev::Server};
use anyhow::Context;
use tracing_actix_web::TracingLogger;

mod config;
mod handlers;
mod lifecycle;
mod middleware;
mod router;
mod state;
mod telemetry;
mod usage;

use config::GatewayConfig;
use lifecycle::{Coordinator, LifecycleError};
use middleware::{Guards, RequestIdMiddleware};
use router::RouteTable;
use state::AppState;
use telemetry::TelemetryConfig;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    telemetry::init_telemetry(&TelemetryConfig::from_env());

    let config = GatewayConfig::from_env().context("invalid configuration")?;

    tracing::info!(
        "Starting Aegis gateway on {}:{}",
        config.host,
        config.port
    );

    let (state, guards) = AppState::build(&config).await?;
    let routes = Arc::new(RouteTable::standard(&config.rate_limit));

    for route in routes.routes() {
        match route.policy {
            Some(policy) => tracing::info!(
                route = %route.id,
                path = %route.path,
                max_requests = policy.max_requests(),
                window_ms = policy.window().as_millis() as u64,
                window_count = policy.window_count(),
                "Route registered"
            ),
            None => tracing::info!(route = %route.id, path = %route.path, "Route registered (unlimited)"),
        }
    }

    let coordinator = Coordinator::new();
    coordinator
        .run(
            |token| async move {
                let server = bind(&config, state, guards, routes).map_err(LifecycleError::Bind)?;
                lifecycle::serve(server, token).await
            },
            lifecycle::watch_signals,
        )
        .await?;

    Ok(())
}

/// Bind the HTTP server. Signal handling is left to the coordinator.
fn bind(
    config: &GatewayConfig,
    state: AppState,
    guards: Guards,
    routes: Arc<RouteTable>,
) -> std::io::Result<Server> {
    let server = HttpServer::new(move || {
        App::new()
            .wrap(TracingLogger::default())
            .wrap(RequestIdMiddleware)
            .configure(|cfg| routes.configure(cfg, &state, &guards))
    })
    .disable_signals()
    .shutdown_timeout(config.shutdown_grace.as_secs())
    .bind((config.host.as_str(), config.port))?;

    tracing::info!(addrs = ?server.addrs(), "Listening");

    Ok(server.run())
}
