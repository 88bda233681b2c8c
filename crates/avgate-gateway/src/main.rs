//! avgate gateway: serves the upload form and streams uploads to the API.
//!
//! Set GATEWAY_PORT and UPSTREAM_URL (or pass --port / --upstream-url).

use anyhow::Context;
use avgate_gateway::{router, GatewayArgs, ProxyState};
use avgate_infra::{init_telemetry, shutdown_telemetry, LogFormat};
use clap::Parser;

const DEFAULT_LOG_FILTER: &str = "avgate=debug,tower_http=debug";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = GatewayArgs::parse();

    init_telemetry(
        DEFAULT_LOG_FILTER,
        LogFormat::for_environment(args.is_production()),
    )
    .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    let state = ProxyState::from_args(&args).context("Failed to build upstream HTTP client")?;

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    tracing::info!(
        addr = %addr,
        upstream = %state.upstream(),
        "Gateway ready and accepting connections"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down gracefully...");
    shutdown_telemetry().await;
}
