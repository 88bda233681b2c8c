//! Health check handler and response type.

use crate::state::AppState;
use avgate_services::VirusScanner;
use avgate_storage::Storage;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(5);
const HEALTHY: &str = "healthy";

/// Run an async check with timeout; returns status string "healthy", "timeout", or "{prefix}: {error}".
async fn run_check<F, E>(timeout: Duration, f: F, error_prefix: &str) -> String
where
    F: Future<Output = Result<(), E>>,
    E: Display,
{
    match tokio::time::timeout(timeout, f).await {
        Ok(Ok(())) => HEALTHY.to_string(),
        Ok(Err(e)) => format!("{}: {}", error_prefix, e),
        Err(_) => "timeout".to_string(),
    }
}

#[derive(Debug, serde::Serialize)]
pub struct HealthCheckResponse {
    pub status: String,
    pub storage: String,
    pub clamav: String,
}

/// Storage root and clamd reachability.
///
/// Uploads fail closed without clamd, so an unreachable scanner makes the
/// service unhealthy, not merely degraded.
pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let storage = state.storage().clone();
    let scanner = state.scanner().clone();

    let (storage, clamav) = tokio::join!(
        run_check(
            TIMEOUT,
            async move {
                storage
                    .exists("health-check-non-existent-key")
                    .await
                    .map(drop)
            },
            "unhealthy",
        ),
        run_check(TIMEOUT, async move { scanner.ping().await }, "unreachable"),
    );

    let overall_healthy = storage == HEALTHY && clamav == HEALTHY;
    if !overall_healthy {
        tracing::warn!(storage = %storage, clamav = %clamav, "Health check failed");
    }

    let response = HealthCheckResponse {
        status: if overall_healthy { "healthy" } else { "unhealthy" }.to_string(),
        storage,
        clamav,
    };

    let status_code = if overall_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(response))
}
