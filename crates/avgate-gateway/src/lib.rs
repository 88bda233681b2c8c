//! avgate Gateway Library
//!
//! The browser-facing hop: serves the upload form and streams submitted
//! bodies to the upload API without buffering them.

pub mod config;
pub mod form;
pub mod proxy;

use avgate_infra::{request_id_middleware, security_headers_middleware};
use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

pub use config::GatewayArgs;
pub use proxy::ProxyState;

/// `GET /` serves the form, `POST /` forwards to the upload API.
pub fn router(state: ProxyState) -> Router {
    Router::new()
        .route("/", get(form::upload_form).post(proxy::forward_upload))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(security_headers_middleware))
        .layer(axum::middleware::from_fn(request_id_middleware))
        .with_state(state)
}
