//! Streaming upload forwarder.
//!
//! The request body is handed to reqwest as a stream and the upstream
//! response is relayed the same way, so the gateway never holds a whole
//! upload in memory.

use avgate_core::{AppError, ErrorMetadata, UploadResponse};
use avgate_infra::get_request_id;
use avgate_infra::middleware::request_id::REQUEST_ID_HEADER;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{
        header::{CONTENT_LENGTH, CONTENT_TYPE},
        StatusCode,
    },
    response::{IntoResponse, Response},
    Json,
};
use std::time::Instant;

use crate::config::GatewayArgs;

#[derive(Clone, Debug)]
pub struct ProxyState {
    client: reqwest::Client,
    upstream: reqwest::Url,
}

impl ProxyState {
    pub fn new(client: reqwest::Client, upstream: reqwest::Url) -> Self {
        Self { client, upstream }
    }

    pub fn from_args(args: &GatewayArgs) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(args.connect_timeout())
            .build()?;
        Ok(Self::new(client, args.upstream_url.clone()))
    }

    pub fn upstream(&self) -> &reqwest::Url {
        &self.upstream
    }
}

/// Forward `POST /` to the upload API.
///
/// Only the framing headers travel upstream (plus the request id); the
/// upload API answers with its own status and JSON body, which are relayed
/// unchanged.
pub async fn forward_upload(State(state): State<ProxyState>, request: Request) -> Response {
    let start = Instant::now();
    let request_id = get_request_id(&request);
    let (parts, body) = request.into_parts();

    let mut upstream = state
        .client
        .post(state.upstream.clone())
        .body(reqwest::Body::wrap_stream(body.into_data_stream()));

    for name in [CONTENT_TYPE, CONTENT_LENGTH] {
        if let Some(value) = parts.headers.get(&name) {
            upstream = upstream.header(name, value.clone());
        }
    }
    if let Some(id) = request_id {
        upstream = upstream.header(REQUEST_ID_HEADER, id);
    }

    match upstream.send().await {
        Ok(response) => {
            tracing::debug!(
                status = response.status().as_u16(),
                duration_ms = start.elapsed().as_millis() as u64,
                "Upstream responded"
            );
            relay(response)
        }
        Err(e) => {
            tracing::warn!(
                upstream = %state.upstream,
                error = %e,
                duration_ms = start.elapsed().as_millis() as u64,
                "Failed to forward upload"
            );
            upstream_unavailable(AppError::UpstreamUnavailable(e.to_string()), start)
        }
    }
}

fn relay(upstream: reqwest::Response) -> Response {
    let status = upstream.status();
    let content_type = upstream.headers().get(CONTENT_TYPE).cloned();

    let mut response = Body::from_stream(upstream.bytes_stream()).into_response();
    *response.status_mut() = status;
    if let Some(content_type) = content_type {
        response.headers_mut().insert(CONTENT_TYPE, content_type);
    }
    response
}

/// Answer in the upload API's own envelope so clients parse one shape.
fn upstream_unavailable(err: AppError, start: Instant) -> Response {
    let status =
        StatusCode::from_u16(err.http_status_code()).unwrap_or(StatusCode::BAD_GATEWAY);
    let body = UploadResponse::request_failed(&err, start.elapsed().as_millis() as u64);
    (status, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::router;
    use axum::{body::Bytes, http::HeaderMap, routing::post, Router};
    use tower::ServiceExt;

    async fn spawn_upstream() -> reqwest::Url {
        let app = Router::new().route(
            "/",
            post(|headers: HeaderMap, body: Bytes| async move {
                let header = |name: &str| {
                    headers
                        .get(name)
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_owned)
                };
                (
                    StatusCode::CREATED,
                    Json(serde_json::json!({
                        "contentType": header("content-type"),
                        "requestId": header("x-request-id"),
                        "received": body.len(),
                    })),
                )
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{}/", addr).parse().unwrap()
    }

    fn state(upstream: reqwest::Url) -> ProxyState {
        ProxyState::new(reqwest::Client::new(), upstream)
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn forwards_body_and_relays_response() {
        let upstream = spawn_upstream().await;
        let payload = vec![7u8; 256 * 1024];

        let response = router(state(upstream))
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/")
                    .header(CONTENT_TYPE, "multipart/form-data; boundary=xyz")
                    .header(REQUEST_ID_HEADER, "gw-test-1")
                    .body(Body::from(payload.clone()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
        let body = json_body(response).await;
        assert_eq!(body["contentType"], "multipart/form-data; boundary=xyz");
        assert_eq!(body["requestId"], "gw-test-1");
        assert_eq!(body["received"], payload.len());
    }

    #[tokio::test]
    async fn unreachable_upstream_is_bad_gateway() {
        // Reserve a port, then free it so nothing is listening there.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        let upstream = format!("http://{}/", addr).parse().unwrap();

        let response = router(state(upstream))
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/")
                    .body(Body::from("data"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        let body = json_body(response).await;
        assert_eq!(body["code"], "UPSTREAM_UNAVAILABLE");
        assert_eq!(body["recoverable"], true);
        assert_eq!(body["message"], "Upload service unavailable");
        assert!(body["time"].is_u64());
    }

    #[tokio::test]
    async fn serves_upload_form() {
        let response = router(state("http://localhost:1/".parse().unwrap()))
            .oneshot(
                axum::http::Request::builder()
                    .uri("/")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let html = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(html.contains(r#"enctype="multipart/form-data""#));
        assert!(html.contains(r#"name="file""#));
    }
}
