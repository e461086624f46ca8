//! Outbound forwarding to the TAP catalog and prediction upstreams.
//!
//! One request out per request in: no retry, no circuit breaking. Upstream
//! non-success status always maps to 502, client timeouts to 504.

use std::time::Instant;

use axum::body::Body;
use axum::response::Response;
use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_TYPE};
use http::HeaderValue;
use tracing::Instrument;

use crate::error::AppError;

/// Request id header attached to every outbound relay request.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

fn generate_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Forward a catalog query to the TAP upstream and stream the body back.
///
/// `query` and `format` are passed through verbatim as URL parameters; the
/// response mirrors the upstream content-type, defaulting to JSON.
pub async fn forward_tap(
    client: &reqwest::Client,
    base_url: &str,
    query: &str,
    format: &str,
) -> Result<Response, AppError> {
    let request_id = generate_request_id();
    let span = tap_tracing::tap_forward_span!(&request_id, base_url);
    let start = Instant::now();

    async {
        let result = client
            .get(base_url)
            .query(&[("query", query), ("format", format)])
            .header(REQUEST_ID_HEADER, &request_id)
            .send()
            .await;

        let upstream = check_upstream(result, start)?;

        let content_type = upstream
            .headers()
            .get(CONTENT_TYPE)
            .cloned()
            .unwrap_or_else(|| HeaderValue::from_static("application/json"));

        Response::builder()
            .status(upstream.status().as_u16())
            .header(CONTENT_TYPE, content_type)
            .body(Body::from_stream(upstream.bytes_stream()))
            .map_err(|e| AppError::Internal(e.to_string()))
    }
    .instrument(span)
    .await
}

/// Relay a prediction request body to the external AI service and return the
/// parsed JSON payload.
pub async fn forward_predict(
    client: &reqwest::Client,
    url: &str,
    body: Bytes,
) -> Result<serde_json::Value, AppError> {
    let request_id = generate_request_id();
    let span = tap_tracing::predict_forward_span!(&request_id, url);
    let start = Instant::now();

    async {
        let result = client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .header(REQUEST_ID_HEADER, &request_id)
            .body(body)
            .send()
            .await;

        let upstream = check_upstream(result, start)?;

        let payload: serde_json::Value = upstream
            .json()
            .await
            .map_err(|e| AppError::Upstream(e.to_string()))?;

        if let Some(confidence) = payload.get("confidence").and_then(|c| c.as_f64()) {
            tracing::Span::current().record("confidence", confidence);
        }

        Ok(payload)
    }
    .instrument(span)
    .await
}

/// Map the raw send result to either a success response or the relay error
/// policy: timeout → 504, connection failure → 502, non-2xx → 502.
fn check_upstream(
    result: Result<reqwest::Response, reqwest::Error>,
    start: Instant,
) -> Result<reqwest::Response, AppError> {
    let latency = start.elapsed().as_millis() as u64;
    tracing::Span::current().record("latency_ms", latency);

    let upstream = match result {
        Ok(resp) => resp,
        Err(e) => {
            if e.is_timeout() {
                tracing::error!(error = %e, "Upstream timeout");
                return Err(AppError::UpstreamTimeout);
            }
            tracing::error!(error = %e, "Upstream connection error");
            return Err(AppError::Upstream(e.to_string()));
        }
    };

    let status = upstream.status();
    tracing::Span::current().record("status", status.as_u16());

    if !status.is_success() {
        tracing::error!(status = status.as_u16(), "Upstream returned non-success status");
        return Err(AppError::UpstreamStatus(status.as_u16()));
    }

    tracing::info!(status = status.as_u16(), latency_ms = latency, "Forward complete");
    Ok(upstream)
}
