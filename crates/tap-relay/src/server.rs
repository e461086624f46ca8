//! Axum HTTP server: router, handlers, listener, graceful shutdown.

use std::path::Path as FsPath;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::classify;
use crate::config::RelayConfig;
use crate::error::AppError;
use crate::relay;
use crate::stats::{round2, PredictionRecord, StatsHandle};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: RelayConfig,
    pub tap_client: reqwest::Client,
    pub predict_client: reqwest::Client,
    pub stats: StatsHandle,
}

/// Build the router. Split from [`run`] so tests can drive it directly.
pub fn build_router(state: AppState) -> Router {
    let static_dir = FsPath::new(&state.config.server.static_dir);
    let spa = ServeDir::new(static_dir).fallback(ServeFile::new(static_dir.join("index.html")));

    Router::new()
        .route("/tap/sync", get(handle_tap_sync))
        .route("/exoplanets/{kind}", get(handle_exoplanets))
        .route("/health", get(handle_health))
        .route("/predict", post(handle_predict))
        .route("/ai/predict", post(handle_ai_predict))
        .route("/api/stats", get(handle_stats))
        .route("/ai/stats", get(handle_stats))
        .route("/ai/stats/reset", post(handle_stats_reset))
        .fallback_service(spa)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Build and run the HTTP server.
pub async fn run(state: AppState) -> anyhow::Result<()> {
    let listen_addr = state.config.server.listen_address.clone();
    let stats = state.stats.clone();

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    tracing::info!(address = %listen_addr, "tap-relay listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Converge the snapshot with memory one last time before exit.
    stats.flush().await;
    tracing::info!("tap-relay shut down gracefully");
    Ok(())
}

#[derive(Debug, Deserialize)]
struct TapParams {
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    format: Option<String>,
}

/// GET /tap/sync — forward a catalog query verbatim to the TAP upstream.
async fn handle_tap_sync(
    State(state): State<Arc<AppState>>,
    Query(params): Query<TapParams>,
) -> Response {
    let query = match params.query.as_deref() {
        Some(q) if !q.is_empty() => q,
        _ => return AppError::BadRequest("Missing query parameter".to_string()).into_response(),
    };
    let format = params.format.as_deref().unwrap_or("json");

    relay_tap(&state, query, format).await
}

/// Shared TAP relay path: count the API call, forward, persist.
async fn relay_tap(state: &AppState, query: &str, format: &str) -> Response {
    state.stats.apply(|s| s.count_api_call());

    let result = relay::forward_tap(&state.tap_client, &state.config.tap.base_url, query, format).await;

    state.stats.flush_background();

    match result {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}

#[derive(Debug, Deserialize)]
struct LimitParams {
    #[serde(default)]
    limit: Option<u32>,
}

/// GET /exoplanets/{kind} — canned catalog queries for the common
/// disposition listings, re-entering the TAP relay path.
async fn handle_exoplanets(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    Query(params): Query<LimitParams>,
) -> Response {
    let Some(query) = catalog_query(&kind, params.limit) else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "unknown exoplanet listing" })),
        )
            .into_response();
    };

    relay_tap(&state, &query, "json").await
}

/// Build the canned TAP query for a disposition listing.
fn catalog_query(kind: &str, limit: Option<u32>) -> Option<String> {
    let (table, filter) = match kind {
        "confirmed" => ("ps", None),
        "candidates" => ("cumulative", Some("koi_disposition = 'CANDIDATE'")),
        "false-positives" => ("cumulative", Some("koi_disposition = 'FALSE POSITIVE'")),
        _ => return None,
    };

    let top = limit.map(|n| format!("TOP {n} ")).unwrap_or_default();
    let filter = filter.map(|f| format!(" WHERE {f}")).unwrap_or_default();
    Some(format!("SELECT {top}* FROM {table}{filter}"))
}

/// Health check endpoint.
async fn handle_health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "message": "TAP relay is running",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// POST /predict — run the rule-based classifier and record the outcome.
async fn handle_predict(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let Some(features) = serde_json::from_slice::<serde_json::Value>(&body)
        .ok()
        .as_ref()
        .and_then(parse_features)
    else {
        return AppError::BadRequest(
            "Invalid input. Expected array of 4 numerical features.".to_string(),
        )
        .into_response();
    };
    let [period, radius, distance, temperature] = features;

    let classification = classify::classify(period, radius, distance, temperature);
    let confidence = round2(classification.confidence);
    let reasoning = classification.reasons.join(", ");

    let updated = state.stats.apply(|s| {
        s.count_api_call();
        s.total_predictions += 1;
        if classification.label == classify::CONFIRMED {
            s.confirmed_predictions += 1;
        } else {
            s.rejected_predictions += 1;
        }
        s.total_confidence += classification.confidence;
        s.push_history(PredictionRecord {
            timestamp: Utc::now(),
            features: Some(features.to_vec()),
            prediction: classification.label.to_string(),
            confidence,
            reasoning: Some(reasoning.clone()),
        });
    });
    state.stats.flush_background();

    Json(json!({
        "prediction": classification.label,
        "confidence": confidence,
        "reasoning": reasoning,
        "model_info": {
            "type": updated.model_type,
            "features_used": [
                "orbital_period",
                "planet_radius",
                "stellar_distance",
                "equilibrium_temp",
            ],
        },
    }))
    .into_response()
}

/// Extract exactly four numeric features from the request body.
fn parse_features(body: &serde_json::Value) -> Option<[f64; 4]> {
    let values = body.get("features")?.as_array()?;
    if values.len() != 4 {
        return None;
    }
    let mut features = [0.0; 4];
    for (slot, value) in features.iter_mut().zip(values) {
        *slot = value.as_f64()?;
    }
    Some(features)
}

/// Numeric feature list of any length, for history entries on the AI path.
fn parse_feature_list(body: &serde_json::Value) -> Option<Vec<f64>> {
    body.get("features")?
        .as_array()?
        .iter()
        .map(serde_json::Value::as_f64)
        .collect()
}

/// POST /ai/predict — relay the body verbatim to the external prediction
/// service and fold the upstream confidence into the statistics.
async fn handle_ai_predict(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let input: Option<serde_json::Value> = serde_json::from_slice(&body).ok();

    state.stats.apply(|s| s.count_api_call());

    let payload =
        match relay::forward_predict(&state.predict_client, &state.config.predict.url, body).await {
            Ok(payload) => payload,
            Err(e) => {
                state.stats.flush_background();
                return e.into_response();
            }
        };

    let confidence = payload.get("confidence").and_then(|c| c.as_f64());
    // Confirmed means upstream confidence strictly above 0.5.
    let label = payload
        .get("prediction")
        .and_then(|p| p.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| {
            if confidence.unwrap_or(0.0) > 0.5 {
                classify::CONFIRMED.to_string()
            } else {
                classify::FALSE_POSITIVE.to_string()
            }
        });
    let features = input.as_ref().and_then(parse_feature_list);

    state.stats.apply(|s| {
        s.total_predictions += 1;
        if let Some(confidence) = confidence {
            s.total_confidence += confidence;
            if confidence > 0.5 {
                s.confirmed_predictions += 1;
            } else {
                s.rejected_predictions += 1;
            }
        }
        s.push_history(PredictionRecord {
            timestamp: Utc::now(),
            features: features.clone(),
            prediction: label.clone(),
            confidence: round2(confidence.unwrap_or(0.0)),
            reasoning: None,
        });
    });
    state.stats.flush_background();

    // The upstream payload goes back unmodified.
    Json(payload).into_response()
}

/// GET /api/stats and /ai/stats — augmented statistics snapshot.
/// Reads are pure: they do not count as API calls and never persist.
async fn handle_stats(State(state): State<Arc<AppState>>) -> Response {
    Json(state.stats.report()).into_response()
}

/// POST /ai/stats/reset — zero runtime counters and history.
async fn handle_stats_reset(State(state): State<Arc<AppState>>) -> Response {
    let fresh = state.stats.apply(|s| s.reset_runtime());
    state.stats.flush_background();
    tracing::info!("Statistics reset");

    Json(json!({
        "message": "Statistics reset successfully",
        "stats": fresh,
    }))
    .into_response()
}

/// Wait for SIGINT (Ctrl+C) for graceful shutdown.
async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install CTRL+C signal handler");
    tracing::info!("Shutdown signal received, draining connections...");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StatsStore;
    use axum::body::Body;
    use axum::http::{header, Request};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    fn test_state(dir: &std::path::Path) -> AppState {
        let mut config = RelayConfig::default();
        config.server.static_dir = dir.join("web").to_string_lossy().into_owned();
        config.stats.file_path = dir.join("model_stats.json").to_string_lossy().into_owned();

        let stats = StatsHandle::new(StatsStore::new(&config.stats.file_path));
        AppState {
            config,
            tap_client: reqwest::Client::new(),
            predict_client: reqwest::Client::new(),
            stats,
        }
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn predict_request(payload: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/predict")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(payload.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_predict_rejects_wrong_feature_count() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let stats = state.stats.clone();
        let app = build_router(state);

        let resp = app
            .oneshot(predict_request(json!({ "features": [1.0, 2.0, 3.0] })))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        // Rejected input mutates nothing.
        let record = stats.snapshot();
        assert_eq!(record.total_predictions, 0);
        assert_eq!(record.api_calls_today, 0);
        assert!(record.prediction_history.is_empty());
    }

    #[tokio::test]
    async fn test_predict_rejects_non_numeric_features() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(dir.path()));

        let resp = app
            .oneshot(predict_request(
                json!({ "features": [300.0, "big", 1.0, 300.0] }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = body_json(resp).await;
        assert_eq!(json["error"], "Invalid input. Expected array of 4 numerical features.");
    }

    #[tokio::test]
    async fn test_predict_full_match_is_confirmed() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let stats = state.stats.clone();
        let app = build_router(state);

        let resp = app
            .oneshot(predict_request(
                json!({ "features": [300.0, 1.0, 1.0, 300.0] }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let json = body_json(resp).await;
        assert_eq!(json["prediction"], "CONFIRMED");
        assert_eq!(json["confidence"], 1.0);
        assert_eq!(json["model_info"]["type"], "Random Forest Classifier");

        let record = stats.snapshot();
        assert_eq!(record.total_predictions, 1);
        assert_eq!(record.confirmed_predictions, 1);
        assert_eq!(record.rejected_predictions, 0);
        assert_eq!(record.api_calls_today, 1);
        assert_eq!(record.prediction_history.len(), 1);
    }

    #[tokio::test]
    async fn test_predict_no_match_is_false_positive() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let stats = state.stats.clone();
        let app = build_router(state);

        let resp = app
            .oneshot(predict_request(
                json!({ "features": [10.0, 5.0, 3.0, 500.0] }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let json = body_json(resp).await;
        assert_eq!(json["prediction"], "FALSE POSITIVE");
        assert_eq!(json["confidence"], 0.0);
        assert!(json["reasoning"]
            .as_str()
            .unwrap()
            .contains("Too close to star"));

        let record = stats.snapshot();
        assert_eq!(record.rejected_predictions, 1);
        assert_eq!(record.confirmed_predictions, 0);
    }

    #[tokio::test]
    async fn test_tap_sync_requires_query_parameter() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let stats = state.stats.clone();
        let app = build_router(state);

        let resp = app
            .clone()
            .oneshot(Request::builder().uri("/tap/sync").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = body_json(resp).await;
        assert_eq!(json["error"], "Missing query parameter");

        // An empty query is as missing.
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/tap/sync?query=")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        // Rejection happens before the API-call count.
        assert_eq!(stats.snapshot().api_calls_today, 0);
    }

    #[tokio::test]
    async fn test_health_payload_shape() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(dir.path()));

        let resp = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let json = body_json(resp).await;
        assert_eq!(json["status"], "ok");
        assert!(json["message"].is_string());
        assert!(json["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_stats_read_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(dir.path()));

        let first = body_json(
            app.clone()
                .oneshot(Request::builder().uri("/api/stats").body(Body::empty()).unwrap())
                .await
                .unwrap(),
        )
        .await;
        let second = body_json(
            app.oneshot(Request::builder().uri("/ai/stats").body(Body::empty()).unwrap())
                .await
                .unwrap(),
        )
        .await;

        assert_eq!(first["total_predictions"], second["total_predictions"]);
        assert_eq!(first["api_calls_today"], second["api_calls_today"]);
        assert_eq!(first["api_calls_today"], 0);
        assert_eq!(first["model_type"], "Random Forest Classifier");
    }

    #[tokio::test]
    async fn test_reset_clears_counters_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path());
        let app = build_router(state);

        // Seed one prediction.
        let resp = app
            .clone()
            .oneshot(predict_request(
                json!({ "features": [300.0, 1.0, 1.0, 300.0] }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/ai/stats/reset")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = body_json(resp).await;
        assert_eq!(json["message"], "Statistics reset successfully");
        assert_eq!(json["stats"]["total_predictions"], 0);

        // A subsequent read reflects the reset immediately.
        let stats = body_json(
            app.oneshot(Request::builder().uri("/ai/stats").body(Body::empty()).unwrap())
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(stats["total_predictions"], 0);
        assert_eq!(stats["recent_predictions_24h"], 0);
        assert!(stats["last_prediction"].is_null());
    }

    #[tokio::test]
    async fn test_exoplanets_unknown_kind_is_404() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(dir.path()));

        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/exoplanets/gas-giants")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_cors_headers_on_dynamic_routes() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(dir.path()));

        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .header(header::ORIGIN, "https://example.com")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert!(resp
            .headers()
            .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
    }

    #[tokio::test]
    async fn test_spa_fallback_serves_index() {
        let dir = tempfile::tempdir().unwrap();
        let web = dir.path().join("web");
        std::fs::create_dir_all(&web).unwrap();
        std::fs::write(web.join("index.html"), "<html>exoplanets</html>").unwrap();

        let app = build_router(test_state(dir.path()));

        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/some/client/route")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"<html>exoplanets</html>");
    }

    #[test]
    fn test_catalog_query_shapes() {
        assert_eq!(
            catalog_query("confirmed", Some(5)).unwrap(),
            "SELECT TOP 5 * FROM ps"
        );
        assert_eq!(catalog_query("confirmed", None).unwrap(), "SELECT * FROM ps");
        assert_eq!(
            catalog_query("candidates", None).unwrap(),
            "SELECT * FROM cumulative WHERE koi_disposition = 'CANDIDATE'"
        );
        assert_eq!(
            catalog_query("false-positives", Some(10)).unwrap(),
            "SELECT TOP 10 * FROM cumulative WHERE koi_disposition = 'FALSE POSITIVE'"
        );
        assert!(catalog_query("moons", None).is_none());
    }

    #[test]
    fn test_parse_features_shapes() {
        assert_eq!(
            parse_features(&json!({ "features": [1, 2, 3, 4] })),
            Some([1.0, 2.0, 3.0, 4.0])
        );
        assert_eq!(parse_features(&json!({ "features": [1, 2, 3] })), None);
        assert_eq!(parse_features(&json!({ "features": "nope" })), None);
        assert_eq!(parse_features(&json!({})), None);
        assert_eq!(parse_features(&json!({ "features": [1, 2, 3, null] })), None);
    }
}
