//! HTTP surface for the anomaly detection service.
//!
//! This module is a thin layer over the detection engine: it holds no
//! detection logic and maps unrecoverable pipeline errors to a single 500
//! response. Per-record failures never surface here (see the store and
//! detector fail-open policies).

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::detect::AnomalyEngine;
use crate::error::Result;
use crate::types::{DetectionRequest, DetectionResponse};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<AnomalyEngine>,
}

/// Build the service router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/detect-anomalies", post(detect_anomalies))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve the detection API on the given address.
pub async fn serve(addr: &str, engine: Arc<AnomalyEngine>) -> Result<()> {
    let app = router(AppState { engine });

    info!("Starting attendance anomaly detection server on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn root() -> Json<Value> {
    Json(json!({
        "status": "AI Anomaly Detection Service is Ready",
        "version": env!("CARGO_PKG_VERSION"),
        "algorithms": [
            "Time-based Anomaly Detection",
            "Duplicate Detection",
            "Statistical Anomaly Detection (Isolation Forest)"
        ]
    }))
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339()
    }))
}

async fn detect_anomalies(
    State(state): State<AppState>,
    Json(request): Json<DetectionRequest>,
) -> std::result::Result<Json<DetectionResponse>, (StatusCode, Json<Value>)> {
    info!(
        "Received detection request: session={:?}, student={:?}, limit={:?}",
        request.session_id, request.student_id, request.limit
    );

    match state.engine.detect(&request).await {
        Ok(response) => Ok(Json(response)),
        Err(e) => {
            error!("Anomaly detection failed: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "detail": format!("Anomaly detection failed: {}", e) })),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_reports_timestamp() {
        let Json(body) = health().await;
        assert_eq!(body["status"], "healthy");
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_root_lists_algorithms() {
        let Json(body) = root().await;
        assert_eq!(body["algorithms"].as_array().unwrap().len(), 3);
    }
}
