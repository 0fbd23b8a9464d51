//! Observability HTTP Routes
//!
//! Service banner, health check and metrics.

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;

use super::promotion_routes::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub environment: String,
}

#[derive(Debug, Serialize)]
pub struct BannerResponse {
    pub message: String,
}

/// Create observability routes
pub fn observability_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Root banner and health check
pub fn health_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(banner_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

async fn banner_handler() -> Json<BannerResponse> {
    Json(BannerResponse {
        message: "Welcome to the promoter API".to_string(),
    })
}

/// Health check handler
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        environment: state.environment.clone(),
    };

    (StatusCode::OK, Json(response))
}

/// Metrics handler - counters of the controller's registry
async fn metrics_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let metrics = state.controller.observer().metrics().to_json();
    (StatusCode::OK, Json(metrics))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: "healthy".to_string(),
            version: "0.1.0".to_string(),
            environment: "staging".to_string(),
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["environment"], "staging");
    }
}
