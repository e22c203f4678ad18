use crate::startup::AppState;
use axum::{
    extract::State,
    http::{Method, StatusCode, Uri},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use service_core::error::AppError;

const SERVICE_NAME: &str = "soundfacts-service";

/// `GET /`
pub async fn index() -> impl IntoResponse {
    Json(json!({
        "message": "Sound Facts Backend Running",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "GET /health",
            "soundFacts": "POST /api/soundfacts"
        }
    }))
}

/// Liveness probe. Never touches the provider.
pub async fn health_check() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "message": "Server is running",
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Readiness probe: ready once the provider is configured.
pub async fn readiness_check(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    match state.text_provider.health_check().await {
        Ok(()) => Ok((
            StatusCode::OK,
            Json(json!({
                "status": "ready",
                "provider": state.text_provider.name(),
                "model": state.text_provider.model()
            })),
        )),
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            Err(AppError::ServiceUnavailable(e.to_string()))
        }
    }
}

/// Fallback for every unknown route.
pub async fn not_found(method: Method, uri: Uri) -> impl IntoResponse {
    tracing::debug!(%method, path = %uri.path(), "Unknown endpoint");
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": true,
            "message": "Endpoint not found",
            "path": uri.path(),
            "method": method.as_str(),
            "availableEndpoints": ["GET /", "GET /health", "POST /api/soundfacts"]
        })),
    )
}
