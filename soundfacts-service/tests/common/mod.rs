#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, Request};
use axum::Router;
use soundfacts_service::config::{ProviderKind, SoundfactsConfig};
use soundfacts_service::services::providers::TextProvider;
use soundfacts_service::startup::{build_router, AppState, Application};
use std::sync::Arc;

/// Router wired to `provider`, with default settings.
pub fn router_with(provider: Arc<dyn TextProvider>) -> Router {
    router_with_config(SoundfactsConfig::default(), provider)
}

pub fn router_with_config(config: SoundfactsConfig, provider: Arc<dyn TextProvider>) -> Router {
    let state = AppState::new(config, provider).expect("Failed to build app state");
    build_router(state)
}

pub fn post_json(body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/soundfacts")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("Failed to build request")
}

pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("Failed to read body");
    serde_json::from_slice(&bytes).expect("Body is not JSON")
}

pub struct TestApp {
    pub address: String,
    pub port: u16,
}

impl TestApp {
    /// Start a real server on a random port backed by the mock provider.
    pub async fn spawn(provider: Arc<dyn TextProvider>) -> Self {
        let mut config = SoundfactsConfig::default();
        config.common.host = "127.0.0.1".to_string();
        config.common.port = 0; // Random port for testing
        config.provider = ProviderKind::Mock;

        let app = Application::build_with_provider(config, provider)
            .await
            .expect("Failed to build test application");

        let port = app.port();
        let address = format!("http://127.0.0.1:{}", port);

        tokio::spawn(async move {
            app.run_until_stopped().await.ok();
        });

        // Wait for the server to be ready by polling the health endpoint
        let client = reqwest::Client::new();
        let health_url = format!("{}/health", address);
        for _ in 0..50 {
            if client.get(&health_url).send().await.is_ok() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;
        }

        TestApp { address, port }
    }
}
