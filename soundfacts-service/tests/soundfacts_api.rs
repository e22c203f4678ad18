mod common;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use common::{body_json, post_json, router_with, router_with_config};
use serde_json::json;
use soundfacts_service::config::SoundfactsConfig;
use soundfacts_service::services::providers::mock::{MockTextProvider, SAMPLE_ANALYSIS};
use soundfacts_service::services::providers::{
    GenerationParams, Prompt, ProviderError, ProviderResponse, TextProvider,
};
use std::sync::Arc;
use tower::ServiceExt;

/// Provider whose call panics mid-request.
struct PanickingProvider;

#[async_trait::async_trait]
impl TextProvider for PanickingProvider {
    fn name(&self) -> &'static str {
        "panicking"
    }

    fn model(&self) -> &str {
        "panicking-model"
    }

    async fn generate(
        &self,
        _prompt: &Prompt,
        _params: &GenerationParams,
    ) -> Result<ProviderResponse, ProviderError> {
        panic!("provider blew up")
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        Ok(())
    }
}

#[tokio::test]
async fn end_to_end_analysis_is_relayed_unchanged() {
    let provider = Arc::new(MockTextProvider::sample());
    let app = router_with(provider.clone());

    let response = app
        .oneshot(post_json(
            r#"{"song": "Bohemian Rhapsody", "artist": "Queen"}"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "*"
    );
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/json"
    );

    let expected: serde_json::Value = serde_json::from_str(SAMPLE_ANALYSIS).unwrap();
    assert_eq!(body_json(response).await, expected);
    assert_eq!(provider.calls(), 1);

    let prompt = provider.last_prompt().unwrap();
    assert!(prompt.user.contains("Song: Bohemian Rhapsody"));
    assert!(prompt.user.contains("Artist: Queen"));
}

#[tokio::test]
async fn fenced_model_output_is_unwrapped() {
    let provider = Arc::new(MockTextProvider::with_text("```json\n{\"song\":\"X\"}\n```"));

    let response = router_with(provider)
        .oneshot(post_json(r#"{"song": "X", "artist": "Y"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"song": "X"}));
}

#[tokio::test]
async fn non_json_model_output_is_reported_with_raw_text() {
    let provider = Arc::new(MockTextProvider::with_text("Sorry, I cannot comply"));

    let response = router_with(provider)
        .oneshot(post_json(r#"{"song": "X", "artist": "Y"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["error"], true);
    assert_eq!(body["message"], "Model returned invalid JSON");
    assert_eq!(body["raw"], "Sorry, I cannot comply");
    assert!(body["parseError"].is_string());
}

#[tokio::test]
async fn missing_fields_return_400_without_provider_call() {
    let provider = Arc::new(MockTextProvider::sample());

    for body in [r#"{"song": "Bohemian Rhapsody"}"#, r#"{"artist": "Queen", "song": ""}"#] {
        let response = router_with(provider.clone())
            .oneshot(post_json(body))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "*"
        );
        assert_eq!(
            body_json(response).await,
            json!({"error": true, "message": "Missing required fields: song and artist"})
        );
    }

    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn get_returns_405_without_provider_call() {
    let provider = Arc::new(MockTextProvider::sample());

    let response = router_with(provider.clone())
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/soundfacts")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(response.headers()[header::ALLOW], "POST, OPTIONS");
    assert_eq!(
        body_json(response).await,
        json!({"error": true, "message": "POST only"})
    );
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn preflight_returns_cors_headers_and_empty_body() {
    let provider = Arc::new(MockTextProvider::sample());

    let response = router_with(provider.clone())
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/api/soundfacts")
                .body(Body::from("garbage"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers().clone();
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], "POST, OPTIONS");
    assert_eq!(
        headers[header::ACCESS_CONTROL_ALLOW_HEADERS],
        "Content-Type, Authorization"
    );

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert!(bytes.is_empty());
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn provider_failure_returns_500_with_details() {
    let provider = Arc::new(MockTextProvider::failing("connection refused"));

    let response = router_with(provider)
        .oneshot(post_json(r#"{"song": "X", "artist": "Y"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "*"
    );
    let body = body_json(response).await;
    assert_eq!(body["error"], true);
    assert_eq!(body["message"], "Sound Facts backend error");
    assert!(body["details"]
        .as_str()
        .unwrap()
        .contains("connection refused"));
}

#[tokio::test]
async fn restricted_origin_is_echoed() {
    let mut config = SoundfactsConfig::default();
    config.cors.allowed_origin = "https://soundfacts.example".to_string();

    let response = router_with_config(config, Arc::new(MockTextProvider::sample()))
        .oneshot(post_json(r#"{"song": "X", "artist": "Y"}"#))
        .await
        .unwrap();

    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "https://soundfacts.example"
    );
}

#[tokio::test]
async fn structure_check_rejects_answers_without_identity() {
    let mut config = SoundfactsConfig::default();
    config.analysis.validate_structure = true;
    let provider = Arc::new(MockTextProvider::with_text(r#"{"final_score": 7}"#));

    let response = router_with_config(config, provider)
        .oneshot(post_json(r#"{"song": "X", "artist": "Y"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({"error": true, "message": "Invalid response structure from AI model"})
    );
}

#[tokio::test]
async fn responses_carry_request_id_and_hardening_headers() {
    let response = router_with(Arc::new(MockTextProvider::sample()))
        .oneshot(
            Request::builder()
                .method("OPTIONS")
                .uri("/api/soundfacts")
                .header("x-request-id", "req-42")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.headers()["x-request-id"], "req-42");
    assert_eq!(response.headers()[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
}

#[tokio::test]
async fn unknown_route_lists_available_endpoints() {
    let response = router_with(Arc::new(MockTextProvider::sample()))
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/unknown")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"], true);
    assert_eq!(body["message"], "Endpoint not found");
    assert_eq!(body["path"], "/api/unknown");
    assert_eq!(body["method"], "GET");
    assert_eq!(
        body["availableEndpoints"],
        json!(["GET /", "GET /health", "POST /api/soundfacts"])
    );
}

#[tokio::test]
async fn index_describes_the_service() {
    let response = router_with(Arc::new(MockTextProvider::sample()))
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["message"], "Sound Facts Backend Running");
    assert_eq!(body["endpoints"]["soundFacts"], "POST /api/soundfacts");
}

#[tokio::test]
async fn readiness_follows_provider_health() {
    let ready = router_with(Arc::new(MockTextProvider::sample()))
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(ready.status(), StatusCode::OK);

    let unready = router_with(Arc::new(MockTextProvider::disabled()))
        .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(unready.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(unready).await;
    assert_eq!(body["error"], true);
    assert_eq!(body["message"], "Service unavailable");
}

#[tokio::test]
async fn oversized_body_gets_json_413_with_cors() {
    let provider = Arc::new(MockTextProvider::sample());
    let body = format!(
        r#"{{"song": "{}", "artist": "Queen"}}"#,
        "a".repeat(3 * 1024 * 1024)
    );

    let response = router_with(provider.clone())
        .oneshot(post_json(&body))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "*"
    );
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "application/json"
    );
    let body = body_json(response).await;
    assert_eq!(body["error"], true);
    assert!(body["message"].is_string());
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn panic_during_analysis_gets_json_500_with_cors() {
    let mut config = SoundfactsConfig::default();
    config.cors.allowed_origin = "https://soundfacts.example".to_string();

    let response = router_with_config(config, Arc::new(PanickingProvider))
        .oneshot(post_json(r#"{"song": "X", "artist": "Y"}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
        "https://soundfacts.example"
    );
    let body = body_json(response).await;
    assert_eq!(body["error"], true);
    assert_eq!(body["message"], "Internal server error");
    assert_eq!(body["details"], "provider blew up");
}
