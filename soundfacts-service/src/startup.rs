//! Application startup and lifecycle management.

use crate::config::{ProviderKind, SoundfactsConfig};
use crate::handlers::{self, CorsPolicy, SoundFactsHandler};
use crate::services::metrics::http_metrics_middleware;
use crate::services::providers::mock::MockTextProvider;
use crate::services::providers::openai::{OpenAiConfig, OpenAiProvider};
use crate::services::providers::TextProvider;
use crate::services::AnalysisSettings;
use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{any, get},
    Router,
};
use service_core::error::AppError;
use service_core::middleware::{
    panic::panic_response, security_headers::security_headers_middleware,
    tracing::request_id_middleware,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: SoundfactsConfig,
    pub text_provider: Arc<dyn TextProvider>,
    pub soundfacts: Arc<SoundFactsHandler>,
}

impl AppState {
    pub fn new(
        config: SoundfactsConfig,
        text_provider: Arc<dyn TextProvider>,
    ) -> Result<Self, AppError> {
        let cors = CorsPolicy::new(&config.cors.allowed_origin, config.cors.allow_authorization)
            .map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!(
                    "CORS_ALLOWED_ORIGIN is not a valid header value: {}",
                    e
                ))
            })?;

        let settings = AnalysisSettings {
            params: config.generation_params(),
            validate_structure: config.analysis.validate_structure,
        };

        let soundfacts = SoundFactsHandler::new(text_provider.clone(), settings, cors)
            .with_malformed_output_status(config.analysis.malformed_output_status);

        Ok(Self {
            config,
            text_provider,
            soundfacts: Arc::new(soundfacts),
        })
    }
}

/// Construct the configured text provider.
pub fn build_provider(config: &SoundfactsConfig) -> Result<Arc<dyn TextProvider>, AppError> {
    match config.provider {
        ProviderKind::OpenAi => {
            let api_key = config.openai.api_key.clone().ok_or_else(|| {
                AppError::ConfigError(anyhow::anyhow!("OPENAI_API_KEY is required but not set"))
            })?;

            let provider = OpenAiProvider::new(OpenAiConfig {
                api_key,
                base_url: config.openai.base_url.clone(),
                model: config.openai.model.clone(),
                api_style: config.openai.api_style,
                timeout: config.openai.timeout,
            })
            .map_err(|e| AppError::ConfigError(anyhow::Error::new(e)))?;

            tracing::info!(
                model = %config.openai.model,
                api_style = ?config.openai.api_style,
                "Initialized OpenAI text provider"
            );
            Ok(Arc::new(provider))
        }
        ProviderKind::Mock => {
            tracing::warn!("Using mock text provider; responses are canned");
            Ok(Arc::new(MockTextProvider::sample()))
        }
    }
}

/// HTTP router with every route and the shared middleware stack.
pub fn build_router(state: AppState) -> Router {
    // The analysis endpoint catches its own panics so the allow-origin
    // header can still be added to the 500.
    let soundfacts_route = any(handlers::soundfacts)
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(from_fn_with_state(
            state.soundfacts.cors().clone(),
            handlers::cors_origin_middleware,
        ));

    Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .route("/metrics", get(handlers::metrics_handler))
        .route("/api/soundfacts", soundfacts_route)
        .fallback(handlers::not_found)
        .layer(from_fn(http_metrics_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Build the application with the provider named in `config`.
    pub async fn build(config: SoundfactsConfig) -> Result<Self, AppError> {
        let provider = build_provider(&config)?;
        Self::build_with_provider(config, provider).await
    }

    /// Build the application around an already constructed provider.
    pub async fn build_with_provider(
        config: SoundfactsConfig,
        text_provider: Arc<dyn TextProvider>,
    ) -> Result<Self, AppError> {
        let address = config.common.address();
        let state = AppState::new(config, text_provider)?;

        // Port 0 picks a random port for testing
        let listener = TcpListener::bind(&address).await.map_err(|e| {
            tracing::error!("Failed to bind TCP listener to {}: {}", address, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(
            service = "soundfacts-service",
            version = env!("CARGO_PKG_VERSION"),
            port,
            "Listening"
        );

        Ok(Self {
            port,
            listener,
            router: build_router(state),
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Serve until Ctrl-C or SIGTERM, letting in-flight requests finish.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
