//! The `/api/soundfacts` endpoint.
//!
//! [`SoundFactsHandler::handle`] takes a method, headers and raw body and
//! returns a status, headers and body, independent of any web framework. The
//! axum handler at the bottom is a thin adapter over it.

use crate::models::{AnalysisPayload, AnalysisRequest};
use crate::services::analysis::{analyze, AnalysisError, AnalysisSettings};
use crate::services::metrics;
use crate::services::providers::TextProvider;
use crate::startup::AppState;
use axum::{
    body::{Body, Bytes},
    extract::{rejection::BytesRejection, Request, State},
    http::{
        header::{self, InvalidHeaderValue},
        HeaderMap, HeaderValue, Method, StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{json, Value};
use service_core::error::AppError;
use std::sync::Arc;

const ALLOWED_METHODS: &str = "POST, OPTIONS";
const BACKEND_ERROR_MESSAGE: &str = "Sound Facts backend error";

/// Cross-origin headers attached to every response of the endpoint.
#[derive(Debug, Clone)]
pub struct CorsPolicy {
    allowed_origin: HeaderValue,
    allow_authorization: bool,
}

impl CorsPolicy {
    pub fn new(allowed_origin: &str, allow_authorization: bool) -> Result<Self, InvalidHeaderValue> {
        Ok(Self {
            allowed_origin: HeaderValue::from_str(allowed_origin)?,
            allow_authorization,
        })
    }

    fn apply_origin(&self, headers: &mut HeaderMap) {
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            self.allowed_origin.clone(),
        );
    }

    fn apply_preflight(&self, headers: &mut HeaderMap) {
        self.apply_origin(headers);
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOWED_METHODS),
        );
        let allowed_headers = if self.allow_authorization {
            "Content-Type, Authorization"
        } else {
            "Content-Type"
        };
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(allowed_headers),
        );
    }
}

impl Default for CorsPolicy {
    fn default() -> Self {
        Self {
            allowed_origin: HeaderValue::from_static("*"),
            allow_authorization: true,
        }
    }
}

/// Framework-neutral response: status, headers and body bytes.
#[derive(Debug, Clone)]
pub struct HandlerResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HandlerResponse {
    fn empty(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    fn json<T: Serialize>(status: StatusCode, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => {
                let mut headers = HeaderMap::new();
                headers.insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                );
                Self {
                    status,
                    headers,
                    body: Bytes::from(body),
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize response body");
                Self::from_app_error(&AppError::InternalError(anyhow::anyhow!(
                    "Failed to serialize response: {}",
                    e
                )))
            }
        }
    }

    fn from_app_error(err: &AppError) -> Self {
        match serde_json::to_vec(&err.body()) {
            Ok(body) => {
                let mut headers = HeaderMap::new();
                headers.insert(
                    header::CONTENT_TYPE,
                    HeaderValue::from_static("application/json"),
                );
                Self {
                    status: err.status(),
                    headers,
                    body: Bytes::from(body),
                }
            }
            Err(_) => Self::empty(err.status()),
        }
    }

    /// Body decoded as JSON, if it is JSON.
    pub fn json_body(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }
}

impl IntoResponse for HandlerResponse {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Request handler for the analysis endpoint, holding the injected provider.
pub struct SoundFactsHandler {
    provider: Arc<dyn TextProvider>,
    settings: AnalysisSettings,
    cors: CorsPolicy,
    malformed_output_status: StatusCode,
}

impl SoundFactsHandler {
    pub fn new(provider: Arc<dyn TextProvider>, settings: AnalysisSettings, cors: CorsPolicy) -> Self {
        Self {
            provider,
            settings,
            cors,
            malformed_output_status: StatusCode::OK,
        }
    }

    /// Status used when the model's answer is not usable JSON (default 200).
    pub fn with_malformed_output_status(mut self, status: StatusCode) -> Self {
        self.malformed_output_status = status;
        self
    }

    pub fn cors(&self) -> &CorsPolicy {
        &self.cors
    }

    pub async fn handle(&self, method: &Method, headers: &HeaderMap, body: &[u8]) -> HandlerResponse {
        if method == Method::OPTIONS {
            metrics::record_analysis_outcome("preflight");
            let mut response = HandlerResponse::empty(StatusCode::OK);
            self.cors.apply_preflight(&mut response.headers);
            return response;
        }

        let mut response = if method == Method::POST {
            self.handle_post(headers, body).await
        } else {
            metrics::record_analysis_outcome("method_not_allowed");
            tracing::debug!(%method, "Rejected non-POST request");
            let mut response =
                HandlerResponse::from_app_error(&AppError::MethodNotAllowed("POST only".to_string()));
            response
                .headers
                .insert(header::ALLOW, HeaderValue::from_static(ALLOWED_METHODS));
            response
        };

        self.cors.apply_origin(&mut response.headers);
        response
    }

    /// Response for a request whose body could not be read. Preflight and
    /// the method gate never look at the body, so they answer as usual.
    pub async fn handle_rejected(
        &self,
        method: &Method,
        headers: &HeaderMap,
        status: StatusCode,
        message: String,
    ) -> HandlerResponse {
        if method != Method::POST {
            return self.handle(method, headers, &[]).await;
        }

        metrics::record_analysis_outcome("invalid_body");
        tracing::warn!(%status, %message, "Request body rejected");
        let mut response = HandlerResponse::from_app_error(&AppError::Rejected { status, message });
        self.cors.apply_origin(&mut response.headers);
        response
    }

    async fn handle_post(&self, headers: &HeaderMap, body: &[u8]) -> HandlerResponse {
        let outcome = match parse_request(headers, body) {
            Ok(request) => analyze(self.provider.as_ref(), &self.settings, &request).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(result) => {
                metrics::record_analysis_outcome("success");
                HandlerResponse::json(StatusCode::OK, &result)
            }
            Err(e) => {
                metrics::record_analysis_outcome(e.outcome());
                self.error_response(e)
            }
        }
    }

    fn error_response(&self, error: AnalysisError) -> HandlerResponse {
        match error {
            AnalysisError::MalformedOutput { raw, parse_error } => {
                tracing::warn!(parse_error = %parse_error, "Model returned invalid JSON");
                HandlerResponse::json(
                    self.malformed_output_status,
                    &json!({
                        "error": true,
                        "message": "Model returned invalid JSON",
                        "raw": raw,
                        "parseError": parse_error,
                    }),
                )
            }
            AnalysisError::InvalidStructure => {
                tracing::warn!("Model response lacks song/artist");
                HandlerResponse::json(
                    self.malformed_output_status,
                    &json!({
                        "error": true,
                        "message": "Invalid response structure from AI model",
                    }),
                )
            }
            AnalysisError::MissingFields(e) => {
                HandlerResponse::from_app_error(&AppError::BadRequest(anyhow::Error::new(e)))
            }
            e @ (AnalysisError::InvalidBody(_) | AnalysisError::Provider(_)) => {
                tracing::error!(error = %e, "Sound Facts backend error");
                HandlerResponse::from_app_error(&AppError::Backend {
                    message: BACKEND_ERROR_MESSAGE.to_string(),
                    source: anyhow::Error::new(e),
                })
            }
        }
    }
}

/// Read `song`/`artist` from a JSON or form-encoded body.
///
/// An empty body counts as `{}`; a non-empty body that does not parse is a
/// body error rather than a validation error.
fn parse_request(headers: &HeaderMap, body: &[u8]) -> Result<AnalysisRequest, AnalysisError> {
    let payload = if is_form_encoded(headers) {
        let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(body)
            .map_err(|e| AnalysisError::InvalidBody(e.to_string()))?;
        AnalysisPayload::from_form_pairs(&pairs)
    } else if body.iter().all(u8::is_ascii_whitespace) {
        AnalysisPayload::default()
    } else {
        let value: Value =
            serde_json::from_slice(body).map_err(|e| AnalysisError::InvalidBody(e.to_string()))?;
        AnalysisPayload::from_json(&value)
    };

    tracing::info!(song = ?payload.song, artist = ?payload.artist, "Received request");

    Ok(AnalysisRequest::try_from(payload)?)
}

fn is_form_encoded(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| {
            v.trim()
                .to_ascii_lowercase()
                .starts_with("application/x-www-form-urlencoded")
        })
        .unwrap_or(false)
}

/// `ANY /api/soundfacts`
pub async fn soundfacts(
    State(state): State<AppState>,
    method: Method,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> HandlerResponse {
    match body {
        Ok(body) => state.soundfacts.handle(&method, &headers, &body).await,
        Err(rejection) => {
            state
                .soundfacts
                .handle_rejected(&method, &headers, rejection.status(), rejection.body_text())
                .await
        }
    }
}

/// Adds the allow-origin header to responses produced outside the handler,
/// such as a caught panic.
pub async fn cors_origin_middleware(
    State(cors): State<CorsPolicy>,
    req: Request,
    next: Next,
) -> Response {
    let mut response = next.run(req).await;
    if !response
        .headers()
        .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN)
    {
        cors.apply_origin(response.headers_mut());
    }
    response
}
