//! Transport-agnostic analysis core.
//!
//! One provider call per request, then fence stripping and JSON parsing of
//! whatever came back. HTTP framing lives in `handlers::soundfacts`.

use crate::models::{AnalysisRequest, AnalysisResult, MissingFieldsError};
use crate::services::extract::extract_json;
use crate::services::metrics;
use crate::services::prompt::build_prompt;
use crate::services::providers::{GenerationParams, ProviderError, TextProvider};
use serde_json::Value;
use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error(transparent)]
    MissingFields(#[from] MissingFieldsError),

    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    #[error("Model returned invalid JSON: {parse_error}")]
    MalformedOutput { raw: String, parse_error: String },

    #[error("Invalid response structure from AI model")]
    InvalidStructure,

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl AnalysisError {
    /// Label used for the `soundfacts_requests_total` outcome.
    pub fn outcome(&self) -> &'static str {
        match self {
            AnalysisError::MissingFields(_) => "missing_fields",
            AnalysisError::InvalidBody(_) => "invalid_body",
            AnalysisError::MalformedOutput { .. } => "malformed_output",
            AnalysisError::InvalidStructure => "invalid_structure",
            AnalysisError::Provider(_) => "provider_error",
        }
    }
}

/// Per-deployment knobs for [`analyze`].
#[derive(Debug, Clone, Default)]
pub struct AnalysisSettings {
    pub params: GenerationParams,
    /// Reject model output lacking non-empty `song` and `artist`.
    pub validate_structure: bool,
}

/// Ask the provider for an analysis of `request` and parse the answer.
pub async fn analyze(
    provider: &dyn TextProvider,
    settings: &AnalysisSettings,
    request: &AnalysisRequest,
) -> Result<AnalysisResult, AnalysisError> {
    tracing::info!(song = %request.song, artist = %request.artist, "Analyzing song");

    let prompt = build_prompt(request);
    let started = Instant::now();
    let outcome = provider.generate(&prompt, &settings.params).await;
    metrics::record_provider_latency(
        provider.name(),
        provider.model(),
        started.elapsed().as_secs_f64(),
    );

    let response = outcome.map_err(|e| {
        metrics::record_provider_error(provider.name(), e.kind());
        tracing::error!(provider = provider.name(), error = %e, "Provider call failed");
        e
    })?;

    metrics::record_tokens(
        provider.model(),
        response.input_tokens,
        response.output_tokens,
    );
    tracing::debug!(text = %response.text, "Model response");

    parse_model_output(&response.text, settings.validate_structure)
}

/// Strip any fence from `text`, parse it, and optionally check identity fields.
///
/// On a parse failure the untouched `text` is kept in the error.
pub fn parse_model_output(
    text: &str,
    validate_structure: bool,
) -> Result<AnalysisResult, AnalysisError> {
    let candidate = extract_json(text);
    let value: Value =
        serde_json::from_str(candidate).map_err(|e| AnalysisError::MalformedOutput {
            raw: text.to_string(),
            parse_error: e.to_string(),
        })?;

    let result = AnalysisResult::new(value);

    if validate_structure && !result.has_identity() {
        return Err(AnalysisError::InvalidStructure);
    }

    let flagged = result.out_of_range_scores();
    if !flagged.is_empty() {
        tracing::warn!(scores = ?flagged, "Model returned scores outside 1-10");
    }
    let missing = result.missing_core_categories();
    if !missing.is_empty() {
        tracing::debug!(categories = ?missing, "Model omitted core categories");
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::providers::mock::MockTextProvider;
    use serde_json::json;

    fn request() -> AnalysisRequest {
        AnalysisRequest {
            song: "Bohemian Rhapsody".to_string(),
            artist: "Queen".to_string(),
        }
    }

    #[test]
    fn fenced_output_parses() {
        let result = parse_model_output("```json\n{\"song\":\"X\"}\n```", false).unwrap();
        assert_eq!(result.into_value(), json!({"song": "X"}));
    }

    #[test]
    fn prose_output_is_malformed_and_keeps_raw_text() {
        let err = parse_model_output("Sorry, I cannot comply", false).unwrap_err();
        match err {
            AnalysisError::MalformedOutput { raw, parse_error } => {
                assert_eq!(raw, "Sorry, I cannot comply");
                assert!(!parse_error.is_empty());
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn raw_text_is_kept_verbatim_including_fence() {
        let text = "  ```json\n{not json}\n```  ";
        match parse_model_output(text, false).unwrap_err() {
            AnalysisError::MalformedOutput { raw, .. } => assert_eq!(raw, text),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn structure_check_is_opt_in() {
        assert!(parse_model_output(r#"{"song":"X"}"#, false).is_ok());
        assert!(matches!(
            parse_model_output(r#"{"song":"X"}"#, true),
            Err(AnalysisError::InvalidStructure)
        ));
        assert!(parse_model_output(r#"{"song":"X","artist":"Y"}"#, true).is_ok());
    }

    #[tokio::test]
    async fn analyze_calls_provider_once() {
        let provider = MockTextProvider::with_text(r#"{"song":"Bohemian Rhapsody","artist":"Queen"}"#);
        let result = analyze(&provider, &AnalysisSettings::default(), &request())
            .await
            .unwrap();

        assert_eq!(provider.calls(), 1);
        assert_eq!(result.as_value()["artist"], "Queen");
        let prompt = provider.last_prompt().unwrap();
        assert!(prompt.user.contains("Song: Bohemian Rhapsody"));
    }

    #[tokio::test]
    async fn provider_failure_propagates() {
        let provider = MockTextProvider::failing("connection refused");
        let err = analyze(&provider, &AnalysisSettings::default(), &request())
            .await
            .unwrap_err();

        assert_eq!(err.outcome(), "provider_error");
        assert!(err.to_string().contains("connection refused"));
    }
}
