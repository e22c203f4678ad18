//! LLM provider abstractions and implementations.
//!
//! The relay asks for exactly one text completion per request. The OpenAI
//! provider talks to the real API; the mock provider is scripted and used by
//! tests and local runs.

pub mod mock;
pub mod openai;

use async_trait::async_trait;
use thiserror::Error;

/// Error type for provider operations.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Empty response: {0}")]
    EmptyResponse(String),
}

impl ProviderError {
    /// Stable label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::NotConfigured(_) => "not_configured",
            ProviderError::ApiError(_) => "api_error",
            ProviderError::RateLimited => "rate_limited",
            ProviderError::NetworkError(_) => "network_error",
            ProviderError::EmptyResponse(_) => "empty_response",
        }
    }
}

/// Two-part prompt: a fixed instruction and the per-request question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    /// Instruction carrying the output schema (system / developer role).
    pub system: String,

    /// Request-specific instruction (user role).
    pub user: String,
}

/// Result of a provider call.
#[derive(Debug, Clone)]
pub struct ProviderResponse {
    /// The model's answer, untouched.
    pub text: String,

    /// Input tokens consumed.
    pub input_tokens: u32,

    /// Output tokens generated.
    pub output_tokens: u32,
}

/// Generation parameters for AI requests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationParams {
    /// Temperature (0.0 - 2.0).
    pub temperature: Option<f32>,

    /// Maximum output tokens.
    pub max_tokens: Option<u32>,
}

/// Trait for text generation providers (e.g., OpenAI).
#[async_trait]
pub trait TextProvider: Send + Sync {
    /// Provider name used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Model identifier requests are sent to.
    fn model(&self) -> &str;

    /// Generate a single, complete text response.
    async fn generate(
        &self,
        prompt: &Prompt,
        params: &GenerationParams,
    ) -> Result<ProviderResponse, ProviderError>;

    /// Health check.
    async fn health_check(&self) -> Result<(), ProviderError>;
}
