//! OpenAI provider implementation.
//!
//! Speaks both the Chat Completions and the Responses wire formats. Either
//! way a single, non-streaming request is made and the answer text returned.

use super::{GenerationParams, Prompt, ProviderError, ProviderResponse, TextProvider};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, Secret};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// OpenAI API base URL.
pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";

/// Which OpenAI endpoint requests go to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApiStyle {
    /// `POST /chat/completions` with `system` + `user` messages.
    #[default]
    ChatCompletions,
    /// `POST /responses` with `developer` + `user` input items.
    Responses,
}

impl FromStr for ApiStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chat" | "chat_completions" | "chat-completions" => Ok(ApiStyle::ChatCompletions),
            "responses" => Ok(ApiStyle::Responses),
            other => Err(format!(
                "unknown OpenAI API style '{}' (expected 'chat' or 'responses')",
                other
            )),
        }
    }
}

/// OpenAI provider configuration.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: Secret<String>,
    pub base_url: String,
    pub model: String,
    pub api_style: ApiStyle,
    /// Client-side timeout. `None` leaves reqwest's default (no timeout).
    pub timeout: Option<Duration>,
}

/// OpenAI text provider.
pub struct OpenAiProvider {
    config: OpenAiConfig,
    client: Client,
}

impl OpenAiProvider {
    pub fn new(config: OpenAiConfig) -> Result<Self, ProviderError> {
        if config.api_key.expose_secret().trim().is_empty() {
            return Err(ProviderError::NotConfigured(
                "OpenAI API key not configured".to_string(),
            ));
        }

        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(|e| {
            ProviderError::NotConfigured(format!("Failed to create HTTP client: {}", e))
        })?;

        Ok(Self { config, client })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// POST a JSON body and decode the JSON answer, mapping HTTP failures.
    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R, ProviderError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.endpoint(path))
            .bearer_auth(self.config.api_key.expose_secret())
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::NetworkError(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();

            if status == StatusCode::TOO_MANY_REQUESTS {
                return Err(ProviderError::RateLimited);
            }

            return Err(ProviderError::ApiError(format!(
                "OpenAI API error {}: {}",
                status,
                api_error_message(&error_text)
            )));
        }

        response
            .json()
            .await
            .map_err(|e| ProviderError::ApiError(format!("Failed to parse response: {}", e)))
    }

    async fn chat_completion(
        &self,
        prompt: &Prompt,
        params: &GenerationParams,
    ) -> Result<ProviderResponse, ProviderError> {
        let request = ChatCompletionRequest {
            model: &self.config.model,
            messages: vec![
                Message {
                    role: "system",
                    content: &prompt.system,
                },
                Message {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            temperature: params.temperature,
            max_tokens: params.max_tokens,
        };

        let api_response: ChatCompletionResponse =
            self.post_json("chat/completions", &request).await?;

        let message = api_response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| ProviderError::EmptyResponse("no choices returned".to_string()))?;

        // A refusal is still an answer; the caller reports it as invalid JSON.
        let text = message.content.or(message.refusal).ok_or_else(|| {
            ProviderError::EmptyResponse("choice carried no message content".to_string())
        })?;

        let usage = api_response.usage.unwrap_or_default();

        Ok(ProviderResponse {
            text,
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
        })
    }

    async fn responses(
        &self,
        prompt: &Prompt,
        params: &GenerationParams,
    ) -> Result<ProviderResponse, ProviderError> {
        let request = ResponsesRequest {
            model: &self.config.model,
            input: vec![
                Message {
                    role: "developer",
                    content: &prompt.system,
                },
                Message {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            temperature: params.temperature,
            max_output_tokens: params.max_tokens,
        };

        let api_response: ResponsesResponse = self.post_json("responses", &request).await?;
        let usage = api_response.usage.clone().unwrap_or_default();
        let text = api_response.output_text().ok_or_else(|| {
            ProviderError::EmptyResponse("response carried no output_text".to_string())
        })?;

        Ok(ProviderResponse {
            text,
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
        })
    }
}

#[async_trait]
impl TextProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.config.model
    }

    async fn generate(
        &self,
        prompt: &Prompt,
        params: &GenerationParams,
    ) -> Result<ProviderResponse, ProviderError> {
        tracing::debug!(
            model = %self.config.model,
            api_style = ?self.config.api_style,
            prompt_len = prompt.system.len() + prompt.user.len(),
            "Sending request to OpenAI API"
        );

        match self.config.api_style {
            ApiStyle::ChatCompletions => self.chat_completion(prompt, params).await,
            ApiStyle::Responses => self.responses(prompt, params).await,
        }
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        if self.config.api_key.expose_secret().trim().is_empty() {
            return Err(ProviderError::NotConfigured(
                "OpenAI API key not configured".to_string(),
            ));
        }
        Ok(())
    }
}

/// Pull `error.message` out of an OpenAI error body, else return it as-is.
fn api_error_message(body: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| body.to_string())
}

// ============================================================================
// OpenAI API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    input: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ResponsesResponse {
    #[serde(default)]
    output_text: Option<String>,
    #[serde(default)]
    output: Vec<OutputItem>,
    #[serde(default)]
    usage: Option<ResponsesUsage>,
}

impl ResponsesResponse {
    /// Concatenated `output_text` parts of every message item.
    fn output_text(self) -> Option<String> {
        if let Some(text) = self.output_text {
            return Some(text);
        }

        let parts: Vec<String> = self
            .output
            .into_iter()
            .filter(|item| item.kind == "message")
            .flat_map(|item| item.content)
            .filter(|content| content.kind == "output_text")
            .filter_map(|content| content.text)
            .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.concat())
        }
    }
}

#[derive(Debug, Deserialize)]
struct OutputItem {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    content: Vec<OutputContent>,
}

#[derive(Debug, Deserialize)]
struct OutputContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize, Default, Clone)]
struct ResponsesUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_style_parses_aliases() {
        assert_eq!("chat".parse::<ApiStyle>(), Ok(ApiStyle::ChatCompletions));
        assert_eq!(
            "Chat-Completions".parse::<ApiStyle>(),
            Ok(ApiStyle::ChatCompletions)
        );
        assert_eq!("responses".parse::<ApiStyle>(), Ok(ApiStyle::Responses));
        assert!("completions".parse::<ApiStyle>().is_err());
    }

    #[test]
    fn responses_text_joins_output_parts() {
        let response: ResponsesResponse = serde_json::from_value(serde_json::json!({
            "output": [
                {"type": "reasoning", "content": []},
                {"type": "message", "content": [
                    {"type": "output_text", "text": "{\"song\":"},
                    {"type": "output_text", "text": "\"X\"}"}
                ]}
            ]
        }))
        .unwrap();

        assert_eq!(response.output_text().as_deref(), Some("{\"song\":\"X\"}"));
    }

    #[test]
    fn error_message_prefers_structured_body() {
        let body = r#"{"error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}}"#;
        assert_eq!(api_error_message(body), "Incorrect API key provided");
        assert_eq!(api_error_message("upstream down"), "upstream down");
    }

    #[test]
    fn blank_api_key_is_rejected() {
        let result = OpenAiProvider::new(OpenAiConfig {
            api_key: Secret::new("  ".to_string()),
            base_url: OPENAI_API_BASE.to_string(),
            model: "gpt-4o-mini".to_string(),
            api_style: ApiStyle::ChatCompletions,
            timeout: None,
        });

        assert!(matches!(result, Err(ProviderError::NotConfigured(_))));
    }
}
