//! Mock provider implementation for tests and offline runs.

use super::{GenerationParams, Prompt, ProviderError, ProviderResponse, TextProvider};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Canned analysis served by [`MockTextProvider::sample`].
pub const SAMPLE_ANALYSIS: &str = r#"{
  "song": "Bohemian Rhapsody",
  "artist": "Queen",
  "year": "1975",
  "genre": "Progressive rock",
  "runtime": "5:55",
  "summary": "A six-minute suite moving from ballad to opera to hard rock. It broke every rule of the radio single and became one of the best-selling records of its decade.",
  "core_categories": {
    "emotional_honesty": { "score": 9, "comment": "A confession wrapped in theatre." },
    "storytelling": { "score": 9, "comment": "Ambiguous but gripping narrative." },
    "melodic_complexity": { "score": 10, "comment": "Shifts key and style repeatedly without losing the thread." },
    "vocal_performance": { "score": 10, "comment": "Mercury at full range, plus stacked choral overdubs." },
    "production_quality": { "score": 10, "comment": "Landmark multitrack layering for 1975." },
    "cultural_imprint": { "score": 10, "comment": "Revived again and again, from Wayne's World onward." },
    "replay_value": { "score": 9, "comment": "Rewards every listen." },
    "overall_impact": { "score": 10, "comment": "A genre of its own." }
  },
  "expansion_categories": [
    { "category": "Innovation", "score": 10, "comment": "Opera inside a rock single." }
  ],
  "final_score": 10
}"#;

#[derive(Debug, Clone)]
enum Script {
    Text(String),
    Fail(String),
    Disabled,
}

/// Mock text provider that replays a fixed answer (or failure) and records
/// how it was called.
pub struct MockTextProvider {
    script: Script,
    calls: AtomicUsize,
    last_prompt: Mutex<Option<Prompt>>,
}

impl MockTextProvider {
    fn scripted(script: Script) -> Self {
        Self {
            script,
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    /// Always answer with `text`.
    pub fn with_text(text: impl Into<String>) -> Self {
        Self::scripted(Script::Text(text.into()))
    }

    /// Always fail as if the network call had broken with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self::scripted(Script::Fail(message.into()))
    }

    /// Refuse every call and report unhealthy.
    pub fn disabled() -> Self {
        Self::scripted(Script::Disabled)
    }

    /// Answer with [`SAMPLE_ANALYSIS`].
    pub fn sample() -> Self {
        Self::with_text(SAMPLE_ANALYSIS)
    }

    /// Number of `generate` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompt passed to the most recent `generate` call.
    pub fn last_prompt(&self) -> Option<Prompt> {
        self.last_prompt
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl TextProvider for MockTextProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    async fn generate(
        &self,
        prompt: &Prompt,
        _params: &GenerationParams,
    ) -> Result<ProviderResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_prompt.lock() {
            *last = Some(prompt.clone());
        }

        match &self.script {
            Script::Text(text) => Ok(ProviderResponse {
                text: text.clone(),
                input_tokens: ((prompt.system.len() + prompt.user.len()) / 4) as u32,
                output_tokens: (text.len() / 4) as u32,
            }),
            Script::Fail(message) => Err(ProviderError::NetworkError(message.clone())),
            Script::Disabled => Err(ProviderError::NotConfigured(
                "Mock text provider not enabled".to_string(),
            )),
        }
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        match self.script {
            Script::Disabled => Err(ProviderError::NotConfigured(
                "Mock text provider not enabled".to_string(),
            )),
            _ => Ok(()),
        }
    }
}
