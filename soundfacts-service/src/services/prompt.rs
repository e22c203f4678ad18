//! Prompt template for the Sound Facts analysis.

use crate::models::AnalysisRequest;
use crate::services::providers::Prompt;

/// Fixed instruction describing the exact JSON shape the model must return.
pub const SOUND_FACTS_PROMPT: &str = r#"You are a professional music analyst. Analyze the given song and return ONLY a valid JSON object with this exact structure:

{
  "song": "song title",
  "artist": "artist name",
  "year": "release year (e.g., 1975)",
  "genre": "genre(s)",
  "runtime": "duration (e.g., 5:55)",
  "summary": "2-3 sentence professional summary of the song",
  "core_categories": {
    "emotional_honesty": { "score": 1-10, "comment": "brief explanation" },
    "storytelling": { "score": 1-10, "comment": "brief explanation" },
    "melodic_complexity": { "score": 1-10, "comment": "brief explanation" },
    "vocal_performance": { "score": 1-10, "comment": "brief explanation" },
    "production_quality": { "score": 1-10, "comment": "brief explanation" },
    "cultural_imprint": { "score": 1-10, "comment": "brief explanation" },
    "replay_value": { "score": 1-10, "comment": "brief explanation" },
    "overall_impact": { "score": 1-10, "comment": "brief explanation" }
  },
  "expansion_categories": [
    { "category": "category name", "score": 1-10, "comment": "explanation" }
  ],
  "final_score": 1-10
}

Ensure all scores are integers between 1 and 10. Make comments concise but meaningful."#;

/// Build the two-part prompt for one request.
pub fn build_prompt(request: &AnalysisRequest) -> Prompt {
    Prompt {
        system: SOUND_FACTS_PROMPT.to_string(),
        user: format!(
            "Analyze this song and return ONLY valid JSON with no markdown formatting.\nSong: {}\nArtist: {}",
            request.song, request.artist
        ),
    }
}
