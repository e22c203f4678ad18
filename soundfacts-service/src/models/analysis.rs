use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use validator::Validate;

/// Category keys the prompt asks the model to score.
pub const CORE_CATEGORIES: [&str; 8] = [
    "emotional_honesty",
    "storytelling",
    "melodic_complexity",
    "vocal_performance",
    "production_quality",
    "cultural_imprint",
    "replay_value",
    "overall_impact",
];

/// Valid range for every score in an analysis.
pub const SCORE_RANGE: std::ops::RangeInclusive<i64> = 1..=10;

/// Inbound body as received, before validation.
#[derive(Debug, Default, Clone, Deserialize, Validate)]
pub struct AnalysisPayload {
    #[validate(required, length(min = 1))]
    pub song: Option<String>,

    #[validate(required, length(min = 1))]
    pub artist: Option<String>,
}

impl AnalysisPayload {
    /// Read `song` and `artist` from an arbitrary JSON body. Anything that is
    /// not an object, or fields that are not strings, count as missing.
    pub fn from_json(value: &Value) -> Self {
        let field = |name: &str| value.get(name).and_then(Value::as_str).map(str::to_owned);
        Self {
            song: field("song"),
            artist: field("artist"),
        }
    }

    /// Read `song` and `artist` from decoded form pairs. A key given more
    /// than once is ambiguous and counts as missing.
    pub fn from_form_pairs(pairs: &[(String, String)]) -> Self {
        let field = |name: &str| {
            let mut values = pairs.iter().filter(|(key, _)| key == name);
            match (values.next(), values.next()) {
                (Some((_, value)), None) => Some(value.clone()),
                _ => None,
            }
        };
        Self {
            song: field("song"),
            artist: field("artist"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Missing required fields: song and artist")]
pub struct MissingFieldsError;

/// A validated request: both fields present and non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub song: String,
    pub artist: String,
}

impl TryFrom<AnalysisPayload> for AnalysisRequest {
    type Error = MissingFieldsError;

    fn try_from(payload: AnalysisPayload) -> Result<Self, Self::Error> {
        payload.validate().map_err(|_| MissingFieldsError)?;

        match (payload.song, payload.artist) {
            (Some(song), Some(artist)) => Ok(Self { song, artist }),
            _ => Err(MissingFieldsError),
        }
    }
}

/// Whatever JSON the model produced. Only well-formedness is guaranteed; the
/// accessors below inspect the expected Sound Facts shape without enforcing it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct AnalysisResult(Value);

impl AnalysisResult {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// True when `song` and `artist` are non-empty strings.
    pub fn has_identity(&self) -> bool {
        let non_empty = |key: &str| {
            self.0
                .get(key)
                .and_then(Value::as_str)
                .is_some_and(|s| !s.is_empty())
        };
        non_empty("song") && non_empty("artist")
    }

    /// Paths of scores that are present but not integers in 1..=10.
    pub fn out_of_range_scores(&self) -> Vec<String> {
        let mut flagged = Vec::new();
        let mut check = |path: String, score: Option<&Value>| {
            if let Some(score) = score {
                let valid = score.as_i64().is_some_and(|s| SCORE_RANGE.contains(&s));
                if !valid {
                    flagged.push(path);
                }
            }
        };

        if let Some(categories) = self.0.get("core_categories").and_then(Value::as_object) {
            for (name, category) in categories {
                check(format!("core_categories.{}", name), category.get("score"));
            }
        }

        if let Some(expansions) = self
            .0
            .get("expansion_categories")
            .and_then(Value::as_array)
        {
            for (idx, category) in expansions.iter().enumerate() {
                check(
                    format!("expansion_categories[{}]", idx),
                    category.get("score"),
                );
            }
        }

        check("final_score".to_string(), self.0.get("final_score"));

        flagged
    }

    /// Core categories the model left out.
    pub fn missing_core_categories(&self) -> Vec<&'static str> {
        let categories = self.0.get("core_categories").and_then(Value::as_object);
        CORE_CATEGORIES
            .iter()
            .copied()
            .filter(|name| categories.map_or(true, |c| !c.contains_key(*name)))
            .collect()
    }
}
