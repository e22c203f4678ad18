//! JSON extraction from model output.
//!
//! Models asked for "only JSON" still like to wrap it in a markdown code
//! fence. This strips the fence so the remainder can be parsed.

use once_cell::sync::Lazy;
use regex_lite::Regex;

/// First fenced block, optionally tagged `json` in any case.
static FENCED_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```(?i:json)?\s*(.*?)\s*```").expect("fence pattern is a valid regex")
});

/// Return the candidate JSON text inside `text`.
///
/// 1. First fenced block's content, trimmed.
/// 2. An opening fence with no closing one (truncated output): everything
///    after the opening fence and its optional tag.
/// 3. Otherwise the whole text, trimmed.
///
/// The result is not validated; callers parse it.
pub fn extract_json(text: &str) -> &str {
    if let Some(inner) = FENCED_BLOCK
        .captures(text)
        .and_then(|caps| caps.get(1))
    {
        return inner.as_str();
    }

    let trimmed = text.trim();
    strip_open_fence(trimmed).unwrap_or(trimmed)
}

fn strip_open_fence(text: &str) -> Option<&str> {
    let rest = text.strip_prefix("```")?;
    let rest = match rest.get(..4) {
        Some(tag) if tag.eq_ignore_ascii_case("json") => &rest[4..],
        _ => rest,
    };
    Some(rest.trim())
}
