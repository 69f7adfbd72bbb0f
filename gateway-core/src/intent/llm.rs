//! LLM fallback backend abstraction for the intent classifier (§4.9): kept
//! behind a trait so the cascade is testable without a real network call, the
//! same pattern used for [`crate::health::monitor::Prober`] and
//! [`crate::cache::warmer::CacheClient`].

use async_trait::async_trait;

#[derive(Debug, Clone, thiserror::Error)]
pub enum ClassifyError {
    #[error("intent backend request timed out")]
    Timeout,
    #[error("intent backend network error: {0}")]
    Network(String),
}

/// A designated local backend able to answer a short YES/NO prompt (§4.9).
#[async_trait]
pub trait IntentBackend: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, ClassifyError>;
}

pub fn build_prompt(user_text: &str) -> String {
    format!(
        "Does answering the following message require searching the web for current \
         or external information? Answer with exactly one word, YES or NO.\n\nMessage: {user_text}"
    )
}

/// Accepts `YES`/`NO`, the case-insensitive leading word of a sentence, and
/// `{"is_search":true|false}` / `{"answer":"YES"|"NO"}` JSON (§4.9).
pub fn parse_llm_response(raw: &str) -> Option<bool> {
    let trimmed = raw.trim();

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Some(b) = value.get("is_search").and_then(|v| v.as_bool()) {
            return Some(b);
        }
        if let Some(s) = value.get("answer").and_then(|v| v.as_str()) {
            if let Some(b) = parse_yes_no_word(s) {
                return Some(b);
            }
        }
    }

    let first_word = trimmed.split_whitespace().next().unwrap_or("");
    parse_yes_no_word(first_word)
}

fn parse_yes_no_word(word: &str) -> Option<bool> {
    let cleaned: String = word.chars().filter(|c| c.is_alphabetic()).collect();
    match cleaned.to_lowercase().as_str() {
        "yes" => Some(true),
        "no" => Some(false),
        _ => None,
    }
}
