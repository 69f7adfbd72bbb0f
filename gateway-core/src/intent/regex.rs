//! Regex fast path for the intent cascade (§4.9 stage 2): obvious search and
//! obvious non-search phrasing short-circuit the LLM fallback.

use once_cell::sync::Lazy;
use regex::RegexSet;

const SEARCH_PATTERNS: &[&str] = &[
    r"\bwhat is\b",
    r"\bwhat are\b",
    r"\bwho is\b",
    r"\bsearch\b",
    r"\blook up\b",
    r"\blatest\b",
    r"\bcurrent\b",
    r"\btoday'?s\b",
    r"\bnews\b",
    r"\bprice of\b",
];

const NON_SEARCH_PATTERNS: &[&str] = &[
    r"\bwrite\b",
    r"\bfix\b",
    r"\brefactor\b",
    r"\bimplement\b",
    r"\bdebug\b",
    r"\brename\b",
    r"\bexplain this code\b",
];

static SEARCH_SET: Lazy<RegexSet> = Lazy::new(|| RegexSet::new(SEARCH_PATTERNS).expect("static regex set"));
static NON_SEARCH_SET: Lazy<RegexSet> =
    Lazy::new(|| RegexSet::new(NON_SEARCH_PATTERNS).expect("static regex set"));

/// Normalizes text the way the cache keys it (§4.9 stage 1): lowercased,
/// whitespace collapsed, punctuation stripped.
pub fn normalize(text: &str) -> String {
    let lowered = text.to_lowercase();
    let stripped: String = lowered
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// A deterministic match produces a high-confidence answer (§4.9 stage 2);
/// `None` means the regex fast path is inconclusive and the cascade should
/// fall through to the LLM.
pub fn fast_path(normalized_text: &str) -> Option<bool> {
    let search_hit = SEARCH_SET.is_match(normalized_text);
    let non_search_hit = NON_SEARCH_SET.is_match(normalized_text);
    match (search_hit, non_search_hit) {
        (true, false) => Some(true),
        (false, true) => Some(false),
        _ => None,
    }
}
