//! Intent classifier (§4.9): a three-stage cascade — cache, regex fast path,
//! LLM fallback — deciding whether a turn warrants exposing a web-search
//! tool. A pure advisor: it never blocks the router (§4.9: "runs concurrently
//! with dispatch") and a failure anywhere in the cascade degrades to a
//! regex-only verdict rather than propagating an error.

mod backend;
mod cache;
mod llm;
mod regex;

pub use backend::ReqwestIntentBackend;
pub use cache::IntentCache;
pub use llm::{build_prompt, parse_llm_response, ClassifyError, IntentBackend};
pub use regex::{fast_path, normalize};

use std::sync::Arc;
use std::time::Duration;

/// Tuning knobs for the cascade (§4.9 defaults: 100-entry/300s cache, 1s LLM timeout).
#[derive(Clone, Copy, Debug)]
pub struct IntentConfig {
    pub cache_capacity: usize,
    pub cache_ttl: Duration,
    pub llm_timeout: Duration,
    /// When the LLM stage times out or errors and the regex stage was
    /// inconclusive, fall back to this value instead of `false` (§4.9: "a
    /// timeout or network error yields a regex-based fallback or `false` if
    /// fallback is disabled").
    pub fallback_enabled: bool,
}

impl Default for IntentConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 100,
            cache_ttl: Duration::from_secs(300),
            llm_timeout: Duration::from_secs(1),
            fallback_enabled: true,
        }
    }
}

/// Three-stage cascade (§4.9): cache -> regex -> LLM. `backend` is optional so
/// a gateway running with no designated classifier model still gets the
/// cache+regex stages.
pub struct IntentClassifier {
    cache: IntentCache,
    backend: Option<Arc<dyn IntentBackend>>,
    cfg: IntentConfig,
}

impl IntentClassifier {
    pub fn new(backend: Option<Arc<dyn IntentBackend>>, cfg: IntentConfig) -> Self {
        Self {
            cache: IntentCache::with_capacity_and_ttl(cfg.cache_capacity, cfg.cache_ttl),
            backend,
            cfg,
        }
    }

    /// Classifies `user_text`, running the cascade stage by stage and caching
    /// the first deterministic answer it finds (cache hit, regex hit, or LLM
    /// answer). Never returns an error: every failure path degrades to a
    /// best-effort boolean per §4.9.
    pub async fn classify(&self, user_text: &str) -> bool {
        let key = normalize(user_text);

        if let Some(cached) = self.cache.get(&key) {
            return cached;
        }

        if let Some(decided) = fast_path(&key) {
            self.cache.set(key, decided);
            return decided;
        }

        let Some(backend) = &self.backend else {
            return false;
        };

        let prompt = build_prompt(user_text);
        let outcome = tokio::time::timeout(self.cfg.llm_timeout, backend.complete(&prompt)).await;
        // Regex was already inconclusive on this text (we only reach the LLM stage
        // when `fast_path` returned `None`), so both the "regex fallback" and the
        // "fallback disabled" paths in §4.9 resolve to the same `false` here.
        let decided = match outcome {
            Ok(Ok(raw)) => parse_llm_response(&raw).unwrap_or(false),
            _ => false,
        };
        self.cache.set(key, decided);
        decided
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedBackend {
        calls: AtomicUsize,
        response: Result<String, ClassifyError>,
    }

    #[async_trait]
    impl IntentBackend for ScriptedBackend {
        async fn complete(&self, _prompt: &str) -> Result<String, ClassifyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.response.clone()
        }
    }

    /// **Scenario**: obvious search phrasing is decided by the regex stage
    /// without ever calling the LLM backend.
    #[tokio::test]
    async fn regex_hit_short_circuits_the_llm() {
        let backend = Arc::new(ScriptedBackend {
            calls: AtomicUsize::new(0),
            response: Ok("NO".into()),
        });
        let classifier = IntentClassifier::new(Some(backend.clone()), IntentConfig::default());
        assert!(classifier.classify("what is the latest Rust release?").await);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    /// **Scenario**: ambiguous text falls through to the LLM stage, whose
    /// answer is then cached so a repeat call skips the backend entirely.
    #[tokio::test]
    async fn ambiguous_text_falls_through_to_llm_and_caches_the_answer() {
        let backend = Arc::new(ScriptedBackend {
            calls: AtomicUsize::new(0),
            response: Ok("YES".into()),
        });
        let classifier = IntentClassifier::new(Some(backend.clone()), IntentConfig::default());
        assert!(classifier.classify("tell me about quarks").await);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert!(classifier.classify("tell me about quarks").await);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    /// **Scenario**: an LLM network error on ambiguous text degrades to
    /// `false` rather than propagating an error to the caller.
    #[tokio::test]
    async fn llm_error_degrades_to_false() {
        let backend = Arc::new(ScriptedBackend {
            calls: AtomicUsize::new(0),
            response: Err(ClassifyError::Network("refused".into())),
        });
        let classifier = IntentClassifier::new(Some(backend), IntentConfig::default());
        assert!(!classifier.classify("purple elephant hats").await);
    }

    /// **Scenario**: with no backend configured, ambiguous text degrades to
    /// `false` (cache+regex only gateway).
    #[tokio::test]
    async fn no_backend_configured_degrades_to_false() {
        let classifier = IntentClassifier::new(None, IntentConfig::default());
        assert!(!classifier.classify("purple elephant hats").await);
    }
}
