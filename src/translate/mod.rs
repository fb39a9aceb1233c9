//! Cache-first translation path.
//! Derive key → look up → on miss call the backend → write back best-effort.
//! Cache problems only cost latency: a missing store, a failed lookup or a
//! failed write never turns into a translation error.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache::{derive_key, CacheEntry, CacheKey, Store, Usage};
use crate::config::CacheConfig;
use crate::error::TranslateError;

/// Translation request from the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslateRequest {
    pub text: String,
    pub source_lang: String,
    pub target_lang: String,
}

/// Raw output of a backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    pub text: String,
    pub usage: Usage,
}

/// Result handed back to the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranslateResult {
    pub text: String,
    pub usage: Usage,
    pub cache_hit: bool,
    pub elapsed_ms: u64,
}

/// LLM backend adapter (OpenAI, Gemini, Claude, ...).
pub trait Translator: Send + Sync {
    /// Provider identifier, part of the cache key.
    fn provider(&self) -> &str;
    /// Model identifier, part of the cache key.
    fn model(&self) -> &str;
    fn translate(&self, request: &TranslateRequest) -> Result<Translation, TranslateError>;
}

/// Open the cache described by `config`, or log and disable caching.
pub fn open_or_disable(config: &CacheConfig) -> Option<Arc<Store>> {
    match Store::open_with(&config.dir, config.store_config()) {
        Ok(store) => Some(Arc::new(store)),
        Err(e) => {
            warn!(dir = %config.dir.display(), error = %e, "cache unavailable, continuing without it");
            None
        }
    }
}

/// Wraps a [`Translator`] with the response cache.
pub struct CachedTranslator<T> {
    translator: T,
    cache: Option<Arc<Store>>,
    ttl: Duration,
}

impl<T: Translator> CachedTranslator<T> {
    /// `cache: None` runs every request against the backend.
    pub fn new(translator: T, cache: Option<Arc<Store>>) -> Self {
        if cache.is_none() {
            info!(provider = translator.provider(), "translation cache disabled");
        }
        Self {
            translator,
            cache,
            ttl: Duration::ZERO,
        }
    }

    /// TTL for written entries. Zero (the default) uses the store's retention.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn translator(&self) -> &T {
        &self.translator
    }

    pub fn cache(&self) -> Option<&Arc<Store>> {
        self.cache.as_ref()
    }

    pub fn cache_key(&self, request: &TranslateRequest) -> CacheKey {
        derive_key(
            self.translator.provider(),
            self.translator.model(),
            &request.source_lang,
            &request.target_lang,
            &request.text,
        )
    }

    pub fn translate(&self, request: &TranslateRequest) -> Result<TranslateResult, TranslateError> {
        let start = Instant::now();
        let key = self.cache.as_ref().map(|_| self.cache_key(request));

        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            if let Some(entry) = cache.get(key) {
                debug!(key = key.short(), "translation served from cache");
                return Ok(TranslateResult {
                    text: entry.text,
                    usage: entry.usage,
                    cache_hit: true,
                    elapsed_ms: start.elapsed().as_millis() as u64,
                });
            }
        }

        let translation = self.translator.translate(request)?;

        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            let entry = CacheEntry::new(translation.text.clone(), translation.usage);
            if let Err(e) = cache.set(key, &entry, self.ttl) {
                warn!(key = key.short(), error = %e, "cache write failed");
            }
        }

        Ok(TranslateResult {
            text: translation.text,
            usage: translation.usage,
            cache_hit: false,
            elapsed_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheStats;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct EchoTranslator {
        calls: AtomicU32,
        fail: bool,
    }

    impl EchoTranslator {
        fn new(fail: bool) -> Self {
            Self {
                calls: AtomicU32::new(0),
                fail,
            }
        }
    }

    impl Translator for EchoTranslator {
        fn provider(&self) -> &str {
            "echo"
        }

        fn model(&self) -> &str {
            "echo-1"
        }

        fn translate(&self, request: &TranslateRequest) -> Result<Translation, TranslateError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(TranslateError::Api("upstream 500".into()));
            }
            Ok(Translation {
                text: format!("[{}] {}", request.target_lang, request.text),
                usage: Usage {
                    prompt_tokens: 7,
                    completion_tokens: 3,
                    total_tokens: 10,
                },
            })
        }
    }

    fn request(text: &str) -> TranslateRequest {
        TranslateRequest {
            text: text.into(),
            source_lang: "en".into(),
            target_lang: "zh".into(),
        }
    }

    fn temp_store() -> (tempfile::TempDir, Arc<Store>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path()).unwrap());
        (dir, store)
    }

    #[test]
    fn second_request_is_served_from_cache() {
        let (_dir, store) = temp_store();
        let cached = CachedTranslator::new(EchoTranslator::new(false), Some(Arc::clone(&store)));

        let first = cached.translate(&request("Hello  world")).unwrap();
        assert!(!first.cache_hit);

        // Whitespace-equivalent input hits the same key.
        let second = cached.translate(&request(" Hello world\n")).unwrap();
        assert!(second.cache_hit);
        assert_eq!(second.text, first.text);
        assert_eq!(second.usage, first.usage);

        assert_eq!(cached.translator().calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.stats(), CacheStats { hits: 1, misses: 1 });
    }

    #[test]
    fn backend_errors_are_not_cached() {
        let (_dir, store) = temp_store();
        let cached = CachedTranslator::new(EchoTranslator::new(true), Some(Arc::clone(&store)));

        assert!(matches!(
            cached.translate(&request("Hello")),
            Err(TranslateError::Api(_))
        ));
        assert!(cached.translate(&request("Hello")).is_err());
        assert_eq!(cached.translator().calls.load(Ordering::SeqCst), 2);
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn disabled_cache_still_translates() {
        let cached = CachedTranslator::new(EchoTranslator::new(false), None);
        let result = cached.translate(&request("Hello")).unwrap();
        assert_eq!(result.text, "[zh] Hello");
        assert!(!result.cache_hit);
        assert!(cached.cache().is_none());
    }

    #[test]
    fn closed_cache_degrades_to_backend() {
        let (_dir, store) = temp_store();
        let cached = CachedTranslator::new(EchoTranslator::new(false), Some(Arc::clone(&store)));
        cached.translate(&request("Hello")).unwrap();
        store.close().unwrap();

        let result = cached.translate(&request("Hello")).unwrap();
        assert!(!result.cache_hit);
        assert_eq!(result.text, "[zh] Hello");
        assert_eq!(cached.translator().calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn open_or_disable_returns_none_for_unusable_dir() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let config = CacheConfig {
            dir: blocker.join("cache"),
            ..CacheConfig::default()
        };
        assert!(open_or_disable(&config).is_none());
    }

    #[test]
    fn custom_ttl_is_applied() {
        let (_dir, store) = temp_store();
        let cached = CachedTranslator::new(EchoTranslator::new(false), Some(Arc::clone(&store)))
            .with_ttl(Duration::from_secs(30));
        cached.translate(&request("Hello")).unwrap();

        let left = store.remaining_ttl(&cached.cache_key(&request("Hello"))).unwrap();
        assert!(left <= Duration::from_secs(30));
    }
}
