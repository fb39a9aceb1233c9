//! Persistent translation response cache.
//! `key` derives content-addressed keys, `store` owns the SQLite database and
//! hit/miss accounting, `reclaim` runs the background compaction task.

pub mod key;
pub mod reclaim;
pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use key::{derive_key, normalize_text, CacheKey};
pub use reclaim::ReclaimReport;
pub use store::{Store, DEFAULT_TTL};

/// Token usage reported by the LLM for one translation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// One cached LLM response. Written whole, never partially updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub text: String,
    pub usage: Usage,
    pub created_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Entry stamped with the current time.
    pub fn new(text: impl Into<String>, usage: Usage) -> Self {
        Self {
            text: text.into(),
            usage,
            created_at: Utc::now(),
        }
    }
}

/// Snapshot of the hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    /// Hit rate as a percentage; 0 when nothing has been looked up yet.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_rate_of_empty_stats_is_zero() {
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }

    #[test]
    fn hit_rate_percentage() {
        let stats = CacheStats { hits: 3, misses: 1 };
        assert_eq!(stats.hit_rate(), 75.0);
        let stats = CacheStats { hits: 0, misses: 4 };
        assert_eq!(stats.hit_rate(), 0.0);
    }

    #[test]
    fn entry_json_shape() {
        let entry = CacheEntry::new(
            "你好",
            Usage {
                prompt_tokens: 10,
                completion_tokens: 5,
                total_tokens: 15,
            },
        );
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value["text"], "你好");
        assert_eq!(value["usage"]["prompt_tokens"], 10);
        assert_eq!(value["usage"]["completion_tokens"], 5);
        assert_eq!(value["usage"]["total_tokens"], 15);
        assert!(value["created_at"].is_string());
    }
}
