//! transy-cache: persistent response cache for LLM-backed translation.
//! Content-addressed keys over normalized request text, a SQLite store with
//! per-entry TTL and hit/miss accounting, and a background reclamation task
//! owned by each open store.

pub mod cache;
pub mod config;
pub mod error;
pub mod metrics;
pub mod telemetry;
pub mod translate;

pub use cache::{
    derive_key, normalize_text, CacheEntry, CacheKey, CacheStats, ReclaimReport, Store, Usage,
    DEFAULT_TTL,
};
pub use config::{CacheConfig, StoreConfig};
pub use error::{OpenError, StorageError, TranslateError, WriteError};
pub use metrics::{ReclaimCounters, ReclaimObserver, ReclaimSnapshot};
pub use translate::{CachedTranslator, TranslateRequest, TranslateResult, Translation, Translator};
