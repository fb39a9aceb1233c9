//! Cache configuration.
//! `CacheConfig` is the serializable, user-facing form (seconds, paths);
//! `StoreConfig` is what `Store::open_with` consumes.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::metrics::ReclaimObserver;

/// Default retention for entries written with a zero TTL: 7 days.
pub const DEFAULT_TTL_SECS: u64 = 7 * 24 * 3600;
/// Default spacing between reclamation passes: 5 minutes.
pub const DEFAULT_RECLAIM_INTERVAL_SECS: u64 = 300;
/// Default number of pooled SQLite connections.
pub const DEFAULT_POOL_SIZE: u32 = 4;

pub const ENV_CACHE_DIR: &str = "TRANSY_CACHE_DIR";
pub const ENV_CACHE_TTL_SECS: &str = "TRANSY_CACHE_TTL_SECS";
pub const ENV_CACHE_RECLAIM_SECS: &str = "TRANSY_CACHE_RECLAIM_SECS";

/// User-facing cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory holding the cache database.
    pub dir: PathBuf,
    pub default_ttl_secs: u64,
    pub reclaim_interval_secs: u64,
    pub pool_size: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            dir: default_cache_dir(),
            default_ttl_secs: DEFAULT_TTL_SECS,
            reclaim_interval_secs: DEFAULT_RECLAIM_INTERVAL_SECS,
            pool_size: DEFAULT_POOL_SIZE,
        }
    }
}

impl CacheConfig {
    /// Defaults with `TRANSY_CACHE_*` environment overrides applied.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from a variable lookup. Unparseable numbers are ignored.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(dir) = lookup(ENV_CACHE_DIR).filter(|d| !d.trim().is_empty()) {
            self.dir = PathBuf::from(dir);
        }
        if let Some(secs) = parse_secs(&lookup, ENV_CACHE_TTL_SECS) {
            self.default_ttl_secs = secs;
        }
        if let Some(secs) = parse_secs(&lookup, ENV_CACHE_RECLAIM_SECS) {
            self.reclaim_interval_secs = secs;
        }
        self
    }

    /// Runtime store settings derived from this config.
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig {
            default_ttl: Duration::from_secs(self.default_ttl_secs),
            reclaim_interval: Duration::from_secs(self.reclaim_interval_secs),
            pool_size: self.pool_size,
            observer: None,
        }
    }
}

fn parse_secs(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<u64> {
    let raw = lookup(name)?;
    match raw.trim().parse::<u64>() {
        Ok(secs) => Some(secs),
        Err(e) => {
            warn!(var = name, value = %raw, error = %e, "ignoring invalid cache setting");
            None
        }
    }
}

/// `<config dir>/transy/cache`, falling back to the working directory.
pub fn default_cache_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("transy")
        .join("cache")
}

/// Settings consumed by [`Store::open_with`](crate::cache::Store::open_with).
#[derive(Clone)]
pub struct StoreConfig {
    /// TTL applied when `set` is called with a zero duration.
    pub default_ttl: Duration,
    pub reclaim_interval: Duration,
    pub pool_size: u32,
    /// Extra sink notified after every reclamation pass.
    pub observer: Option<Arc<dyn ReclaimObserver>>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            reclaim_interval: Duration::from_secs(DEFAULT_RECLAIM_INTERVAL_SECS),
            pool_size: DEFAULT_POOL_SIZE,
            observer: None,
        }
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("default_ttl", &self.default_ttl)
            .field("reclaim_interval", &self.reclaim_interval)
            .field("pool_size", &self.pool_size)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.default_ttl_secs, 7 * 24 * 3600);
        assert_eq!(config.reclaim_interval_secs, 300);
        assert_eq!(config.pool_size, 4);
        assert!(config.dir.ends_with("transy/cache"));
    }

    #[test]
    fn overrides_apply() {
        let config = CacheConfig::default().with_overrides(lookup(&[
            (ENV_CACHE_DIR, "/tmp/transy-test"),
            (ENV_CACHE_TTL_SECS, "60"),
            (ENV_CACHE_RECLAIM_SECS, " 5 "),
        ]));
        assert_eq!(config.dir, PathBuf::from("/tmp/transy-test"));
        assert_eq!(config.default_ttl_secs, 60);
        assert_eq!(config.reclaim_interval_secs, 5);
    }

    #[test]
    fn invalid_overrides_are_ignored() {
        let config = CacheConfig::default().with_overrides(lookup(&[
            (ENV_CACHE_DIR, "  "),
            (ENV_CACHE_TTL_SECS, "soon"),
        ]));
        assert_eq!(config, CacheConfig::default());
    }

    #[test]
    fn deserialize_partial_json() {
        let config: CacheConfig =
            serde_json::from_str(r#"{ "dir": "/data/cache", "pool_size": 2 }"#).unwrap();
        assert_eq!(config.dir, PathBuf::from("/data/cache"));
        assert_eq!(config.pool_size, 2);
        assert_eq!(config.default_ttl_secs, DEFAULT_TTL_SECS);
    }

    #[test]
    fn store_config_from_cache_config() {
        let config = CacheConfig {
            default_ttl_secs: 10,
            reclaim_interval_secs: 20,
            ..CacheConfig::default()
        };
        let store = config.store_config();
        assert_eq!(store.default_ttl, Duration::from_secs(10));
        assert_eq!(store.reclaim_interval, Duration::from_secs(20));
        assert!(store.observer.is_none());
    }
}
