//! Persistent translation cache backed by SQLite.
//! Entries are JSON records keyed by the hex cache key; expiry lives in its own
//! `expires_at` column (Unix ms), never inside the record. WAL mode lets readers
//! proceed while a write commits. Hit/miss counters are plain atomics.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info, warn};

use super::key::CacheKey;
use super::reclaim::{self, ReclaimReport, Reclaimer};
use super::{CacheEntry, CacheStats};
use crate::config::{StoreConfig, DEFAULT_TTL_SECS};
use crate::error::{OpenError, StorageError, WriteError};
use crate::metrics::{ReclaimCounters, ReclaimObserver, ReclaimSnapshot};

/// Retention used when `set` is called with a zero TTL: 7 days.
pub const DEFAULT_TTL: Duration = Duration::from_secs(DEFAULT_TTL_SECS);

/// Database file inside the cache directory.
pub const DB_FILE: &str = "cache.db";

type SqlitePool = Pool<SqliteConnectionManager>;
type PooledConn = PooledConnection<SqliteConnectionManager>;

/// Per-connection settings. auto_vacuum only takes effect on a fresh file.
pub(crate) fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "PRAGMA auto_vacuum = INCREMENTAL;
         PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA busy_timeout = 5000;",
    )
}

pub(crate) fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS cache_entries (
            cache_key TEXT PRIMARY KEY,
            value BLOB NOT NULL,
            expires_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_cache_entries_expires
            ON cache_entries(expires_at);",
    )
}

/// Pool slot shared with the reclamation thread. `None` once closed.
struct Db {
    pool: RwLock<Option<SqlitePool>>,
}

impl Db {
    fn conn(&self) -> Result<PooledConn, StorageError> {
        // Clone the pool handle so the lock is not held across I/O.
        let pool = self.pool.read().clone().ok_or(StorageError::Closed)?;
        Ok(pool.get()?)
    }

    fn reclaim(&self) -> Result<ReclaimReport, StorageError> {
        let conn = self.conn()?;
        reclaim::run_pass(&conn, now_millis())
    }
}

/// Translation response cache.
///
/// Safe to share across threads (`Arc<Store>`). Lookups never fail: any
/// problem is counted as a miss. Writes are best-effort and return
/// [`WriteError`] for the caller to log.
pub struct Store {
    db: Arc<Db>,
    dir: PathBuf,
    default_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    reclaim_counters: Arc<ReclaimCounters>,
    reclaimer: Mutex<Option<Reclaimer>>,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("dir", &self.dir)
            .field("default_ttl", &self.default_ttl)
            .field("hits", &self.hits.load(Ordering::Relaxed))
            .field("misses", &self.misses.load(Ordering::Relaxed))
            .field("closed", &self.db.pool.read().is_none())
            .finish()
    }
}

impl Store {
    /// Open (or create) the cache in directory `dir` with default settings.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, OpenError> {
        Self::open_with(dir, StoreConfig::default())
    }

    /// Open (or create) the cache and start its reclamation task.
    pub fn open_with(dir: impl AsRef<Path>, config: StoreConfig) -> Result<Self, OpenError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|source| OpenError::CreateDir {
            path: dir.clone(),
            source,
        })?;
        let db_path = dir.join(DB_FILE);

        // Direct connection first: schema and pragma errors surface immediately
        // instead of as a pool timeout.
        {
            let conn = Connection::open(&db_path)?;
            configure_connection(&conn)?;
            init_schema(&conn)?;
        }

        let manager =
            SqliteConnectionManager::file(&db_path).with_init(|conn| configure_connection(conn));
        let pool = Pool::builder()
            .max_size(config.pool_size.max(1))
            .connection_timeout(Duration::from_secs(5))
            .build(manager)?;

        let db = Arc::new(Db {
            pool: RwLock::new(Some(pool)),
        });

        let reclaim_counters = Arc::new(ReclaimCounters::new());
        let mut observers: Vec<Arc<dyn ReclaimObserver>> = vec![reclaim_counters.clone()];
        observers.extend(config.observer.clone());

        let pass_db = Arc::clone(&db);
        let reclaimer = Reclaimer::spawn(
            config.reclaim_interval,
            move || pass_db.reclaim(),
            observers,
        )
        .map_err(OpenError::Reclaimer)?;

        let default_ttl = if config.default_ttl.is_zero() {
            DEFAULT_TTL
        } else {
            config.default_ttl
        };

        info!(
            path = %db_path.display(),
            pool_size = config.pool_size.max(1),
            reclaim_interval_secs = config.reclaim_interval.as_secs(),
            "translation cache opened"
        );

        Ok(Self {
            db,
            dir,
            default_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            reclaim_counters,
            reclaimer: Mutex::new(Some(reclaimer)),
        })
    }

    /// Look up a live entry. Absent, expired, undecodable or unreadable all
    /// count as a miss.
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let value = match self.fetch(key) {
            Ok(Some(value)) => value,
            Ok(None) => {
                debug!(key = key.short(), "cache miss");
                return self.record_miss();
            }
            Err(e) => {
                debug!(key = key.short(), error = %e, "cache lookup failed");
                return self.record_miss();
            }
        };

        match serde_json::from_slice::<CacheEntry>(&value) {
            Ok(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = key.short(), "cache hit");
                Some(entry)
            }
            Err(e) => {
                warn!(key = key.short(), error = %e, "undecodable cache entry");
                self.record_miss()
            }
        }
    }

    fn fetch(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, StorageError> {
        let conn = self.db.conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM cache_entries
                 WHERE cache_key = ?1 AND expires_at > ?2",
                params![key.as_str(), now_millis()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn record_miss(&self) -> Option<CacheEntry> {
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store `entry` under `key`, replacing any previous entry.
    /// A zero `ttl` means the default retention period, not immediate expiry.
    pub fn set(&self, key: &CacheKey, entry: &CacheEntry, ttl: Duration) -> Result<(), WriteError> {
        let ttl = if ttl.is_zero() { self.default_ttl } else { ttl };
        let value = serde_json::to_vec(entry)?;
        let expires_at = expiry_millis(now_millis(), ttl);

        let conn = self.db.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO cache_entries (cache_key, value, expires_at)
             VALUES (?1, ?2, ?3)",
            params![key.as_str(), value, expires_at],
        )?;
        debug!(key = key.short(), ttl_secs = ttl.as_secs(), "cache set");
        Ok(())
    }

    /// Remove an entry. Returns whether a row existed. Counters are untouched.
    pub fn evict(&self, key: &CacheKey) -> Result<bool, WriteError> {
        let conn = self.db.conn()?;
        let removed = conn.execute(
            "DELETE FROM cache_entries WHERE cache_key = ?1",
            params![key.as_str()],
        )?;
        Ok(removed > 0)
    }

    /// Time left before a live entry expires. Counters are untouched.
    pub fn remaining_ttl(&self, key: &CacheKey) -> Option<Duration> {
        match self.fetch_expiry(key) {
            Ok(Some((expires_at, now))) => Some(Duration::from_millis((expires_at - now) as u64)),
            Ok(None) => None,
            Err(e) => {
                debug!(key = key.short(), error = %e, "cache expiry lookup failed");
                None
            }
        }
    }

    fn fetch_expiry(&self, key: &CacheKey) -> Result<Option<(i64, i64)>, StorageError> {
        let conn = self.db.conn()?;
        let now = now_millis();
        let expires_at: Option<i64> = conn
            .query_row(
                "SELECT expires_at FROM cache_entries
                 WHERE cache_key = ?1 AND expires_at > ?2",
                params![key.as_str(), now],
                |row| row.get(0),
            )
            .optional()?;
        Ok(expires_at.map(|at| (at, now)))
    }

    /// Number of live entries.
    pub fn len(&self) -> Result<u64, StorageError> {
        let conn = self.db.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM cache_entries WHERE expires_at > ?1",
            params![now_millis()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    pub fn is_empty(&self) -> Result<bool, StorageError> {
        Ok(self.len()? == 0)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }

    /// Run one reclamation pass now, on the calling thread.
    /// Not counted in [`Store::reclaim_stats`], which covers the background task.
    pub fn reclaim_now(&self) -> Result<ReclaimReport, StorageError> {
        self.db.reclaim()
    }

    /// Counters of the background reclamation task.
    pub fn reclaim_stats(&self) -> ReclaimSnapshot {
        self.reclaim_counters.snapshot()
    }

    /// The cache directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_closed(&self) -> bool {
        self.db.pool.read().is_none()
    }

    /// Stop the reclamation task, checkpoint the WAL and release the pool.
    /// Safe to call more than once; later calls are no-ops.
    pub fn close(&self) -> Result<(), StorageError> {
        if let Some(reclaimer) = self.reclaimer.lock().take() {
            reclaimer.shutdown();
        }

        let Some(pool) = self.db.pool.write().take() else {
            return Ok(());
        };

        let conn = pool.get()?;
        conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
        drop(conn);
        drop(pool);

        let stats = self.stats();
        info!(
            dir = %self.dir.display(),
            hits = stats.hits,
            misses = stats.misses,
            "translation cache closed"
        );
        Ok(())
    }
}

impl Drop for Store {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "translation cache close failed");
        }
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn expiry_millis(now_ms: i64, ttl: Duration) -> i64 {
    let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
    now_ms.saturating_add(ttl_ms)
}
