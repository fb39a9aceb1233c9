//! Background reclamation: deletes expired rows and returns free pages to the OS.
//! One task per open store, on a dedicated thread driving a current-thread Tokio
//! runtime. The loop selects between the interval tick and a CancellationToken
//! that the store cancels on close; close then joins the thread, so no pass
//! starts after close returns.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use rusqlite::{params, Connection};
use serde::Serialize;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::StorageError;
use crate::metrics::ReclaimObserver;

/// tokio intervals reject a zero period.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Outcome of one successful pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReclaimReport {
    /// Expired rows deleted.
    pub expired_removed: u64,
    /// Free pages handed back by incremental vacuum.
    pub pages_freed: u64,
}

/// Run one reclamation pass against `conn`. Rows expiring at or before
/// `now_ms` (Unix milliseconds) are deleted.
pub(crate) fn run_pass(conn: &Connection, now_ms: i64) -> Result<ReclaimReport, StorageError> {
    let removed = conn.execute(
        "DELETE FROM cache_entries WHERE expires_at <= ?1",
        params![now_ms],
    )?;

    let free_before: i64 = conn.query_row("PRAGMA freelist_count", [], |row| row.get(0))?;
    // Each step of incremental_vacuum releases one page; drain it fully.
    {
        let mut stmt = conn.prepare("PRAGMA incremental_vacuum")?;
        let mut rows = stmt.query([])?;
        while rows.next()?.is_some() {}
    }
    let free_after: i64 = conn.query_row("PRAGMA freelist_count", [], |row| row.get(0))?;

    conn.query_row("PRAGMA wal_checkpoint(PASSIVE)", [], |_| Ok(()))?;

    Ok(ReclaimReport {
        expired_removed: removed as u64,
        pages_freed: free_before.saturating_sub(free_after).max(0) as u64,
    })
}

/// Owned handle to the reclamation thread.
pub(crate) struct Reclaimer {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl Reclaimer {
    /// Start the loop. `pass` runs once per tick on the reclamation thread.
    pub(crate) fn spawn<F>(
        interval: Duration,
        pass: F,
        observers: Vec<Arc<dyn ReclaimObserver>>,
    ) -> std::io::Result<Self>
    where
        F: FnMut() -> Result<ReclaimReport, StorageError> + Send + 'static,
    {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()?;
        let token = CancellationToken::new();
        let loop_token = token.clone();

        let handle = std::thread::Builder::new()
            .name("cache-reclaim".into())
            .spawn(move || {
                runtime.block_on(reclaim_loop(interval, pass, observers, loop_token));
            })?;

        Ok(Self {
            token,
            handle: Some(handle),
        })
    }

    /// Cancel the loop and wait for the thread to finish.
    pub(crate) fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("cache reclamation thread panicked");
            }
        }
    }
}

impl Drop for Reclaimer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Tick until cancelled. Pass failures are logged and reported, never fatal.
pub(crate) async fn reclaim_loop<F>(
    interval: Duration,
    mut pass: F,
    observers: Vec<Arc<dyn ReclaimObserver>>,
    token: CancellationToken,
) where
    F: FnMut() -> Result<ReclaimReport, StorageError>,
{
    let period = interval.max(MIN_INTERVAL);
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    debug!(interval_ms = period.as_millis() as u64, "cache reclamation loop started");

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                info!("cache reclamation loop exiting (store closed)");
                return;
            }
            _ = ticker.tick() => {}
        }

        let start = Instant::now();
        match pass() {
            Ok(report) => {
                debug!(
                    expired_removed = report.expired_removed,
                    pages_freed = report.pages_freed,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "cache reclamation pass"
                );
                for observer in &observers {
                    observer.on_pass(&report);
                }
            }
            Err(e) => {
                warn!(error = %e, "cache reclamation pass failed");
                for observer in &observers {
                    observer.on_failure(&e);
                }
            }
        }
    }
}
