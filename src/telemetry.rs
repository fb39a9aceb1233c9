//! Logging bootstrap for binaries embedding the cache.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "transy_cache=info";

/// Install the global tracing subscriber. `json` switches to JSON lines.
/// Returns false if a subscriber was already installed.
pub fn init(json: bool) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr);

    if json {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_reports_already_installed() {
        // The first call may race other tests; only the second is deterministic.
        init(false);
        assert!(!init(true));
    }
}
