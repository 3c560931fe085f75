//! JanitorLoop — periodic background sweep of the cache (§9 "Background loops").
//!
//! §5 calls for a 10-minute back-off "on exception". `CacheStore::sweep_expired`
//! is infallible by construction (§4.1: directory-removal failures are logged
//! and swallowed inside `CacheStore` itself, never surfaced to the caller), so
//! there is no exception for this loop to observe or back off from; the fixed
//! 60s period runs unconditionally for the process lifetime.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cache::CacheStore;

const SWEEP_PERIOD: Duration = Duration::from_secs(60);

/// Spawns the sweep loop; the returned handle should be awaited during
/// shutdown so a sweep in flight finishes cleanly.
pub fn spawn(cache: CacheStore, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("janitor loop shutting down");
                    return;
                }
                _ = tokio::time::sleep(SWEEP_PERIOD) => {}
            }

            cache.sweep_expired().await;
        }
    })
}
