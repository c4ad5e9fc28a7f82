//! Scheduled cleanup of in-memory limiter state.

use crate::rate_limit::RateLimitConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Interval between cleanup runs.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Run all cleanup tasks once.
pub fn run_cleanup(rate_limit: &RateLimitConfig) {
    let removed = rate_limit.retain_recent();
    if removed > 0 {
        debug!("Dropped {} idle login limiter entries", removed);
    }
}

/// Spawn a background task that runs cleanup periodically.
/// Returns a handle that can be used to abort the task.
pub fn spawn_cleanup_scheduler(rate_limit: Arc<RateLimitConfig>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);

        loop {
            interval.tick().await;
            run_cleanup(&rate_limit);
        }
    })
}
