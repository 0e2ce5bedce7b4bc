//! Backoff builders shared by startup binding and completion polling.

use std::time::Duration;

use backon::{ConstantBuilder, ExponentialBuilder};

/// Backoff for waiting on the graph store at startup.
///
/// - Min delay: 100ms
/// - Max delay: 5s
/// - Max attempts: 30
/// - Jitter enabled
pub fn schema_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(100))
        .with_max_delay(Duration::from_secs(5))
        .with_max_times(30)
        .with_jitter()
}

/// Fixed-interval polling with a bounded number of attempts.
pub fn poll_backoff(interval: Duration, max_polls: usize) -> ConstantBuilder {
    ConstantBuilder::default()
        .with_delay(interval)
        .with_max_times(max_polls)
}

/// Default worker count: twice the available parallelism.
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() * 2)
        .unwrap_or(2)
}
