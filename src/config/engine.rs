//! Engine tuning sections: dispatcher, notifier, batch processor, reconciler.

use std::time::Duration;

use serde::Deserialize;

use crate::utils::retry::default_worker_count;

/// Default idle-backlog sweep interval.
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 500;

/// Default interval between completion polls.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Default number of completion polls before a notification is abandoned.
pub const DEFAULT_MAX_POLLS: usize = 60;

/// Default records per batch.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Default batch flush interval.
pub const DEFAULT_FLUSH_INTERVAL_MS: u64 = 100;

/// Default reconciliation interval.
pub const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 5;

/// Dispatcher and worker pool settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum concurrently executing workers across all keys.
    ///
    /// Default: 2 × available parallelism.
    pub workers: usize,
    /// Interval at which stalled backlog entries are drained.
    pub sweep_interval_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: default_worker_count(),
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
        }
    }
}

impl PipelineConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }

    /// Worker count, never zero.
    pub fn worker_count(&self) -> usize {
        if self.workers == 0 {
            default_worker_count()
        } else {
            self.workers
        }
    }
}

/// Completion notifier settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    pub enabled: bool,
    pub poll_interval_ms: u64,
    pub max_polls: usize,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            max_polls: DEFAULT_MAX_POLLS,
        }
    }
}

impl NotifierConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Batch processor settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Route node, link and prefix records through the batch processor.
    pub enabled: bool,
    pub batch_size: usize,
    pub flush_interval_ms: u64,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            batch_size: DEFAULT_BATCH_SIZE,
            flush_interval_ms: DEFAULT_FLUSH_INTERVAL_MS,
        }
    }
}

impl BatchConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    /// Per-category channel capacity.
    pub fn channel_capacity(&self) -> usize {
        self.batch_size.saturating_mul(2).max(1)
    }
}

/// Reconciliation loop settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    /// Field whose presence marks a derived edge as copied from the source graph.
    pub marker_field: String,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: DEFAULT_RECONCILE_INTERVAL_SECS,
            marker_field: "protocol_id".to_string(),
        }
    }
}

impl ReconcileConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}
