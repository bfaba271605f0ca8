//! Coordinator configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Default operation deadline (30s)
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Coordinator configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Deadline applied when `start_loading` is given no timeout
    #[serde(rename = "default-timeout-ms", default = "default_timeout_ms")]
    pub default_timeout_ms: u64,

    /// Number of transitions kept in the history ring
    #[serde(rename = "history-capacity", default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Log every transition at info level and expose the flag in debug snapshots
    #[serde(rename = "debug-mode", default)]
    pub debug_mode: bool,

    /// Buffer size of the loading event broadcast channel
    #[serde(rename = "event-capacity", default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Completed operations slower than this are logged at warn
    #[serde(rename = "slow-operation-ms", default = "default_slow_operation_ms")]
    pub slow_operation_ms: u64,

    /// Completed durations kept per operation name for metrics
    #[serde(rename = "metrics-window", default = "default_metrics_window")]
    pub metrics_window: usize,
}

fn default_timeout_ms() -> u64 {
    debug!("default_timeout_ms: called");
    DEFAULT_TIMEOUT_MS
}

fn default_history_capacity() -> usize {
    debug!("default_history_capacity: called");
    50
}

fn default_event_capacity() -> usize {
    debug!("default_event_capacity: called");
    256
}

fn default_slow_operation_ms() -> u64 {
    debug!("default_slow_operation_ms: called");
    5_000
}

fn default_metrics_window() -> usize {
    debug!("default_metrics_window: called");
    100
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        debug!("CoordinatorConfig::default: called");
        Self {
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            history_capacity: 50,
            debug_mode: false,
            event_capacity: 256,
            slow_operation_ms: 5_000,
            metrics_window: 100,
        }
    }
}

impl CoordinatorConfig {
    /// Get the default operation deadline as a Duration
    pub fn default_timeout(&self) -> Duration {
        debug!(default_timeout_ms = %self.default_timeout_ms, "CoordinatorConfig::default_timeout: called");
        Duration::from_millis(self.default_timeout_ms)
    }

    /// Get the slow-operation threshold as a Duration
    pub fn slow_operation(&self) -> Duration {
        Duration::from_millis(self.slow_operation_ms)
    }

    /// Config with debug mode switched on
    pub fn debug(mut self) -> Self {
        self.debug_mode = true;
        self
    }
}
