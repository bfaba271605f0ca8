//! Per-operation timing statistics
//!
//! Tracks, per operation name:
//! - how often it was started, completed, timed out and errored
//! - a bounded window of completed durations (min/max/average)
//!
//! Observational only; cleared together with the history ring.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Counters and recent durations for one operation name
#[derive(Debug, Clone, Default)]
struct OperationStats {
    started: u64,
    completed: u64,
    timed_out: u64,
    errored: u64,
    durations_ms: VecDeque<u64>,
}

/// Serializable view of one operation's statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationMetrics {
    pub operation: String,
    pub started: u64,
    pub completed: u64,
    pub timed_out: u64,
    pub errored: u64,
    pub avg_ms: f64,
    pub min_ms: u64,
    pub max_ms: u64,
    /// Errors and timeouts as a percentage of starts
    pub failure_rate: f64,
}

/// Aggregate snapshot returned by `Coordinator::metrics`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub total_started: u64,
    pub total_completed: u64,
    pub total_timed_out: u64,
    pub total_errored: u64,
    pub slow_operations: u64,
    pub operations: Vec<OperationMetrics>,
}

impl MetricsSnapshot {
    pub fn get(&self, operation: &str) -> Option<&OperationMetrics> {
        self.operations.iter().find(|m| m.operation == operation)
    }
}

/// Metrics recorder owned by the coordinator
#[derive(Debug)]
pub struct OperationMetricsRecorder {
    stats: HashMap<String, OperationStats>,
    window: usize,
    slow_threshold: Duration,
    slow_operations: u64,
}

impl OperationMetricsRecorder {
    pub fn new(window: usize, slow_threshold: Duration) -> Self {
        debug!(window, ?slow_threshold, "OperationMetricsRecorder::new: called");
        Self {
            stats: HashMap::new(),
            window,
            slow_threshold,
            slow_operations: 0,
        }
    }

    pub fn record_start(&mut self, operation: &str) {
        self.stats.entry(operation.to_string()).or_default().started += 1;
    }

    /// Record an explicit completion and its duration
    pub fn record_completion(&mut self, operation: &str, elapsed: Duration) {
        let elapsed_ms = elapsed.as_millis() as u64;
        debug!(%operation, elapsed_ms, "OperationMetricsRecorder::record_completion: called");
        if elapsed > self.slow_threshold {
            warn!(%operation, elapsed_ms, "Slow operation detected");
            self.slow_operations += 1;
        }

        let window = self.window;
        let stats = self.stats.entry(operation.to_string()).or_default();
        stats.completed += 1;
        if window > 0 {
            if stats.durations_ms.len() == window {
                stats.durations_ms.pop_front();
            }
            stats.durations_ms.push_back(elapsed_ms);
        }
    }

    pub fn record_timeout(&mut self, operation: &str) {
        self.stats.entry(operation.to_string()).or_default().timed_out += 1;
    }

    pub fn record_error(&mut self, operation: &str) {
        self.stats.entry(operation.to_string()).or_default().errored += 1;
    }

    pub fn clear(&mut self) {
        debug!("OperationMetricsRecorder::clear: called");
        self.stats.clear();
        self.slow_operations = 0;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut operations: Vec<OperationMetrics> = self
            .stats
            .iter()
            .map(|(name, stats)| {
                let durations = &stats.durations_ms;
                let avg_ms = if durations.is_empty() {
                    0.0
                } else {
                    durations.iter().sum::<u64>() as f64 / durations.len() as f64
                };
                let failure_rate = if stats.started == 0 {
                    0.0
                } else {
                    (stats.errored + stats.timed_out) as f64 / stats.started as f64 * 100.0
                };
                OperationMetrics {
                    operation: name.clone(),
                    started: stats.started,
                    completed: stats.completed,
                    timed_out: stats.timed_out,
                    errored: stats.errored,
                    avg_ms,
                    min_ms: durations.iter().copied().min().unwrap_or(0),
                    max_ms: durations.iter().copied().max().unwrap_or(0),
                    failure_rate,
                }
            })
            .collect();
        operations.sort_by(|a, b| a.operation.cmp(&b.operation));

        MetricsSnapshot {
            total_started: operations.iter().map(|m| m.started).sum(),
            total_completed: operations.iter().map(|m| m.completed).sum(),
            total_timed_out: operations.iter().map(|m| m.timed_out).sum(),
            total_errored: operations.iter().map(|m| m.errored).sum(),
            slow_operations: self.slow_operations,
            operations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> OperationMetricsRecorder {
        OperationMetricsRecorder::new(3, Duration::from_millis(5_000))
    }

    #[test]
    fn test_counts_and_durations() {
        let mut rec = recorder();
        rec.record_start("fetch");
        rec.record_completion("fetch", Duration::from_millis(100));
        rec.record_start("fetch");
        rec.record_completion("fetch", Duration::from_millis(300));

        let snap = rec.snapshot();
        let fetch = snap.get("fetch").unwrap();
        assert_eq!(fetch.started, 2);
        assert_eq!(fetch.completed, 2);
        assert_eq!(fetch.min_ms, 100);
        assert_eq!(fetch.max_ms, 300);
        assert!((fetch.avg_ms - 200.0).abs() < f64::EPSILON);
        assert_eq!(fetch.failure_rate, 0.0);
    }

    #[test]
    fn test_window_drops_oldest_duration() {
        let mut rec = recorder();
        for ms in [10, 20, 30, 40] {
            rec.record_completion("x", Duration::from_millis(ms));
        }
        let snap = rec.snapshot();
        let x = snap.get("x").unwrap();
        assert_eq!(x.completed, 4);
        assert_eq!(x.min_ms, 20);
        assert_eq!(x.max_ms, 40);
    }

    #[test]
    fn test_failure_rate_and_slow_operations() {
        let mut rec = recorder();
        for _ in 0..4 {
            rec.record_start("submit");
        }
        rec.record_timeout("submit");
        rec.record_error("submit");
        rec.record_completion("submit", Duration::from_millis(6_000));

        let snap = rec.snapshot();
        assert_eq!(snap.slow_operations, 1);
        assert_eq!(snap.total_timed_out, 1);
        assert_eq!(snap.total_errored, 1);
        assert!((snap.get("submit").unwrap().failure_rate - 50.0).abs() < f64::EPSILON);

        rec.clear();
        assert_eq!(rec.snapshot(), MetricsSnapshot::default());
    }
}
