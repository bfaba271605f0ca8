//! Authoritative map of in-flight named operations
//!
//! Pure data: no timers, no I/O. At most one live [`Operation`] per name.
//! Every start is stamped with a fresh generation so that a deadline armed for
//! an earlier start can never terminate a later one.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::time::Instant;
use tracing::debug;

use super::options::TimeoutCallback;

/// One named unit of asynchronous work currently in flight
#[derive(Clone)]
pub struct Operation {
    pub name: String,
    pub generation: u64,
    /// Monotonic start, used for elapsed time
    pub start_time: Instant,
    /// Wall-clock start, used for display
    pub started_at: DateTime<Utc>,
    /// `None` when the operation has no deadline
    pub timeout: Option<Duration>,
    /// Diagnostics only, never consulted for control flow
    pub metadata: Map<String, Value>,
    pub on_timeout: Option<TimeoutCallback>,
}

impl Operation {
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn info(&self) -> OperationInfo {
        OperationInfo {
            started_at: self.started_at,
            elapsed_ms: self.elapsed().as_millis() as u64,
            timeout_ms: self.timeout.map(|t| t.as_millis() as u64),
            metadata: self.metadata.clone(),
        }
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.name)
            .field("generation", &self.generation)
            .field("started_at", &self.started_at)
            .field("timeout", &self.timeout)
            .field("metadata", &self.metadata)
            .field("on_timeout", &self.on_timeout.is_some())
            .finish()
    }
}

/// Read-only projection returned by `get_active_operations`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperationInfo {
    #[serde(rename = "start-time")]
    pub started_at: DateTime<Utc>,
    #[serde(rename = "elapsed-ms")]
    pub elapsed_ms: u64,
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: Option<u64>,
    pub metadata: Map<String, Value>,
}

/// Registry of live operations
#[derive(Debug, Default)]
pub struct OperationRegistry {
    operations: HashMap<String, Operation>,
    next_generation: u64,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or overwrite the entry for `name`
    ///
    /// Returns the new entry's generation and the entry it replaced, if any.
    /// The caller owns canceling the replaced entry's deadline.
    pub fn start(
        &mut self,
        name: &str,
        timeout: Option<Duration>,
        metadata: Map<String, Value>,
        on_timeout: Option<TimeoutCallback>,
    ) -> (u64, Option<Operation>) {
        self.next_generation += 1;
        let generation = self.next_generation;
        debug!(%name, generation, ?timeout, "OperationRegistry::start: called");

        let operation = Operation {
            name: name.to_string(),
            generation,
            start_time: Instant::now(),
            started_at: Utc::now(),
            timeout,
            metadata,
            on_timeout,
        };
        let replaced = self.operations.insert(name.to_string(), operation);
        (generation, replaced)
    }

    /// Remove the entry for `name`; no-op if absent
    pub fn stop(&mut self, name: &str) -> Option<Operation> {
        debug!(%name, "OperationRegistry::stop: called");
        self.operations.remove(name)
    }

    /// Remove the entry only if it is still the given generation
    pub fn stop_generation(&mut self, name: &str, generation: u64) -> Option<Operation> {
        match self.operations.get(name) {
            Some(op) if op.generation == generation => self.operations.remove(name),
            _ => {
                debug!(%name, generation, "OperationRegistry::stop_generation: stale generation");
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Operation> {
        self.operations.get(name)
    }

    pub fn is_loading(&self, name: &str) -> bool {
        self.operations.contains_key(name)
    }

    /// Names of live operations, correct as of the borrow
    pub fn active_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.operations.keys().map(String::as_str)
    }

    pub fn count(&self) -> usize {
        self.operations.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Operation> + '_ {
        self.operations.values()
    }

    /// Remove and return every live operation
    pub fn drain(&mut self) -> Vec<Operation> {
        self.operations.drain().map(|(_, op)| op).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start(reg: &mut OperationRegistry, name: &str) -> u64 {
        reg.start(name, Some(Duration::from_secs(1)), Map::new(), None).0
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let mut reg = OperationRegistry::new();
        start(&mut reg, "fetch");
        assert!(reg.is_loading("fetch"));
        assert_eq!(reg.count(), 1);

        let stopped = reg.stop("fetch");
        assert!(stopped.is_some());
        assert!(!reg.is_loading("fetch"));
        assert!(reg.stop("fetch").is_none());
    }

    #[tokio::test]
    async fn test_restart_overwrites_without_duplicate() {
        let mut reg = OperationRegistry::new();
        let first = start(&mut reg, "fetch");
        let (second, replaced) = reg.start("fetch", None, Map::new(), None);

        assert_eq!(reg.count(), 1);
        assert_eq!(replaced.map(|op| op.generation), Some(first));
        assert!(second > first);
        assert_eq!(reg.get("fetch").map(|op| op.timeout), Some(None));
    }

    #[tokio::test]
    async fn test_stop_generation_ignores_stale() {
        let mut reg = OperationRegistry::new();
        let first = start(&mut reg, "fetch");
        let second = start(&mut reg, "fetch");

        assert!(reg.stop_generation("fetch", first).is_none());
        assert!(reg.is_loading("fetch"));
        assert!(reg.stop_generation("fetch", second).is_some());
        assert!(!reg.is_loading("fetch"));
    }

    #[tokio::test]
    async fn test_active_names_and_drain() {
        let mut reg = OperationRegistry::new();
        for name in ["a", "b", "c"] {
            start(&mut reg, name);
        }
        let mut names: Vec<&str> = reg.active_names().collect();
        names.sort();
        assert_eq!(names, vec!["a", "b", "c"]);

        let drained = reg.drain();
        assert_eq!(drained.len(), 3);
        assert_eq!(reg.count(), 0);
    }
}
