//! Bounded diagnostic log of registry transitions
//!
//! Purely observational: nothing in the coordinator reads the history to make
//! a decision. Storage is a fixed-capacity arena with a write cursor, so once
//! full each append overwrites the oldest entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Registry transition kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HistoryAction {
    Start,
    Stop,
    Timeout,
    Error,
    ForceStop,
}

impl HistoryAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryAction::Start => "START",
            HistoryAction::Stop => "STOP",
            HistoryAction::Timeout => "TIMEOUT",
            HistoryAction::Error => "ERROR",
            HistoryAction::ForceStop => "FORCE_STOP",
        }
    }
}

impl std::fmt::Display for HistoryAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub operation: String,
    pub action: HistoryAction,
    pub timestamp: DateTime<Utc>,
    /// Error message, present for `ERROR` entries
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HistoryEntry {
    pub fn new(operation: impl Into<String>, action: HistoryAction) -> Self {
        Self {
            operation: operation.into(),
            action,
            timestamp: Utc::now(),
            error: None,
        }
    }

    pub fn error(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::new(operation, HistoryAction::Error)
        }
    }
}

/// Fixed-capacity ring buffer of history entries
#[derive(Debug, Clone)]
pub struct HistoryRing {
    slots: Vec<Option<HistoryEntry>>,
    /// Next slot to write
    cursor: usize,
    len: usize,
}

impl HistoryRing {
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "HistoryRing::new: called");
        Self {
            slots: vec![None; capacity],
            cursor: 0,
            len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append an entry, dropping the oldest when full
    pub fn push(&mut self, entry: HistoryEntry) {
        if self.slots.is_empty() {
            return;
        }
        self.slots[self.cursor] = Some(entry);
        self.cursor = (self.cursor + 1) % self.slots.len();
        self.len = (self.len + 1).min(self.slots.len());
    }

    /// All retained entries, oldest first
    pub fn entries(&self) -> Vec<HistoryEntry> {
        let cap = self.slots.len();
        if cap == 0 {
            return Vec::new();
        }
        let start = (self.cursor + cap - self.len) % cap;
        (0..self.len)
            .filter_map(|i| self.slots[(start + i) % cap].clone())
            .collect()
    }

    /// The `n` most recent entries, oldest first
    pub fn last(&self, n: usize) -> Vec<HistoryEntry> {
        let entries = self.entries();
        let skip = entries.len().saturating_sub(n);
        entries.into_iter().skip(skip).collect()
    }

    pub fn clear(&mut self) {
        debug!(len = self.len, "HistoryRing::clear: called");
        self.slots.iter_mut().for_each(|slot| *slot = None);
        self.cursor = 0;
        self.len = 0;
    }
}
