//! Loading events for presentation adapters
//!
//! Every registry transition is published on a broadcast channel so that
//! buttons, overlays and boundary surfaces can re-render without polling.
//! Emission is fire-and-forget: no subscribers is fine, and a lagging
//! subscriber loses the oldest events.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Observable coordinator activity
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LoadingEvent {
    /// An operation entered LOADING
    Started {
        operation: String,
        timeout_ms: Option<u64>,
        /// True when an active entry with the same name was overwritten
        restarted: bool,
    },
    /// An operation was explicitly stopped
    Stopped { operation: String, elapsed_ms: u64 },
    /// An operation's deadline elapsed
    TimedOut {
        operation: String,
        timeout_ms: u64,
        elapsed_ms: u64,
    },
    /// An error was routed
    Errored {
        operation: Option<String>,
        message: String,
    },
    /// An operation was swept by `force_stop_all_loading`
    ForceStopped { operation: String, reason: String },
    /// `cleanup()` completed
    CleanedUp { callbacks_run: usize },
}

impl LoadingEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            LoadingEvent::Started { .. } => "Started",
            LoadingEvent::Stopped { .. } => "Stopped",
            LoadingEvent::TimedOut { .. } => "TimedOut",
            LoadingEvent::Errored { .. } => "Errored",
            LoadingEvent::ForceStopped { .. } => "ForceStopped",
            LoadingEvent::CleanedUp { .. } => "CleanedUp",
        }
    }

    /// Operation the event concerns, if any
    pub fn operation(&self) -> Option<&str> {
        match self {
            LoadingEvent::Started { operation, .. }
            | LoadingEvent::Stopped { operation, .. }
            | LoadingEvent::TimedOut { operation, .. }
            | LoadingEvent::ForceStopped { operation, .. } => Some(operation),
            LoadingEvent::Errored { operation, .. } => operation.as_deref(),
            LoadingEvent::CleanedUp { .. } => None,
        }
    }

    /// Whether the operation is loading after this event
    pub fn is_loading_transition(&self) -> bool {
        matches!(self, LoadingEvent::Started { .. })
    }
}

/// Broadcast channel carrying [`LoadingEvent`]s
pub struct EventBus {
    tx: broadcast::Sender<LoadingEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "EventBus::new: creating event bus");
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn emit(&self, event: LoadingEvent) {
        debug!(
            event_type = event.event_type(),
            operation = event.operation(),
            "EventBus::emit"
        );
        // No subscribers is OK
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LoadingEvent> {
        debug!("EventBus::subscribe: new subscriber");
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
