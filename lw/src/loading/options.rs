//! Per-call options and callback types

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};

use super::error::LoadingError;
use super::router::ErrorRecord;

/// Per-operation or global error subscriber
pub type ErrorCallback = Arc<dyn Fn(&ErrorRecord) -> eyre::Result<()> + Send + Sync>;

/// Invoked once with the timeout error and the operation name when a deadline elapses
pub type TimeoutCallback = Arc<dyn Fn(&LoadingError, &str) -> eyre::Result<()> + Send + Sync>;

/// Invoked by `cleanup()`
pub type CleanupCallback = Arc<dyn Fn() -> eyre::Result<()> + Send + Sync>;

/// Options recognized by `start_loading` and the wrapping helpers
#[derive(Clone, Default)]
pub struct LoadingOptions {
    /// Deadline; `None` uses the coordinator default, zero disables the deadline
    pub timeout: Option<Duration>,
    pub on_timeout: Option<TimeoutCallback>,
    /// Only consulted by `with_error_handling`
    pub on_error: Option<ErrorCallback>,
    /// Human-readable description of what the user did
    pub user_action: Option<String>,
    /// Opaque reference to the triggering UI element
    pub trigger_element: Option<Value>,
    /// Extra diagnostic key/values
    pub metadata: Map<String, Value>,
}

impl LoadingOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn timeout_ms(self, ms: u64) -> Self {
        self.timeout(Duration::from_millis(ms))
    }

    pub fn on_timeout<F>(mut self, f: F) -> Self
    where
        F: Fn(&LoadingError, &str) -> eyre::Result<()> + Send + Sync + 'static,
    {
        self.on_timeout = Some(Arc::new(f));
        self
    }

    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&ErrorRecord) -> eyre::Result<()> + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub fn user_action(mut self, action: impl Into<String>) -> Self {
        self.user_action = Some(action.into());
        self
    }

    pub fn trigger_element(mut self, element: Value) -> Self {
        self.trigger_element = Some(element);
        self
    }

    pub fn meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Flatten the diagnostic fields into the bag stored on the operation
    pub(crate) fn metadata_bag(&self) -> Map<String, Value> {
        let mut bag = self.metadata.clone();
        if let Some(action) = &self.user_action {
            bag.insert("userAction".to_string(), Value::String(action.clone()));
        }
        if let Some(element) = &self.trigger_element {
            bag.insert("triggerElement".to_string(), element.clone());
        }
        bag
    }
}

impl fmt::Debug for LoadingOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadingOptions")
            .field("timeout", &self.timeout)
            .field("on_timeout", &self.on_timeout.is_some())
            .field("on_error", &self.on_error.is_some())
            .field("user_action", &self.user_action)
            .field("trigger_element", &self.trigger_element)
            .field("metadata", &self.metadata)
            .finish()
    }
}
