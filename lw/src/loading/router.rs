//! Error enrichment and fan-out
//!
//! Routing happens in two steps so that no callback ever runs while the
//! coordinator lock is held:
//!
//! 1. [`ErrorRouter::prepare`] (under the lock) captures the loading context
//!    and snapshots the subscribers into a [`Dispatch`].
//! 2. [`Dispatch::deliver`] (lock released) invokes the per-operation
//!    callback, then every boundary callback, each behind its own isolating
//!    boundary. A subscriber that registers or removes callbacks mid-delivery
//!    only affects the next routing.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use super::error::{CallbackError, LoadingError};
use super::options::ErrorCallback;

static SESSION_ID: LazyLock<String> = LazyLock::new(|| Uuid::now_v7().to_string());

/// Identifier generated once per process, stamped on every routed error
pub fn session_id() -> &'static str {
    SESSION_ID.as_str()
}

/// Read-only snapshot taken when an error is routed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadingContext {
    #[serde(rename = "active-operations")]
    pub active_operations: Vec<String>,
    #[serde(rename = "session-id")]
    pub session_id: String,
    #[serde(rename = "captured-at")]
    pub captured_at: DateTime<Utc>,
}

impl LoadingContext {
    pub fn capture(mut active_operations: Vec<String>) -> Self {
        active_operations.sort();
        Self {
            active_operations,
            session_id: session_id().to_string(),
            captured_at: Utc::now(),
        }
    }
}

/// An error enriched with the operation and loading context it occurred in
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorRecord {
    pub error: LoadingError,
    /// `None` for ambient errors not tied to an operation
    pub operation: Option<String>,
    #[serde(rename = "loading-context")]
    pub loading_context: LoadingContext,
}

impl ErrorRecord {
    pub fn message(&self) -> String {
        self.error.to_string()
    }

    pub fn is_timeout(&self) -> bool {
        self.error.is_timeout()
    }
}

/// Subscriber registries
#[derive(Default)]
pub struct ErrorRouter {
    per_operation: HashMap<String, ErrorCallback>,
    boundary: Vec<ErrorCallback>,
}

impl ErrorRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the callback for `name`; last registration wins
    pub fn set_error_callback(&mut self, name: &str, callback: ErrorCallback) -> bool {
        debug!(%name, "ErrorRouter::set_error_callback: called");
        self.per_operation.insert(name.to_string(), callback).is_some()
    }

    pub fn remove_error_callback(&mut self, name: &str) -> bool {
        self.per_operation.remove(name).is_some()
    }

    pub fn add_boundary_callback(&mut self, callback: ErrorCallback) {
        debug!(count = self.boundary.len() + 1, "ErrorRouter::add_boundary_callback: called");
        self.boundary.push(callback);
    }

    pub fn per_operation_count(&self) -> usize {
        self.per_operation.len()
    }

    pub fn boundary_count(&self) -> usize {
        self.boundary.len()
    }

    pub fn clear(&mut self) {
        debug!("ErrorRouter::clear: called");
        self.per_operation.clear();
        self.boundary.clear();
    }

    /// Enrich `error` and snapshot the subscribers that should receive it
    pub fn prepare(&self, operation: Option<&str>, error: LoadingError, active_operations: Vec<String>) -> Dispatch {
        debug!(?operation, kind = error.kind(), "ErrorRouter::prepare: called");
        let record = ErrorRecord {
            error,
            operation: operation.map(str::to_string),
            loading_context: LoadingContext::capture(active_operations),
        };
        Dispatch {
            per_operation: operation.and_then(|name| self.per_operation.get(name).cloned()),
            boundary: self.boundary.clone(),
            record,
        }
    }
}

/// A routed error together with the subscribers captured for it
pub struct Dispatch {
    record: ErrorRecord,
    per_operation: Option<ErrorCallback>,
    boundary: Vec<ErrorCallback>,
}

impl Dispatch {
    pub fn record(&self) -> &ErrorRecord {
        &self.record
    }

    /// Invoke every captured subscriber; never panics, never returns an error
    pub fn deliver(self) -> Delivery {
        let mut delivered = 0;
        let mut failures = Vec::new();

        if let Some(callback) = &self.per_operation {
            match isolate("error", || callback(&self.record)) {
                Ok(()) => delivered += 1,
                Err(e) => failures.push(e),
            }
        }

        for callback in &self.boundary {
            match isolate("error-boundary", || callback(&self.record)) {
                Ok(()) => delivered += 1,
                Err(e) => failures.push(e),
            }
        }

        debug!(delivered, failed = failures.len(), "Dispatch::deliver: done");
        Delivery {
            record: self.record,
            delivered,
            failures,
        }
    }
}

/// Outcome of a fan-out
#[derive(Debug)]
pub struct Delivery {
    pub record: ErrorRecord,
    pub delivered: usize,
    pub failures: Vec<CallbackError>,
}

/// Run a callback behind a catch-log-continue boundary
pub(crate) fn isolate<F>(label: &str, f: F) -> Result<(), CallbackError>
where
    F: FnOnce() -> eyre::Result<()>,
{
    let err = match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => return Ok(()),
        Ok(Err(e)) => CallbackError::Failed {
            callback: label.to_string(),
            message: format!("{:#}", e),
        },
        Err(payload) => CallbackError::Panicked {
            callback: label.to_string(),
            message: panic_message(payload.as_ref()),
        },
    };
    warn!(error = %err, "Callback failed, continuing");
    Err(err)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(hits: &Arc<AtomicUsize>) -> ErrorCallback {
        let hits = hits.clone();
        Arc::new(move |_: &ErrorRecord| -> eyre::Result<()> {
            hits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn test_prepare_enriches_record() {
        let router = ErrorRouter::new();
        let dispatch = router.prepare(
            Some("submit"),
            LoadingError::application("bad"),
            vec!["submit".to_string(), "fetch".to_string()],
        );
        let record = dispatch.record();
        assert_eq!(record.operation.as_deref(), Some("submit"));
        assert_eq!(record.loading_context.active_operations, vec!["fetch", "submit"]);
        assert_eq!(record.loading_context.session_id, session_id());
        assert_eq!(record.message(), "bad");
    }

    #[test]
    fn test_session_id_is_stable() {
        assert_eq!(session_id(), session_id());
        assert!(Uuid::parse_str(session_id()).is_ok());
    }

    #[test]
    fn test_deliver_reaches_operation_and_boundary() {
        let op_hits = Arc::new(AtomicUsize::new(0));
        let boundary_hits = Arc::new(AtomicUsize::new(0));
        let mut router = ErrorRouter::new();
        router.set_error_callback("submit", counting(&op_hits));
        router.set_error_callback("other", counting(&op_hits));
        router.add_boundary_callback(counting(&boundary_hits));
        router.add_boundary_callback(counting(&boundary_hits));

        let delivery = router
            .prepare(Some("submit"), LoadingError::application("bad"), vec![])
            .deliver();
        assert_eq!(delivery.delivered, 3);
        assert!(delivery.failures.is_empty());
        assert_eq!(op_hits.load(Ordering::SeqCst), 1);
        assert_eq!(boundary_hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_ambient_error_skips_operation_callbacks() {
        let op_hits = Arc::new(AtomicUsize::new(0));
        let boundary_hits = Arc::new(AtomicUsize::new(0));
        let mut router = ErrorRouter::new();
        router.set_error_callback("submit", counting(&op_hits));
        router.add_boundary_callback(counting(&boundary_hits));

        router.prepare(None, LoadingError::application("x"), vec![]).deliver();
        assert_eq!(op_hits.load(Ordering::SeqCst), 0);
        assert_eq!(boundary_hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failures_are_isolated() {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut router = ErrorRouter::new();
        router.set_error_callback(
            "x",
            Arc::new(|_: &ErrorRecord| -> eyre::Result<()> { Err(eyre::eyre!("op callback broke")) }),
        );
        router.add_boundary_callback(Arc::new(|_: &ErrorRecord| -> eyre::Result<()> {
            panic!("boundary exploded")
        }));
        router.add_boundary_callback(counting(&hits));

        let delivery = router.prepare(Some("x"), LoadingError::application("e"), vec![]).deliver();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(delivery.delivered, 1);
        assert_eq!(delivery.failures.len(), 2);
        assert!(matches!(delivery.failures[0], CallbackError::Failed { .. }));
        assert!(matches!(
            &delivery.failures[1],
            CallbackError::Panicked { message, .. } if message == "boundary exploded"
        ));
    }

    #[test]
    fn test_last_registration_wins() {
        let first = Arc::new(AtomicUsize::new(0));
        let second = Arc::new(AtomicUsize::new(0));
        let mut router = ErrorRouter::new();
        assert!(!router.set_error_callback("x", counting(&first)));
        assert!(router.set_error_callback("x", counting(&second)));

        router.prepare(Some("x"), LoadingError::application("e"), vec![]).deliver();
        assert_eq!(first.load(Ordering::SeqCst), 0);
        assert_eq!(second.load(Ordering::SeqCst), 1);

        router.clear();
        assert_eq!(router.per_operation_count(), 0);
        assert_eq!(router.boundary_count(), 0);
    }
}
