//! Headless error boundary
//!
//! Subscribes to a [`Coordinator`]'s routed errors and keeps the state a
//! presentation surface would render: the latest unrecovered error, how many
//! failures happened in a row, and whether a full reset is on offer.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::loading::{CleanupReport, Coordinator, ErrorRecord, LoadingOptions};

/// Consecutive failures before `can_reset` turns true
pub const DEFAULT_MAX_RETRIES: u32 = 3;

#[derive(Debug, Default)]
struct Surface {
    error: Option<ErrorRecord>,
    failures: u32,
}

/// Global error surface attached to one coordinator
pub struct ErrorBoundary {
    coordinator: Coordinator,
    surface: Arc<Mutex<Surface>>,
    max_retries: u32,
}

impl ErrorBoundary {
    /// Attach a boundary to `coordinator`
    pub fn attach(coordinator: &Coordinator) -> Self {
        Self::with_max_retries(coordinator, DEFAULT_MAX_RETRIES)
    }

    pub fn with_max_retries(coordinator: &Coordinator, max_retries: u32) -> Self {
        debug!(max_retries, "ErrorBoundary::with_max_retries: called");
        let boundary = Self {
            coordinator: coordinator.clone(),
            surface: Arc::new(Mutex::new(Surface::default())),
            max_retries,
        };
        boundary.subscribe();
        boundary
    }

    fn subscribe(&self) {
        let surface = Arc::clone(&self.surface);
        self.coordinator.add_error_boundary_callback(move |record| {
            let mut surface = surface.lock().unwrap_or_else(PoisonError::into_inner);
            surface.failures += 1;
            surface.error = Some(record.clone());
            Ok(())
        });
    }

    fn surface(&self) -> MutexGuard<'_, Surface> {
        self.surface.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Latest unrecovered error, if the surface is showing one
    pub fn error(&self) -> Option<ErrorRecord> {
        self.surface().error.clone()
    }

    pub fn has_error(&self) -> bool {
        self.surface().error.is_some()
    }

    /// Failures routed since the last successful retry or reset
    pub fn failure_count(&self) -> u32 {
        self.surface().failures
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Whether the failure streak is long enough to offer a full reset
    pub fn can_reset(&self) -> bool {
        self.failure_count() >= self.max_retries
    }

    /// Hide the error; coordinator state is left alone
    pub fn dismiss(&self) {
        debug!("ErrorBoundary::dismiss: called");
        self.surface().error = None;
    }

    /// Clear the surface and re-run `action` as operation `name`
    ///
    /// A failure lands back on the surface through the coordinator's routing;
    /// a success ends the failure streak.
    pub async fn retry<T, E, Fut>(&self, name: &str, action: Fut) -> Option<T>
    where
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        debug!(%name, failures = self.failure_count(), "ErrorBoundary::retry: called");
        self.dismiss();
        let value = self
            .coordinator
            .with_error_handling(name, action, LoadingOptions::new().user_action("retry"))
            .await;
        if value.is_some() {
            self.surface().failures = 0;
        }
        value
    }

    /// Tear the coordinator down and start over with a clean surface
    pub fn reset(&self) -> CleanupReport {
        info!(failures = self.failure_count(), "Error boundary reset");
        let report = self.coordinator.cleanup();
        *self.surface() = Surface::default();
        // cleanup() dropped every boundary callback, including ours
        self.subscribe();
        report
    }
}

impl fmt::Debug for ErrorBoundary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let surface = self.surface();
        f.debug_struct("ErrorBoundary")
            .field("error", &surface.error.as_ref().map(ErrorRecord::message))
            .field("failures", &surface.failures)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}
