//! LoadingStateCoordinator - the public surface of the loading layer
//!
//! Composes the registry, the timeout supervisor and the error router behind
//! one lock. All mutations are synchronous; the coordinator itself never
//! suspends. Callbacks (error, boundary, timeout, cleanup) are always invoked
//! with the lock released, so a callback may call back into the coordinator.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::config::CoordinatorConfig;
use super::error::{CoordinatorError, LoadingError};
use super::events::{EventBus, LoadingEvent};
use super::history::{HistoryAction, HistoryEntry, HistoryRing};
use super::metrics::{MetricsSnapshot, OperationMetricsRecorder};
use super::options::{CleanupCallback, LoadingOptions};
use super::registry::{OperationInfo, OperationRegistry};
use super::router::{ErrorRecord, ErrorRouter, isolate, session_id};
use super::timeout::TimeoutSupervisor;

/// History label for errors routed without an owning operation
pub const AMBIENT_OPERATION: &str = "<ambient>";

/// Read-only diagnostic view, never used for control decisions
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct DebugInfo {
    pub operation_count: usize,
    pub debug_mode: bool,
    pub session_id: String,
    pub active_operations: Vec<String>,
    pub armed_timers: usize,
    pub error_callbacks: usize,
    pub boundary_callbacks: usize,
    pub cleanup_callbacks: usize,
    /// Retained history, oldest first
    pub history: Vec<HistoryEntry>,
}

/// What a `cleanup()` pass did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct CleanupReport {
    pub operations_stopped: usize,
    pub callbacks_run: usize,
    pub callback_failures: usize,
}

/// Mutable state, only touched under `Inner::state`
struct State {
    registry: OperationRegistry,
    timers: TimeoutSupervisor,
    router: ErrorRouter,
    cleanup_callbacks: Vec<CleanupCallback>,
    history: HistoryRing,
    metrics: OperationMetricsRecorder,
}

impl State {
    fn active_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registry.active_names().map(str::to_string).collect();
        names.sort();
        names
    }
}

struct Inner {
    config: CoordinatorConfig,
    state: Mutex<State>,
    events: EventBus,
}

/// Coordinates named loading operations for one running app
///
/// Construct once at startup and pass clones to every consumer; clones share
/// the same registry.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

impl Coordinator {
    pub fn new(config: CoordinatorConfig) -> Self {
        debug!(?config, "Coordinator::new: called");
        let state = State {
            registry: OperationRegistry::new(),
            timers: TimeoutSupervisor::new(),
            router: ErrorRouter::new(),
            cleanup_callbacks: Vec::new(),
            history: HistoryRing::new(config.history_capacity),
            metrics: OperationMetricsRecorder::new(config.metrics_window, config.slow_operation()),
        };
        let events = EventBus::new(config.event_capacity);
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(state),
                events,
            }),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    pub fn session_id(&self) -> &'static str {
        session_id()
    }

    // === Internals ===

    /// Lock the state, recovering it if a previous holder panicked
    fn lock(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, state: &mut State, entry: HistoryEntry) {
        if self.inner.config.debug_mode {
            info!(operation = %entry.operation, action = %entry.action, error = ?entry.error, "Loading transition");
        } else {
            debug!(operation = %entry.operation, action = %entry.action, "Loading transition");
        }
        state.history.push(entry);
    }

    fn emit(&self, event: LoadingEvent) {
        self.inner.events.emit(event);
    }

    /// Returns the generation of the new start with the event to emit
    fn start_locked(&self, state: &mut State, name: &str, options: LoadingOptions) -> (u64, LoadingEvent) {
        let requested = options.timeout.unwrap_or_else(|| self.inner.config.default_timeout());
        // Zero, or too far out to be represented, means no deadline
        let timeout = match requested {
            t if t.is_zero() => None,
            t if Instant::now().checked_add(t).is_none() => {
                warn!(%name, timeout = ?t, "Deadline out of range, operation has no deadline");
                None
            }
            t => Some(t),
        };

        let (generation, replaced) =
            state
                .registry
                .start(name, timeout, options.metadata_bag(), options.on_timeout.clone());

        let restarted = replaced.is_some();
        if restarted {
            warn!(%name, "Operation restarted while loading, previous start time discarded");
            state.timers.cancel(name);
        }

        if let Some(timeout) = timeout {
            let weak: Weak<Inner> = Arc::downgrade(&self.inner);
            let operation = name.to_string();
            state.timers.schedule(name, generation, timeout, move || {
                if let Some(inner) = weak.upgrade() {
                    Coordinator { inner }.expire(&operation, generation);
                }
            });
        }

        state.metrics.record_start(name);
        self.record(state, HistoryEntry::new(name, HistoryAction::Start));

        let event = LoadingEvent::Started {
            operation: name.to_string(),
            timeout_ms: timeout.map(|t| t.as_millis() as u64),
            restarted,
        };
        (generation, event)
    }

    /// Deadline path: runs on the timer task
    fn expire(&self, name: &str, generation: u64) {
        let (operation, timeout_ms) = {
            let mut state = self.lock();
            // Stopped or restarted since this timer was armed
            let Some(operation) = state.registry.stop_generation(name, generation) else {
                return;
            };
            state.timers.disarm(name, generation);
            state.metrics.record_timeout(name);
            let timeout_ms = operation.timeout.map(|t| t.as_millis() as u64).unwrap_or_default();
            (operation, timeout_ms)
        };

        let elapsed_ms = operation.elapsed().as_millis() as u64;
        warn!(%name, timeout_ms, elapsed_ms, "Operation timed out");
        let error = LoadingError::Timeout {
            operation: name.to_string(),
            timeout_ms,
            elapsed_ms,
        };

        self.route(Some(name), error.clone());
        if let Some(on_timeout) = &operation.on_timeout {
            let _ = isolate("timeout", || on_timeout(&error, name));
        }

        {
            let mut state = self.lock();
            self.record(&mut state, HistoryEntry::new(name, HistoryAction::Timeout));
        }
        self.emit(LoadingEvent::TimedOut {
            operation: name.to_string(),
            timeout_ms,
            elapsed_ms,
        });
    }

    /// Enrich, fan out and record an error; never fails
    fn route(&self, operation: Option<&str>, error: LoadingError) -> ErrorRecord {
        let dispatch = {
            let state = self.lock();
            state.router.prepare(operation, error, state.active_names())
        };

        let delivery = dispatch.deliver();
        let message = delivery.record.message();

        {
            let mut state = self.lock();
            let entry = HistoryEntry::error(operation.unwrap_or(AMBIENT_OPERATION), message.clone());
            self.record(&mut state, entry);
        }
        self.emit(LoadingEvent::Errored {
            operation: operation.map(str::to_string),
            message,
        });

        delivery.record
    }

    // === Lifecycle ===

    /// Mark `name` as loading and arm its deadline
    ///
    /// Re-starting an active name overwrites the entry (the original start
    /// time is lost) and re-arms the deadline. Must be called from within a
    /// tokio runtime for the deadline to be armed.
    pub fn start_loading(&self, name: &str, options: LoadingOptions) {
        debug!(%name, ?options, "Coordinator::start_loading: called");
        self.start_generation(name, options);
    }

    fn start_generation(&self, name: &str, options: LoadingOptions) -> u64 {
        let (generation, event) = {
            let mut state = self.lock();
            self.start_locked(&mut state, name, options)
        };
        self.emit(event);
        generation
    }

    /// Like `start_loading`, but refuses to overwrite an active operation
    pub fn start_loading_strict(&self, name: &str, options: LoadingOptions) -> Result<(), CoordinatorError> {
        debug!(%name, "Coordinator::start_loading_strict: called");
        let event = {
            let mut state = self.lock();
            if state.registry.is_loading(name) {
                return Err(CoordinatorError::AlreadyLoading(name.to_string()));
            }
            self.start_locked(&mut state, name, options).1
        };
        self.emit(event);
        Ok(())
    }

    /// Stop tracking `name`; safe to call when not loading
    ///
    /// Once this returns, no deadline armed for the stopped start will fire.
    pub fn stop_loading(&self, name: &str) {
        debug!(%name, "Coordinator::stop_loading: called");
        self.finish(name, None);
    }

    /// Stop `name`, or only the given start of it when `generation` is set
    fn finish(&self, name: &str, generation: Option<u64>) {
        let elapsed_ms = {
            let mut state = self.lock();
            let stopped = match generation {
                Some(generation) => state.registry.stop_generation(name, generation),
                None => state.registry.stop(name),
            };
            let Some(operation) = stopped else {
                debug!(%name, ?generation, "Coordinator::finish: not loading");
                return;
            };
            state.timers.cancel(name);
            let elapsed = operation.elapsed();
            state.metrics.record_completion(name, elapsed);
            self.record(&mut state, HistoryEntry::new(name, HistoryAction::Stop));
            elapsed.as_millis() as u64
        };
        self.emit(LoadingEvent::Stopped {
            operation: name.to_string(),
            elapsed_ms,
        });
    }

    /// Route an error through the enrichment and fan-out pipeline
    ///
    /// Notifies the callback registered for `name` (if any) and every error
    /// boundary callback. Callback failures are logged, never propagated.
    pub fn handle_loading_error(&self, name: &str, error: LoadingError) -> ErrorRecord {
        debug!(%name, %error, "Coordinator::handle_loading_error: called");
        self.lock().metrics.record_error(name);
        self.route(Some(name), error)
    }

    /// Route an error that belongs to no operation; only boundary callbacks see it
    pub fn handle_ambient_error(&self, error: LoadingError) -> ErrorRecord {
        debug!(%error, "Coordinator::handle_ambient_error: called");
        self.route(None, error)
    }

    /// Cancel every deadline and clear the registry
    ///
    /// Returns the number of operations swept.
    pub fn force_stop_all_loading(&self, reason: &str) -> usize {
        debug!(%reason, "Coordinator::force_stop_all_loading: called");
        let swept = {
            let mut state = self.lock();
            let timers = state.timers.cancel_all();
            let mut operations = state.registry.drain();
            operations.sort_by(|a, b| a.name.cmp(&b.name));
            for operation in &operations {
                self.record(&mut state, HistoryEntry::new(&operation.name, HistoryAction::ForceStop));
            }
            if !operations.is_empty() || timers > 0 {
                info!(%reason, operations = operations.len(), timers, "Force-stopped all loading operations");
            }
            operations.into_iter().map(|op| op.name).collect::<Vec<_>>()
        };

        for operation in &swept {
            self.emit(LoadingEvent::ForceStopped {
                operation: operation.clone(),
                reason: reason.to_string(),
            });
        }
        swept.len()
    }

    /// Tear down: force-stop everything, run cleanup callbacks, clear registries
    ///
    /// Safe to call more than once.
    pub fn cleanup(&self) -> CleanupReport {
        debug!("Coordinator::cleanup: called");
        let operations_stopped = self.force_stop_all_loading("cleanup");

        let callbacks = std::mem::take(&mut self.lock().cleanup_callbacks);
        let mut callback_failures = 0;
        for callback in &callbacks {
            if isolate("cleanup", || callback()).is_err() {
                callback_failures += 1;
            }
        }

        {
            let mut state = self.lock();
            state.router.clear();
            state.cleanup_callbacks.clear();
            state.history.clear();
            state.metrics.clear();
        }

        let report = CleanupReport {
            operations_stopped,
            callbacks_run: callbacks.len(),
            callback_failures,
        };
        info!(?report, "Loading coordinator cleaned up");
        self.emit(LoadingEvent::CleanedUp {
            callbacks_run: report.callbacks_run,
        });
        report
    }

    // === Registration ===

    /// Register the error callback for `name`; last registration wins
    pub fn set_error_callback<F>(&self, name: &str, callback: F)
    where
        F: Fn(&ErrorRecord) -> eyre::Result<()> + Send + Sync + 'static,
    {
        if self.lock().router.set_error_callback(name, Arc::new(callback)) {
            debug!(%name, "Coordinator::set_error_callback: replaced existing callback");
        }
    }

    pub fn remove_error_callback(&self, name: &str) -> bool {
        self.lock().router.remove_error_callback(name)
    }

    /// Register a global subscriber notified of every routed error
    pub fn add_error_boundary_callback<F>(&self, callback: F)
    where
        F: Fn(&ErrorRecord) -> eyre::Result<()> + Send + Sync + 'static,
    {
        self.lock().router.add_boundary_callback(Arc::new(callback));
    }

    /// Register a callback run once by the next `cleanup()`
    pub fn add_cleanup_callback<F>(&self, callback: F)
    where
        F: Fn() -> eyre::Result<()> + Send + Sync + 'static,
    {
        self.lock().cleanup_callbacks.push(Arc::new(callback));
    }

    // === Queries ===

    pub fn is_loading(&self, name: &str) -> bool {
        self.lock().registry.is_loading(name)
    }

    pub fn active_count(&self) -> usize {
        self.lock().registry.count()
    }

    pub fn is_idle(&self) -> bool {
        self.active_count() == 0
    }

    /// Names of live operations, sorted
    pub fn active_names(&self) -> Vec<String> {
        self.lock().active_names()
    }

    pub fn get_active_operations(&self) -> BTreeMap<String, OperationInfo> {
        self.lock()
            .registry
            .iter()
            .map(|op| (op.name.clone(), op.info()))
            .collect()
    }

    pub fn get_debug_info(&self) -> DebugInfo {
        let state = self.lock();
        DebugInfo {
            operation_count: state.registry.count(),
            debug_mode: self.inner.config.debug_mode,
            session_id: session_id().to_string(),
            active_operations: state.active_names(),
            armed_timers: state.timers.count(),
            error_callbacks: state.router.per_operation_count(),
            boundary_callbacks: state.router.boundary_count(),
            cleanup_callbacks: state.cleanup_callbacks.len(),
            history: state.history.entries(),
        }
    }

    pub fn history(&self) -> Vec<HistoryEntry> {
        self.lock().history.entries()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.lock().metrics.snapshot()
    }

    /// Live stream of transitions for presentation adapters
    pub fn subscribe(&self) -> broadcast::Receiver<LoadingEvent> {
        self.inner.events.subscribe()
    }

    // === Wrapping helpers ===

    /// Run `fut` as operation `name`
    ///
    /// The operation is stopped exactly once when the future settles or is
    /// dropped. Failures are routed before being returned unchanged. A
    /// deadline only stops tracking; the future itself keeps running.
    pub async fn with_loading<T, E, Fut>(&self, name: &str, fut: Fut, options: LoadingOptions) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        debug!(%name, "Coordinator::with_loading: called");
        let _guard = self.guard(name, options);
        let result = fut.await;
        if let Err(e) = &result {
            self.handle_loading_error(name, LoadingError::application(e));
        }
        result
    }

    /// Run `fut` as operation `name`, swallowing failures after routing them
    ///
    /// `options.on_error` receives the routed record; `options.on_timeout`
    /// fires if the deadline elapses first.
    pub async fn with_error_handling<T, E, Fut>(&self, name: &str, fut: Fut, options: LoadingOptions) -> Option<T>
    where
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        debug!(%name, "Coordinator::with_error_handling: called");
        let on_error = options.on_error.clone();
        let _guard = self.guard(name, options);
        match fut.await {
            Ok(value) => Some(value),
            Err(e) => {
                let record = self.handle_loading_error(name, LoadingError::application(&e));
                if let Some(on_error) = on_error {
                    let _ = isolate("on-error", || on_error(&record));
                }
                None
            }
        }
    }

    /// Bind `factory` to operation `name` as a reusable handler
    ///
    /// Each invocation builds a fresh future and wraps it like `with_loading`.
    pub fn create_loading_handler<T, E, F, Fut>(
        &self,
        name: impl Into<String>,
        factory: F,
        options: LoadingOptions,
    ) -> impl Fn() -> BoxFuture<'static, Result<T, E>> + Send + Sync + 'static
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let coordinator = self.clone();
        let name = name.into();
        move || {
            let coordinator = coordinator.clone();
            let name = name.clone();
            let options = options.clone();
            let fut = factory();
            async move { coordinator.with_loading(&name, fut, options).await }.boxed()
        }
    }

    /// Like `create_loading_handler`, for handlers that receive an event value
    pub fn create_event_handler<Ev, T, E, F, Fut>(
        &self,
        name: impl Into<String>,
        factory: F,
        options: LoadingOptions,
    ) -> impl Fn(Ev) -> BoxFuture<'static, Result<T, E>> + Send + Sync + 'static
    where
        F: Fn(Ev) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let coordinator = self.clone();
        let name = name.into();
        move |event| {
            let coordinator = coordinator.clone();
            let name = name.clone();
            let options = options.clone();
            let fut = factory(event);
            async move { coordinator.with_loading(&name, fut, options).await }.boxed()
        }
    }

    fn guard<'a>(&'a self, name: &'a str, options: LoadingOptions) -> LoadingGuard<'a> {
        let generation = self.start_generation(name, options);
        LoadingGuard {
            coordinator: self,
            name,
            generation,
        }
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new(CoordinatorConfig::default())
    }
}

impl fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coordinator")
            .field("config", &self.inner.config)
            .field("active", &self.active_names())
            .finish()
    }
}

/// Stops its own start of an operation when dropped
///
/// A later restart of the same name is left running.
struct LoadingGuard<'a> {
    coordinator: &'a Coordinator,
    name: &'a str,
    generation: u64,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.coordinator.finish(self.name, Some(self.generation));
    }
}
