//! Loading-state coordination
//!
//! Tracks which named async operations are in flight, enforces a deadline on
//! each, and routes their failures to per-operation and global subscribers.
//!
//! - [`Coordinator`] is the only type most callers need
//! - [`LoadingOptions`] configures a single start
//! - [`LoadingEvent`] streams transitions to presentation adapters

mod config;
mod coordinator;
mod error;
mod events;
mod history;
mod metrics;
mod options;
mod registry;
mod router;
mod timeout;

pub use config::{CoordinatorConfig, DEFAULT_TIMEOUT_MS};
pub use coordinator::{AMBIENT_OPERATION, CleanupReport, Coordinator, DebugInfo};
pub use error::{CallbackError, CoordinatorError, LoadingError};
pub use events::{EventBus, LoadingEvent};
pub use history::{HistoryAction, HistoryEntry, HistoryRing};
pub use metrics::{MetricsSnapshot, OperationMetrics, OperationMetricsRecorder};
pub use options::{CleanupCallback, ErrorCallback, LoadingOptions, TimeoutCallback};
pub use registry::{Operation, OperationInfo, OperationRegistry};
pub use router::{Delivery, Dispatch, ErrorRecord, ErrorRouter, LoadingContext, session_id};
pub use timeout::TimeoutSupervisor;
