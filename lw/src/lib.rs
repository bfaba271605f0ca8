//! Loadwatch - loading-state coordination for async UI operations
//!
//! Loadwatch tracks which named asynchronous operations are in flight, puts a
//! deadline on each one, and funnels their failures to per-operation and
//! global error subscribers. It backs a sentiment-analysis dashboard whose
//! requests are issued through it.
//!
//! # Core Concepts
//!
//! - **One entry per name**: an operation name is either loading or not
//! - **Deadlines end tracking, not work**: a timed-out request keeps running
//! - **Callbacks are isolated**: a failing subscriber never blocks the others
//! - **Explicit handle**: a [`loading::Coordinator`] is created once and cloned
//!
//! # Modules
//!
//! - [`loading`] - Coordinator, registry, deadlines and error routing
//! - [`boundary`] - Headless error boundary over a coordinator
//! - [`api`] - Dashboard backend client and wrapped calls
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod api;
pub mod boundary;
pub mod cli;
pub mod config;
pub mod loading;

pub use boundary::ErrorBoundary;
pub use config::Config;
pub use loading::{Coordinator, CoordinatorConfig, LoadingError, LoadingOptions};
