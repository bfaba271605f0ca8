//! Loading error types

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors routed through the coordinator
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum LoadingError {
    #[error("Operation '{operation}' timed out after {elapsed_ms}ms (limit {timeout_ms}ms)")]
    Timeout {
        operation: String,
        #[serde(rename = "timeout-ms")]
        timeout_ms: u64,
        #[serde(rename = "elapsed-ms")]
        elapsed_ms: u64,
    },

    #[error("{message}")]
    Application { message: String },
}

impl LoadingError {
    /// Wrap any displayable failure as an application error
    pub fn application(err: impl fmt::Display) -> Self {
        LoadingError::Application {
            message: err.to_string(),
        }
    }

    /// Check if this error was synthesized by a deadline
    pub fn is_timeout(&self) -> bool {
        matches!(self, LoadingError::Timeout { .. })
    }

    /// Short kind label used in history and logs
    pub fn kind(&self) -> &'static str {
        match self {
            LoadingError::Timeout { .. } => "timeout",
            LoadingError::Application { .. } => "application",
        }
    }
}

/// A failure raised inside a registered callback
///
/// Always caught at the call site and logged; never rethrown.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallbackError {
    #[error("{callback} callback failed: {message}")]
    Failed { callback: String, message: String },

    #[error("{callback} callback panicked: {message}")]
    Panicked { callback: String, message: String },
}

impl CallbackError {
    /// Label of the callback that failed
    pub fn callback(&self) -> &str {
        match self {
            CallbackError::Failed { callback, .. } | CallbackError::Panicked { callback, .. } => callback,
        }
    }
}

/// Errors returned by the strict coordinator entry points
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinatorError {
    #[error("Operation '{0}' is already loading")]
    AlreadyLoading(String),
}
