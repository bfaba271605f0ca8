//! Sentiment dashboard backend client
//!
//! The dashboard's requests, issued through the loading coordinator.

use std::sync::Arc;

use tracing::debug;

pub mod client;
mod error;
mod http;
mod session;
mod simulated;
mod types;

pub use client::AnalysisBackend;
pub use error::ApiError;
pub use http::HttpBackend;
pub use session::{
    CHECK_HEALTH, DashboardSession, DashboardView, FETCH_COMMENTS, FETCH_DASHBOARD, FETCH_WORDCLOUD, SUBMIT_COMMENT,
};
pub use simulated::{SimulatedBackend, SimulatedConfig, classify, summarize};
pub use types::{
    CommentInput, CommentResponse, DashboardStats, HealthStatus, MAX_COMMENT_LENGTH, Sentiment, StakeholderType,
    WordCloud,
};

use crate::config::ApiConfig;

/// Create a backend: the in-process simulation, or HTTP against `config.base_url`
pub fn create_backend(config: &ApiConfig, simulate: bool) -> Result<Arc<dyn AnalysisBackend>, ApiError> {
    debug!(simulate, base_url = %config.base_url, "create_backend: called");
    if simulate {
        debug!("create_backend: creating simulated backend");
        Ok(Arc::new(SimulatedBackend::new(&config.simulated)))
    } else {
        debug!("create_backend: creating HTTP backend");
        Ok(Arc::new(HttpBackend::from_config(config)?))
    }
}
