//! Dashboard calls wrapped in loading operations
//!
//! Each backend call runs under a fixed operation name so that buttons,
//! overlays and the error boundary can key off it. Deadlines come from the
//! configured performance targets scaled by the deadline multiplier.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use super::{
    AnalysisBackend, ApiError, CommentInput, CommentResponse, DashboardStats, HealthStatus, Sentiment, WordCloud,
};
use crate::config::ApiConfig;
use crate::loading::{Coordinator, LoadingOptions};

pub const SUBMIT_COMMENT: &str = "submitComment";
pub const FETCH_COMMENTS: &str = "fetchComments";
pub const FETCH_DASHBOARD: &str = "fetchDashboard";
pub const FETCH_WORDCLOUD: &str = "fetchWordcloud";
pub const CHECK_HEALTH: &str = "checkHealth";

/// Everything the dashboard page loads at once
#[derive(Debug, Clone, Default, Serialize)]
pub struct DashboardView {
    pub stats: Option<DashboardStats>,
    pub comments: Option<Vec<CommentResponse>>,
    /// Size of the rendered word cloud, if one was produced
    pub wordcloud_bytes: Option<usize>,
}

/// A backend bound to a coordinator
#[derive(Clone)]
pub struct DashboardSession {
    coordinator: Coordinator,
    backend: Arc<dyn AnalysisBackend>,
    config: ApiConfig,
}

impl DashboardSession {
    pub fn new(coordinator: Coordinator, backend: Arc<dyn AnalysisBackend>, config: ApiConfig) -> Self {
        debug!(backend = backend.name(), "DashboardSession::new: called");
        Self {
            coordinator,
            backend,
            config,
        }
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Loading deadline for an operation
    pub fn deadline(&self, operation: &str) -> Duration {
        let targets = &self.config.targets;
        let target_ms = match operation {
            SUBMIT_COMMENT => targets.comment_ms,
            FETCH_DASHBOARD | FETCH_COMMENTS => targets.dashboard_ms,
            FETCH_WORDCLOUD => targets.wordcloud_ms,
            _ => targets.default_ms,
        };
        Duration::from_millis((target_ms as f64 * self.config.deadline_multiplier).round() as u64)
    }

    fn options(&self, operation: &str, user_action: &str) -> LoadingOptions {
        LoadingOptions::new()
            .timeout(self.deadline(operation))
            .user_action(user_action)
            .meta("backend", self.backend.name())
    }

    /// Validate and submit a comment
    ///
    /// Invalid input is rejected before any operation starts.
    pub async fn submit_comment(&self, input: &CommentInput) -> Result<CommentResponse, ApiError> {
        debug!(stakeholder = %input.stakeholder_type, "DashboardSession::submit_comment: called");
        input.validate()?;
        self.coordinator
            .with_loading(
                SUBMIT_COMMENT,
                self.backend.submit_comment(input),
                self.options(SUBMIT_COMMENT, "Submit comment"),
            )
            .await
    }

    pub async fn list_comments(&self, limit: u32, offset: u32) -> Result<Vec<CommentResponse>, ApiError> {
        debug!(limit, offset, "DashboardSession::list_comments: called");
        let options = self
            .options(FETCH_COMMENTS, "Load comments")
            .meta("limit", limit)
            .meta("offset", offset);
        self.coordinator
            .with_loading(FETCH_COMMENTS, self.backend.list_comments(limit, offset), options)
            .await
    }

    pub async fn dashboard(&self) -> Result<DashboardStats, ApiError> {
        debug!("DashboardSession::dashboard: called");
        self.coordinator
            .with_loading(
                FETCH_DASHBOARD,
                self.backend.dashboard(),
                self.options(FETCH_DASHBOARD, "Open dashboard"),
            )
            .await
    }

    pub async fn wordcloud(&self, sentiment: Option<Sentiment>) -> Result<WordCloud, ApiError> {
        debug!(?sentiment, "DashboardSession::wordcloud: called");
        let mut options = self.options(FETCH_WORDCLOUD, "Generate word cloud");
        if let Some(s) = sentiment {
            options = options.meta("sentiment", s.as_str());
        }
        self.coordinator
            .with_loading(FETCH_WORDCLOUD, self.backend.wordcloud(sentiment), options)
            .await
    }

    pub async fn health(&self) -> Result<HealthStatus, ApiError> {
        debug!("DashboardSession::health: called");
        self.coordinator
            .with_loading(
                CHECK_HEALTH,
                self.backend.health(),
                self.options(CHECK_HEALTH, "Check backend"),
            )
            .await
    }

    /// Load stats, the latest comments and the word cloud concurrently
    ///
    /// Failures are routed and leave the corresponding field empty.
    pub async fn refresh(&self, comment_limit: u32) -> DashboardView {
        debug!(comment_limit, "DashboardSession::refresh: called");
        let (stats, comments, wordcloud) = tokio::join!(
            self.coordinator.with_error_handling(
                FETCH_DASHBOARD,
                self.backend.dashboard(),
                self.options(FETCH_DASHBOARD, "Refresh dashboard"),
            ),
            self.coordinator.with_error_handling(
                FETCH_COMMENTS,
                self.backend.list_comments(comment_limit, 0),
                self.options(FETCH_COMMENTS, "Refresh dashboard"),
            ),
            self.coordinator.with_error_handling(
                FETCH_WORDCLOUD,
                self.backend.wordcloud(None),
                self.options(FETCH_WORDCLOUD, "Refresh dashboard"),
            ),
        );
        DashboardView {
            stats,
            comments,
            wordcloud_bytes: wordcloud.map(|w| w.data.len()),
        }
    }
}
