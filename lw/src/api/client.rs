//! AnalysisBackend trait definition

use async_trait::async_trait;

use super::{ApiError, CommentInput, CommentResponse, DashboardStats, HealthStatus, Sentiment, WordCloud};

/// Transport to the sentiment analysis backend
///
/// Every call is independent; loading state is tracked by the caller, not
/// by the backend.
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    /// Short label for logs and the CLI banner
    fn name(&self) -> &str;

    /// Submit a comment and receive its analysis
    async fn submit_comment(&self, input: &CommentInput) -> Result<CommentResponse, ApiError>;

    /// Page through stored comments, newest first
    async fn list_comments(&self, limit: u32, offset: u32) -> Result<Vec<CommentResponse>, ApiError>;

    async fn dashboard(&self) -> Result<DashboardStats, ApiError>;

    /// Render a word cloud, optionally restricted to one sentiment
    async fn wordcloud(&self, sentiment: Option<Sentiment>) -> Result<WordCloud, ApiError>;

    async fn health(&self) -> Result<HealthStatus, ApiError>;
}
