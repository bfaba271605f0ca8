//! HTTP backend implementation
//!
//! Talks to the FastAPI analysis service over JSON. Idempotent reads are
//! retried with exponential backoff on transient failures; comment
//! submission is sent once.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use tracing::{debug, warn};

use super::{
    AnalysisBackend, ApiError, CommentInput, CommentResponse, DashboardStats, HealthStatus, Sentiment, WordCloud,
};
use crate::config::ApiConfig;

/// Initial backoff delay for retries
const INITIAL_BACKOFF_MS: u64 = 250;

/// Check if an HTTP status code is retryable
fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429 | 500 | 502 | 503 | 504)
}

/// Pull FastAPI's `detail` out of an error body, falling back to the raw text
fn error_detail(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

/// reqwest-based analysis backend
pub struct HttpBackend {
    base_url: String,
    http: Client,
    max_retries: u32,
}

impl HttpBackend {
    pub fn from_config(config: &ApiConfig) -> Result<Self, ApiError> {
        debug!(?config, "HttpBackend::from_config: called");
        let http = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(ApiError::Network)?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            http,
            max_retries: config.max_retries,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Send a request, retrying transient failures when `retries` allows
    async fn send<F>(&self, build: F, retries: u32) -> Result<Response, ApiError>
    where
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        let mut last_error = None;
        for attempt in 0..=retries {
            if attempt > 0 {
                let backoff = INITIAL_BACKOFF_MS * 2u64.pow(attempt - 1);
                warn!(attempt, backoff_ms = backoff, "send: retrying after transient error");
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }

            let response = match build().send().await {
                Ok(r) => r,
                Err(e) => {
                    debug!(attempt, error = %e, "send: network error");
                    last_error = Some(ApiError::Network(e));
                    continue;
                }
            };

            let status = response.status().as_u16();
            if is_retryable_status(status) && attempt < retries {
                let text = response.text().await.unwrap_or_default();
                debug!(attempt, status, "send: retryable error");
                last_error = Some(ApiError::Api {
                    status,
                    message: error_detail(&text),
                });
                continue;
            }

            if !response.status().is_success() {
                debug!(%status, "send: API error");
                let text = response.text().await.unwrap_or_default();
                return Err(ApiError::Api {
                    status,
                    message: error_detail(&text),
                });
            }

            return Ok(response);
        }

        Err(last_error.unwrap_or_else(|| ApiError::InvalidResponse("Max retries exceeded".to_string())))
    }
}

#[async_trait]
impl AnalysisBackend for HttpBackend {
    fn name(&self) -> &str {
        &self.base_url
    }

    async fn submit_comment(&self, input: &CommentInput) -> Result<CommentResponse, ApiError> {
        debug!(stakeholder = %input.stakeholder_type, "HttpBackend::submit_comment: called");
        input.validate()?;
        let url = self.endpoint("/api/comments");
        let response = self.send(|| self.http.post(&url).json(input), 0).await?;
        Ok(response.json().await?)
    }

    async fn list_comments(&self, limit: u32, offset: u32) -> Result<Vec<CommentResponse>, ApiError> {
        debug!(limit, offset, "HttpBackend::list_comments: called");
        let url = self.endpoint("/api/comments");
        let response = self
            .send(
                || self.http.get(&url).query(&[("limit", limit), ("offset", offset)]),
                self.max_retries,
            )
            .await?;
        Ok(response.json().await?)
    }

    async fn dashboard(&self) -> Result<DashboardStats, ApiError> {
        debug!("HttpBackend::dashboard: called");
        let url = self.endpoint("/api/dashboard");
        let response = self.send(|| self.http.get(&url), self.max_retries).await?;
        Ok(response.json().await?)
    }

    async fn wordcloud(&self, sentiment: Option<Sentiment>) -> Result<WordCloud, ApiError> {
        debug!(?sentiment, "HttpBackend::wordcloud: called");
        let url = self.endpoint("/api/wordcloud");
        let response = self
            .send(
                || {
                    let request = self.http.get(&url);
                    match sentiment {
                        Some(s) => request.query(&[("sentiment", s.as_str())]),
                        None => request,
                    }
                },
                self.max_retries,
            )
            .await?;

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = response.bytes().await?.to_vec();
        debug!(%content_type, bytes = data.len(), "HttpBackend::wordcloud: received");

        Ok(WordCloud {
            sentiment,
            content_type,
            data,
        })
    }

    async fn health(&self) -> Result<HealthStatus, ApiError> {
        debug!("HttpBackend::health: called");
        let url = self.endpoint("/health");
        let response = self.send(|| self.http.get(&url), 0).await?;
        Ok(response.json().await?)
    }
}
