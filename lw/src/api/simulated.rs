//! In-process stand-in for the analysis service
//!
//! Classifies comments with a small keyword lexicon, keeps them in memory and
//! serves the same shapes as the HTTP backend. Latency and failure rate are
//! configurable so loading states, deadlines and error routing can be
//! exercised without a running service.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    AnalysisBackend, ApiError, CommentInput, CommentResponse, DashboardStats, HealthStatus, Sentiment, WordCloud,
};

/// Longest summary produced, in characters
const MAX_SUMMARY_LENGTH: usize = 50;

/// Comments shown in the dashboard's recent list
const RECENT_COMMENTS: usize = 10;

const POSITIVE_WORDS: &[&str] = &[
    "good", "great", "excellent", "love", "support", "helpful", "improve", "benefit", "clear", "happy",
];

const NEGATIVE_WORDS: &[&str] = &[
    "bad", "poor", "terrible", "hate", "oppose", "confusing", "harm", "worse", "unfair", "angry",
];

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "is", "are", "to", "of", "in", "for", "on", "it", "this", "that", "with",
];

/// Latency and failure knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedConfig {
    /// Delay before every response
    #[serde(rename = "latency-ms")]
    pub latency_ms: u64,

    /// Probability in [0, 1] that a call fails with `Unavailable`
    #[serde(rename = "failure-rate")]
    pub failure_rate: f64,
}

impl Default for SimulatedConfig {
    fn default() -> Self {
        Self {
            latency_ms: 150,
            failure_rate: 0.0,
        }
    }
}

/// Memory-backed analysis backend
#[derive(Debug)]
pub struct SimulatedBackend {
    latency: Duration,
    failure_rate: f64,
    comments: Mutex<Vec<CommentResponse>>,
    next_id: AtomicI64,
    calls: AtomicUsize,
}

impl SimulatedBackend {
    pub fn new(config: &SimulatedConfig) -> Self {
        debug!(?config, "SimulatedBackend::new: called");
        Self {
            latency: Duration::from_millis(config.latency_ms),
            failure_rate: config.failure_rate.clamp(0.0, 1.0),
            comments: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(1),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of calls served, including failed ones
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn comments(&self) -> MutexGuard<'_, Vec<CommentResponse>> {
        self.comments.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Simulate the network: count, wait, maybe fail
    async fn round_trip(&self, call: &str) -> Result<(), ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.failure_rate > 0.0 && rand::rng().random_bool(self.failure_rate) {
            debug!(%call, "SimulatedBackend::round_trip: injecting failure");
            return Err(ApiError::Unavailable(format!("simulated failure in {}", call)));
        }
        Ok(())
    }
}

/// Label and confidence from keyword hits
pub fn classify(text: &str) -> (Sentiment, f64) {
    let words = tokenize(text);
    let positive = words.iter().filter(|w| POSITIVE_WORDS.contains(&w.as_str())).count() as f64;
    let negative = words.iter().filter(|w| NEGATIVE_WORDS.contains(&w.as_str())).count() as f64;

    let sentiment = if positive > negative {
        Sentiment::Positive
    } else if negative > positive {
        Sentiment::Negative
    } else {
        Sentiment::Neutral
    };
    let score = (0.5 + 0.15 * (positive - negative).abs()).min(0.99);
    (sentiment, score)
}

/// First sentence, cut to `MAX_SUMMARY_LENGTH` characters
pub fn summarize(text: &str) -> String {
    let text = text.trim();
    let sentence = text.split_terminator(['.', '!', '?']).next().unwrap_or(text).trim();
    if sentence.chars().count() <= MAX_SUMMARY_LENGTH {
        return sentence.to_string();
    }
    let cut: String = sentence.chars().take(MAX_SUMMARY_LENGTH - 3).collect();
    format!("{}...", cut.trim_end())
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn percentage(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        (count as f64 / total as f64 * 1000.0).round() / 10.0
    }
}

#[async_trait]
impl AnalysisBackend for SimulatedBackend {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn submit_comment(&self, input: &CommentInput) -> Result<CommentResponse, ApiError> {
        debug!(stakeholder = %input.stakeholder_type, "SimulatedBackend::submit_comment: called");
        input.validate()?;
        self.round_trip("submit_comment").await?;

        let (sentiment, score) = classify(&input.raw_text);
        let now = Utc::now();
        let comment = CommentResponse {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            timestamp: now.to_rfc3339(),
            stakeholder_type: input.stakeholder_type.to_string(),
            raw_text: input.raw_text.clone(),
            sentiment_label: sentiment.to_string(),
            sentiment_score: score,
            summary: summarize(&input.raw_text),
            created_at: now.format("%Y-%m-%d %H:%M:%S").to_string(),
        };
        self.comments().push(comment.clone());
        Ok(comment)
    }

    async fn list_comments(&self, limit: u32, offset: u32) -> Result<Vec<CommentResponse>, ApiError> {
        debug!(limit, offset, "SimulatedBackend::list_comments: called");
        self.round_trip("list_comments").await?;
        Ok(self
            .comments()
            .iter()
            .rev()
            .skip(offset as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn dashboard(&self) -> Result<DashboardStats, ApiError> {
        debug!("SimulatedBackend::dashboard: called");
        self.round_trip("dashboard").await?;

        let comments = self.comments();
        let total = comments.len();
        let count = |s: Sentiment| comments.iter().filter(|c| c.sentiment() == Some(s)).count();
        Ok(DashboardStats {
            total_comments: total as u64,
            positive_percentage: percentage(count(Sentiment::Positive), total),
            neutral_percentage: percentage(count(Sentiment::Neutral), total),
            negative_percentage: percentage(count(Sentiment::Negative), total),
            recent_comments: comments.iter().rev().take(RECENT_COMMENTS).cloned().collect(),
        })
    }

    async fn wordcloud(&self, sentiment: Option<Sentiment>) -> Result<WordCloud, ApiError> {
        debug!(?sentiment, "SimulatedBackend::wordcloud: called");
        self.round_trip("wordcloud").await?;

        let mut frequencies: BTreeMap<String, usize> = BTreeMap::new();
        for comment in self
            .comments()
            .iter()
            .filter(|c| sentiment.is_none() || c.sentiment() == sentiment)
        {
            for word in tokenize(&comment.raw_text) {
                if word.len() > 2 && !STOP_WORDS.contains(&word.as_str()) {
                    *frequencies.entry(word).or_default() += 1;
                }
            }
        }

        if frequencies.is_empty() {
            return Err(ApiError::Api {
                status: 404,
                message: "No comments available for word cloud".to_string(),
            });
        }

        let mut ranked: Vec<(String, usize)> = frequencies.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        let body = ranked
            .iter()
            .take(100)
            .map(|(word, count)| format!("{} {}", word, count))
            .collect::<Vec<_>>()
            .join("\n");

        Ok(WordCloud {
            sentiment,
            content_type: "text/plain".to_string(),
            data: body.into_bytes(),
        })
    }

    async fn health(&self) -> Result<HealthStatus, ApiError> {
        debug!("SimulatedBackend::health: called");
        self.round_trip("health").await?;
        Ok(HealthStatus {
            status: "healthy".to_string(),
            timestamp: Some(Utc::now().to_rfc3339()),
            version: Some(env!("CARGO_PKG_VERSION").to_string()),
            error: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::StakeholderType;

    fn instant() -> SimulatedBackend {
        SimulatedBackend::new(&SimulatedConfig {
            latency_ms: 0,
            failure_rate: 0.0,
        })
    }

    async fn submit(backend: &SimulatedBackend, text: &str) -> CommentResponse {
        let input = CommentInput::new(StakeholderType::Citizen, text).unwrap();
        backend.submit_comment(&input).await.unwrap()
    }

    #[test]
    fn test_classify() {
        assert_eq!(classify("I love this great plan").0, Sentiment::Positive);
        assert_eq!(classify("Terrible and unfair policy").0, Sentiment::Negative);
        assert_eq!(classify("The meeting is on Tuesday").0, Sentiment::Neutral);
        assert!(classify("good good good good good good").1 <= 0.99);
    }

    #[test]
    fn test_summarize() {
        assert_eq!(summarize("Short one. Second sentence."), "Short one");
        let long = "word ".repeat(30);
        let summary = summarize(&long);
        assert!(summary.chars().count() <= MAX_SUMMARY_LENGTH);
        assert!(summary.ends_with("..."));
    }

    #[tokio::test]
    async fn test_submit_and_list_newest_first() {
        let backend = instant();
        let first = submit(&backend, "Great park").await;
        let second = submit(&backend, "Bad roads").await;
        assert_eq!(second.id, first.id + 1);

        let page = backend.list_comments(1, 0).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].id, second.id);
        let next = backend.list_comments(10, 1).await.unwrap();
        assert_eq!(next[0].id, first.id);
    }

    #[tokio::test]
    async fn test_dashboard_percentages() {
        let backend = instant();
        submit(&backend, "love it").await;
        submit(&backend, "hate it").await;
        submit(&backend, "it exists").await;
        submit(&backend, "great work").await;

        let stats = backend.dashboard().await.unwrap();
        assert_eq!(stats.total_comments, 4);
        assert_eq!(stats.positive_percentage, 50.0);
        assert_eq!(stats.negative_percentage, 25.0);
        assert_eq!(stats.neutral_percentage, 25.0);
        assert_eq!(stats.recent_comments.len(), 4);
    }

    #[tokio::test]
    async fn test_wordcloud_filters_by_sentiment() {
        let backend = instant();
        assert!(backend.wordcloud(None).await.is_err());

        submit(&backend, "love the library").await;
        submit(&backend, "hate the traffic").await;
        let cloud = backend.wordcloud(Some(Sentiment::Positive)).await.unwrap();
        let text = String::from_utf8(cloud.data).unwrap();
        assert!(text.contains("library"));
        assert!(!text.contains("traffic"));
        assert!(!text.contains("the "));
    }

    #[tokio::test]
    async fn test_failure_rate_one_always_fails() {
        let backend = SimulatedBackend::new(&SimulatedConfig {
            latency_ms: 0,
            failure_rate: 1.0,
        });
        let err = backend.health().await.unwrap_err();
        assert!(matches!(err, ApiError::Unavailable(_)));
        assert_eq!(backend.call_count(), 1);
    }
}
