//! Request and response shapes of the sentiment analysis backend

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ApiError;

/// Longest comment the backend accepts, in characters
pub const MAX_COMMENT_LENGTH: usize = 300;

/// Who submitted a comment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StakeholderType {
    Citizen,
    Business,
    Ngo,
    Academic,
}

impl StakeholderType {
    pub const ALL: [StakeholderType; 4] = [
        StakeholderType::Citizen,
        StakeholderType::Business,
        StakeholderType::Ngo,
        StakeholderType::Academic,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StakeholderType::Citizen => "citizen",
            StakeholderType::Business => "business",
            StakeholderType::Ngo => "ngo",
            StakeholderType::Academic => "academic",
        }
    }
}

impl fmt::Display for StakeholderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StakeholderType {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        debug!(%s, "StakeholderType::from_str: called");
        StakeholderType::ALL
            .into_iter()
            .find(|t| t.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| {
                ApiError::Validation(format!(
                    "Unknown stakeholder type '{}'. Valid: citizen, business, ngo, academic",
                    s
                ))
            })
    }
}

/// Sentiment label assigned by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

impl Sentiment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sentiment {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "positive" => Ok(Sentiment::Positive),
            "neutral" => Ok(Sentiment::Neutral),
            "negative" => Ok(Sentiment::Negative),
            other => Err(ApiError::Validation(format!(
                "Unknown sentiment '{}'. Valid: positive, neutral, negative",
                other
            ))),
        }
    }
}

/// A comment to submit for analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentInput {
    pub stakeholder_type: StakeholderType,
    pub raw_text: String,
}

impl CommentInput {
    /// Build and validate a comment
    pub fn new(stakeholder_type: StakeholderType, raw_text: impl Into<String>) -> Result<Self, ApiError> {
        let input = Self {
            stakeholder_type,
            raw_text: raw_text.into(),
        };
        input.validate()?;
        Ok(input)
    }

    /// Client-side checks the backend would otherwise reject
    pub fn validate(&self) -> Result<(), ApiError> {
        let length = self.raw_text.chars().count();
        debug!(length, stakeholder = %self.stakeholder_type, "CommentInput::validate: called");
        if self.raw_text.trim().is_empty() {
            return Err(ApiError::Validation("Comment text cannot be empty".to_string()));
        }
        if length > MAX_COMMENT_LENGTH {
            return Err(ApiError::Validation(format!(
                "Comment is {} characters, limit is {}",
                length, MAX_COMMENT_LENGTH
            )));
        }
        Ok(())
    }
}

/// An analyzed comment as stored by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommentResponse {
    pub id: i64,
    pub timestamp: String,
    pub stakeholder_type: String,
    pub raw_text: String,
    pub sentiment_label: String,
    pub sentiment_score: f64,
    pub summary: String,
    pub created_at: String,
}

impl CommentResponse {
    /// The label as a known sentiment, if it is one
    pub fn sentiment(&self) -> Option<Sentiment> {
        self.sentiment_label.parse().ok()
    }
}

/// Aggregate view shown on the dashboard
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_comments: u64,
    pub positive_percentage: f64,
    pub neutral_percentage: f64,
    pub negative_percentage: f64,
    pub recent_comments: Vec<CommentResponse>,
}

/// Rendered word cloud
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordCloud {
    pub sentiment: Option<Sentiment>,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl WordCloud {
    pub fn is_image(&self) -> bool {
        self.content_type.starts_with("image/")
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        debug!(?path, bytes = self.data.len(), "WordCloud::save: called");
        std::fs::write(path, &self.data).context(format!("Failed to write word cloud to {}", path.display()))
    }
}

/// Backend liveness report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}
