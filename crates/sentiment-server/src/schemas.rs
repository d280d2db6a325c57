use std::collections::BTreeMap;

use sentiment_runtime::{BackendInfo, PredictionResult, ReadinessState};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct TweetRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct BatchTweetRequest {
    pub texts: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct BatchSentimentResponse {
    pub results: Vec<PredictionResult>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FeedbackRequest {
    pub tweet_text: String,
    pub prediction: String,
    pub confidence: f64,
    pub is_correct: bool,
    #[serde(default)]
    pub corrected_sentiment: String,
    #[serde(default)]
    pub comments: String,
}

/// Generic `{status, message}` acknowledgement.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub message: String,
}

impl StatusResponse {
    pub fn new(status: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub readiness: ReadinessState,
}

#[derive(Debug, Serialize)]
pub struct InfoResponse {
    pub version: &'static str,
    pub backend: Option<BackendInfo>,
    pub devices_available: Vec<String>,
    pub using_gpu: bool,
    pub readiness: ReadinessState,
    pub uptime_seconds: u64,
    pub environment: BTreeMap<&'static str, String>,
}
