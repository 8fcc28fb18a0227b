//! LLM-backed article summarization.
//!
//! Works with OpenAI, OpenRouter, vLLM, and any other service implementing
//! the OpenAI chat completions API. The model is asked for a JSON object so
//! the summary and tags come back in one round trip.

use crate::error::ServiceError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("rate limited")]
    RateLimited,

    #[error("api error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl From<EnrichmentError> for ServiceError {
    fn from(err: EnrichmentError) -> Self {
        ServiceError::dependency(err.to_string())
    }
}

/// Summary and tags extracted from an article.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ArticleDigest {
    pub summary: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, title: &str, body: &str) -> Result<ArticleDigest, EnrichmentError>;
}

const SYSTEM_PROMPT: &str = "You summarize news articles. Respond with a JSON object with two \
     fields: \"summary\" (3-4 sentences, plain prose) and \"tags\" (3-6 short lowercase topic \
     labels). Respond with the JSON object only, no surrounding text.";

/// Summarizer backed by an OpenAI-compatible chat completions endpoint.
pub struct OpenAiSummarizer {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl OpenAiSummarizer {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            api_key,
            timeout,
        }
    }
}

#[async_trait]
impl Summarizer for OpenAiSummarizer {
    async fn summarize(&self, title: &str, body: &str) -> Result<ArticleDigest, EnrichmentError> {
        let url = format!("{}/chat/completions", self.base_url);
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: format!("Title: {}\n\n{}", title, body),
                },
            ],
            temperature: 0.3,
        };

        debug!(
            model = %self.model,
            title = %title,
            "Sending summarization request"
        );

        let mut req_builder = self.client.post(&url).json(&request);
        if let Some(api_key) = &self.api_key {
            req_builder = req_builder.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = req_builder
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EnrichmentError::Timeout
                } else {
                    EnrichmentError::Connection(e.to_string())
                }
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(EnrichmentError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EnrichmentError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let chat_response: ChatResponse = response.json().await.map_err(|e| {
            EnrichmentError::InvalidResponse(format!("Failed to parse chat response: {}", e))
        })?;

        let content = chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| EnrichmentError::InvalidResponse("No choices in response".to_string()))?;

        let digest = parse_digest(&content)?;
        debug!(tag_count = digest.tags.len(), "Received article digest");
        Ok(digest)
    }
}

/// Parse the model output, tolerating code fences and surrounding prose.
fn parse_digest(content: &str) -> Result<ArticleDigest, EnrichmentError> {
    let trimmed = content.trim();
    if let Ok(digest) = serde_json::from_str::<ArticleDigest>(trimmed) {
        return Ok(digest);
    }
    let start = trimmed.find('{');
    let end = trimmed.rfind('}');
    if let (Some(start), Some(end)) = (start, end) {
        if start < end {
            if let Ok(digest) = serde_json::from_str::<ArticleDigest>(&trimmed[start..=end]) {
                return Ok(digest);
            }
        }
    }
    let preview: String = trimmed.chars().take(200).collect();
    Err(EnrichmentError::InvalidResponse(format!(
        "Model output is not a digest object: {}",
        preview
    )))
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json_digest() {
        let digest =
            parse_digest(r#"{"summary": "Short recap.", "tags": ["tech", "ai"]}"#).unwrap();
        assert_eq!(digest.summary, "Short recap.");
        assert_eq!(digest.tags, vec!["tech", "ai"]);
    }

    #[test]
    fn test_parse_fenced_digest() {
        let content = "```json\n{\"summary\": \"Recap.\", \"tags\": []}\n```";
        let digest = parse_digest(content).unwrap();
        assert_eq!(digest.summary, "Recap.");
        assert!(digest.tags.is_empty());
    }

    #[test]
    fn test_parse_missing_tags_defaults_empty() {
        let digest = parse_digest(r#"{"summary": "Recap."}"#).unwrap();
        assert!(digest.tags.is_empty());
    }

    #[test]
    fn test_parse_garbage_is_invalid_response() {
        let err = parse_digest("the article is about cats").unwrap_err();
        assert!(matches!(err, EnrichmentError::InvalidResponse(_)));
    }
}
