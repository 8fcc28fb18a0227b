//! Text-to-speech synthesis over an OpenAI-compatible audio endpoint.

use super::llm::EnrichmentError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesize the text into an audio blob (mp3).
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, EnrichmentError>;
}

pub struct HttpSpeechSynthesizer {
    client: Client,
    base_url: String,
    model: String,
    voice: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpSpeechSynthesizer {
    pub fn new(
        base_url: impl Into<String>,
        model: impl Into<String>,
        voice: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            model: model.into(),
            voice: voice.into(),
            api_key,
            timeout,
        }
    }
}

#[derive(Debug, Serialize)]
struct SpeechRequest {
    model: String,
    input: String,
    voice: String,
    response_format: String,
}

#[async_trait]
impl SpeechSynthesizer for HttpSpeechSynthesizer {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, EnrichmentError> {
        let url = format!("{}/audio/speech", self.base_url);
        let request = SpeechRequest {
            model: self.model.clone(),
            input: text.to_string(),
            voice: self.voice.clone(),
            response_format: "mp3".to_string(),
        };

        debug!(
            model = %self.model,
            voice = %self.voice,
            text_len = text.len(),
            "Sending speech synthesis request"
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

        let bytes = response
            .bytes()
            .await
            .map_err(|e| EnrichmentError::Connection(e.to_string()))?;
        if bytes.is_empty() {
            return Err(EnrichmentError::InvalidResponse(
                "Synthesis returned an empty audio blob".to_string(),
            ));
        }

        debug!(audio_bytes = bytes.len(), "Received synthesized audio");
        Ok(bytes.to_vec())
    }
}
