use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info};

use super::{ProviderError, ProviderTranscript, TranscriptionProvider};
use crate::db::Segment;

const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/audio/transcriptions";

#[derive(Debug, Deserialize)]
struct VerboseTranscription {
    #[serde(default)]
    text: String,
    #[serde(default)]
    segments: Vec<VerboseSegment>,
}

#[derive(Debug, Deserialize)]
struct VerboseSegment {
    #[serde(default)]
    text: String,
    start: Option<f64>,
    end: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
    r#type: Option<String>,
}

pub struct OpenAIProvider {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
}

impl OpenAIProvider {
    pub fn new(
        api_key: String,
        endpoint: Option<String>,
        model: String,
        request_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        let endpoint = endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

        info!(
            "Initialized OpenAI provider with endpoint: {} (model {})",
            endpoint, model
        );

        Ok(Self {
            client,
            api_key,
            endpoint,
            model,
        })
    }
}

fn parse_transcription(body: &str) -> Result<ProviderTranscript, ProviderError> {
    let raw: Value = serde_json::from_str(body)
        .map_err(|e| ProviderError::fatal(format!("Failed to parse transcription response: {}", e)))?;
    let parsed: VerboseTranscription = serde_json::from_value(raw.clone())
        .map_err(|e| ProviderError::fatal(format!("Unexpected transcription response: {}", e)))?;

    let segments = parsed
        .segments
        .into_iter()
        .map(|s| Segment {
            text: s.text.trim().to_string(),
            start: s.start,
            end: s.end,
            speaker: None,
        })
        .collect();

    Ok(ProviderTranscript {
        text: parsed.text.trim().to_string(),
        segments,
        raw,
    })
}

#[async_trait]
impl TranscriptionProvider for OpenAIProvider {
    fn name(&self) -> &'static str {
        "OpenAI API"
    }

    async fn transcribe(
        &self,
        audio: &[u8],
        file_name: &str,
    ) -> Result<ProviderTranscript, ProviderError> {
        debug!(
            "Sending {} bytes to OpenAI transcription API ({})",
            audio.len(),
            file_name
        );

        let part = reqwest::multipart::Part::bytes(audio.to_vec()).file_name(file_name.to_string());
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("response_format", "verbose_json");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        if !status.is_success() {
            error!(
                "OpenAI API request failed with status {}: {}",
                status, response_text
            );

            let message = match serde_json::from_str::<ErrorResponse>(&response_text) {
                Ok(error_response) => format!(
                    "{} (type: {:?})",
                    error_response.error.message, error_response.error.r#type
                ),
                Err(_) => response_text,
            };
            return Err(ProviderError::from_status(status.as_u16(), message));
        }

        let transcript = parse_transcription(&response_text)?;
        info!("Transcription complete: {} chars", transcript.text.len());
        Ok(transcript)
    }
}
