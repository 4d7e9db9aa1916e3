use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::db::Segment;

pub mod openai_api;

pub use openai_api::OpenAIProvider;

/// Text and segments for one audio chunk, plus the raw provider payload kept
/// as transcript diagnostics.
#[derive(Debug, Clone, Default)]
pub struct ProviderTranscript {
    pub text: String,
    pub segments: Vec<Segment>,
    pub raw: Value,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("retryable provider error (status {status}): {message}")]
    Retryable { status: u16, message: String },

    #[error("provider error (status {status:?}): {message}")]
    Fatal { status: Option<u16>, message: String },

    /// Network or timeout failure with no status. Not retried.
    #[error("provider transport error: {0}")]
    Transport(String),
}

impl ProviderError {
    /// 429 and 5xx are retryable; everything else is final.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if status == 429 || (500..600).contains(&status) {
            Self::Retryable { status, message }
        } else {
            Self::Fatal {
                status: Some(status),
                message,
            }
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal {
            status: None,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable { .. })
    }
}

#[async_trait]
pub trait TranscriptionProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn transcribe(
        &self,
        audio: &[u8],
        file_name: &str,
    ) -> Result<ProviderTranscript, ProviderError>;
}
