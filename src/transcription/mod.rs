use anyhow::{bail, Result};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::TranscriptionConfig;

pub mod providers;
pub mod queue;
pub mod retry;

pub use providers::{OpenAIProvider, ProviderError, ProviderTranscript, TranscriptionProvider};
pub use queue::{JobState, QueueSnapshot, TranscriptionJob, TranscriptionQueue, TranscriptionWorker};
pub use retry::RetryPolicy;

/// Build the configured provider.
pub fn build_provider(config: &TranscriptionConfig) -> Result<Arc<dyn TranscriptionProvider>> {
    let provider: Arc<dyn TranscriptionProvider> = match config.provider.as_str() {
        "openai-api" => {
            let api_key = match config.api_key.clone().filter(|k| !k.is_empty()) {
                Some(key) => key,
                None => {
                    warn!("No transcription API key configured; uploads will fail until one is set");
                    String::new()
                }
            };
            Arc::new(OpenAIProvider::new(
                api_key,
                config.api_endpoint.clone(),
                config.model.clone(),
                config.request_timeout(),
            )?)
        }
        other => bail!(
            "Unknown transcription provider '{}'. Supported providers: openai-api",
            other
        ),
    };

    info!("Using transcription provider: {}", provider.name());
    Ok(provider)
}

pub fn retry_policy(config: &TranscriptionConfig) -> RetryPolicy {
    RetryPolicy::new(config.max_retries, config.base_backoff())
}
