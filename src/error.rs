//! Error taxonomy shared by the relay, the host guard and the HTTP surface.

use thiserror::Error;

use crate::transcription::ProviderError;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Transcription provider failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Resource error: {0}")]
    Resource(#[from] std::io::Error),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl CoordinatorError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }
}

pub type CoordinatorResult<T> = Result<T, CoordinatorError>;
