use crate::global;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

pub const JWT_SECRET_ENV: &str = "HUDDLE_JWT_SECRET";
pub const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub transcription: TranscriptionConfig,
    pub uploads: UploadConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HS256 secret used to verify identity tokens.
    pub jwt_secret: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriptionConfig {
    pub provider: String,
    pub api_endpoint: Option<String>,
    pub api_key: Option<String>,
    pub model: String,
    /// Extra attempts after the first call, for retryable failures only.
    pub max_retries: u32,
    pub base_backoff_ms: u64,
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    pub max_bytes: usize,
    pub accepted_mime_types: Vec<String>,
    pub temp_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 4000,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "change-me".to_string(),
        }
    }
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            provider: "openai-api".to_string(),
            api_endpoint: None,
            api_key: None,
            model: "whisper-1".to_string(),
            max_retries: 2,
            base_backoff_ms: 500,
            request_timeout_seconds: 120,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
            accepted_mime_types: [
                "audio/webm",
                "audio/wav",
                "audio/mpeg",
                "audio/ogg",
                "audio/x-wav",
                "audio/mp3",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            temp_dir: None,
        }
    }
}

impl TranscriptionConfig {
    pub fn base_backoff(&self) -> Duration {
        Duration::from_millis(self.base_backoff_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl UploadConfig {
    pub fn resolved_temp_dir(&self) -> Result<PathBuf> {
        match &self.temp_dir {
            Some(dir) => Ok(dir.clone()),
            None => global::transcribe_temp_dir(),
        }
    }

    pub fn accepts(&self, mime: &str) -> bool {
        self.accepted_mime_types.iter().any(|m| m == mime)
    }
}

impl DatabaseConfig {
    pub fn resolved_path(&self) -> Result<PathBuf> {
        match &self.path {
            Some(path) => Ok(path.clone()),
            None => global::db_file(),
        }
    }
}

impl Config {
    /// Load from the default location, creating it with defaults when missing.
    pub fn load() -> Result<Self> {
        let config_path = global::config_file()?;
        if !config_path.exists() {
            info!(
                "Config file not found, creating default at {:?}",
                config_path
            );
            let config = Self::default();
            config.save_to(&config_path)?;
            return Ok(config.with_env_overrides());
        }

        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;

        let config: Self = toml::from_str(&content).context("Failed to parse config file")?;

        info!("Loaded config from {:?}", path);
        Ok(config.with_env_overrides())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(path, content).context("Failed to write config file")?;

        Ok(())
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(secret) = std::env::var(JWT_SECRET_ENV) {
            if !secret.is_empty() {
                self.auth.jwt_secret = secret;
            }
        }
        if self.transcription.api_key.is_none() {
            self.transcription.api_key = std::env::var(OPENAI_API_KEY_ENV)
                .ok()
                .filter(|key| !key.is_empty());
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 4000);
        assert_eq!(config.transcription.max_retries, 2);
        assert_eq!(config.transcription.base_backoff(), Duration::from_millis(500));
        assert_eq!(config.uploads.max_bytes, 10 * 1024 * 1024);
        assert!(config.uploads.accepts("audio/webm"));
        assert!(!config.uploads.accepts("video/mp4"));
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server]\nport = 9000\n").unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.bind, "127.0.0.1");
        assert_eq!(config.transcription.model, "whisper-1");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.transcription.max_retries = 5;
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.transcription.max_retries, 5);
    }
}
