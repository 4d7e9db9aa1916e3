pub mod api;
pub mod app;
pub mod auth;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod global;
pub mod meeting;
pub mod signaling;
pub mod transcription;

pub use error::{CoordinatorError, CoordinatorResult};
