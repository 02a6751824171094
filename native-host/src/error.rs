//! Error types for the native host.

use std::io;

/// Failure reading or writing one length-prefixed frame
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Frame too large: {0} bytes")]
    TooLarge(usize),

    #[error("Empty frame")]
    Empty,

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// The extension channel is no longer usable
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("Extension channel closed")]
    Closed,

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),
}

/// Configuration file could not be used
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Local socket front end failure
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Socket error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
